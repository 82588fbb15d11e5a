//! Domain-binding content rules.
//!
//! The binding file holds exactly the configured domain followed by one line
//! terminator. After writing, the file is read back and compared with surrounding
//! whitespace trimmed; anything else is a verification failure.

use std::path::Path;

use crate::error::DeployError;

/// Trim and validate a configured domain. Empty input is rejected.
pub fn normalize_domain(raw: &str) -> Result<String, DeployError> {
    let domain = raw.trim();
    if domain.is_empty() {
        return Err(DeployError::EmptyDomain);
    }
    if domain.chars().any(char::is_whitespace) {
        return Err(DeployError::InvalidDomain {
            domain: domain.to_string(),
            reason: "contains whitespace",
        });
    }
    if domain.contains('/') {
        return Err(DeployError::InvalidDomain {
            domain: domain.to_string(),
            reason: "must be a bare host name, not a URL or path",
        });
    }
    Ok(domain.to_string())
}

/// Exact bytes written to the domain-binding file.
pub fn render_binding(domain: &str) -> String {
    format!("{domain}\n")
}

/// Compare the read-back contents of `path` against `expected`.
pub fn verify_binding(path: &Path, contents: &str, expected: &str) -> Result<(), DeployError> {
    let found = contents.trim();
    if found.is_empty() || found != expected {
        return Err(DeployError::DomainMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_surrounding_whitespace() {
        assert_eq!(normalize_domain("  example.com\n").expect("domain"), "example.com");
    }

    #[test]
    fn rejects_empty_and_blank_domains() {
        assert!(matches!(normalize_domain(""), Err(DeployError::EmptyDomain)));
        assert!(matches!(normalize_domain(" \n\t"), Err(DeployError::EmptyDomain)));
    }

    #[test]
    fn rejects_urls_and_inner_whitespace() {
        assert!(normalize_domain("https://example.com").is_err());
        assert!(normalize_domain("example .com").is_err());
    }

    #[test]
    fn rendered_binding_verifies_against_itself() {
        let rendered = render_binding("example.com");
        assert_eq!(rendered, "example.com\n");
        verify_binding(Path::new("CNAME"), &rendered, "example.com").expect("verify");
    }

    #[test]
    fn truncated_binding_is_a_mismatch() {
        let err = verify_binding(Path::new("CNAME"), "example.c", "example.com")
            .expect_err("mismatch");
        assert!(matches!(err, DeployError::DomainMismatch { .. }));
        assert!(verify_binding(Path::new("CNAME"), "", "example.com").is_err());
    }
}
