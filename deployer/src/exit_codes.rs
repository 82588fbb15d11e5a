//! Stable exit codes for the deployer CLI.

/// Source pushed, site built, verified, published, and workspaces released.
pub const OK: i32 = 0;
/// A critical command (install, build, git) failed, or an unclassified error.
pub const FAILURE: i32 = 1;
/// Refused to start: wrong branch, bad config, no repository, unsafe workspace path.
pub const PRECONDITION: i32 = 2;
/// Build artifacts or publish markers failed verification; nothing was published.
pub const VERIFICATION: i32 = 3;
/// A workspace could not be removed from disk.
pub const RELEASE: i32 = 4;
/// Interrupted by SIGINT/SIGTERM (workspaces were still released).
pub const INTERRUPTED: i32 = 130;
