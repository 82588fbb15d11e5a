//! Tracing setup for the deployer.
//!
//! Progress of a deployment (steps, workspaces, branches) is logged at `info`;
//! every external command is echoed at `debug` before it runs.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` when set. Otherwise defaults to `info`, or `debug` when
/// `verbose` is true. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=deployer=debug deployer --message "fix typo"
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
