//! Static-site deployer: build a site in a disposable working tree and publish it
//! to a dedicated branch without ever touching the caller's checkout.
//!
//! - **[`core`]**: Pure data model and rules (workspace naming, containment, domain
//!   binding, artifact classification). No I/O.
//! - **[`io`]**: Side-effecting adapters (processes, git, working trees, config,
//!   filesystem, interrupts).
//!
//! [`builder`] and [`publish`] implement the two halves of a run; [`deploy`]
//! sequences them and owns the workspace lifetimes.

pub mod builder;
pub mod core;
pub mod deploy;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod publish;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
