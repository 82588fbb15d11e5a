//! I/O adapters for the deployer: processes, git, workspaces, files, config.

pub mod config;
pub mod fsops;
pub mod git;
pub mod interrupt;
pub mod process;
pub mod workspace;
