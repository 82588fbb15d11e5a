//! Deterministic, pure logic shared by the deployer.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! values and paths handed to them and return deterministic outputs suitable
//! for tests.

pub mod artifacts;
pub mod domain;
pub mod paths;
pub mod types;
