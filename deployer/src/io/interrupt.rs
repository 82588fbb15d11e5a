//! Cancellation flag shared between the signal handler and the coordinator.
//!
//! SIGINT/SIGTERM do not kill the deployer. The running child receives the signal
//! from the terminal itself, fails, and the failure unwinds through the workspace
//! guards. The flag lets the coordinator stop between steps and skips diagnostic
//! re-runs of commands the operator just cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::warn;

use crate::error::DeployError;

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT/SIGTERM into this flag. Call once per process.
    pub fn install(&self) -> Result<()> {
        let flag = Arc::clone(&self.flag);
        ctrlc::set_handler(move || {
            warn!("interrupt received, cleaning up workspaces");
            flag.store(true, Ordering::SeqCst);
        })
        .context("install interrupt handler")
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`DeployError::Interrupted`] once the flag is set.
    pub fn check(&self) -> Result<(), DeployError> {
        if self.is_set() {
            return Err(DeployError::Interrupted);
        }
        Ok(())
    }
}
