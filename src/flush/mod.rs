//! Background work around the state store
//!
//! - [`FlushPipeline`]: pending queues → durability cache
//! - [`RetentionSweeper`]: evicts old terminal orders from memory
//! - [`MigrationScheduler`]: durability cache → relational store
//!
//! All loops stop cooperatively on a shared [`ShutdownSignal`].

pub mod pipeline;
pub mod workers;

pub use pipeline::{FlushCycleReport, FlushPipeline};
pub use workers::{MigrationScheduler, RetentionSweeper};

use tokio::sync::watch;

// ============================================================
// SHUTDOWN
// ============================================================

/// Sender half; dropping it also counts as shutdown
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request shutdown
    pub fn request_shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiver half, cloned into every background loop
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Check if shutdown was requested
    pub fn is_shutdown_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested or the trigger is gone
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}
