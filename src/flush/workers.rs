//! Periodic retention and migration loops

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::ShutdownSignal;
use crate::cache::DurabilityCache;
use crate::relational::{MigrationEngine, MigrationReport};
use crate::store::{SharedStateStore, lock_store};

fn ticker(every: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

// ============================================================
// RETENTION
// ============================================================

/// Evicts terminal orders older than `max_age` from the state store
pub struct RetentionSweeper {
    store: SharedStateStore,
    max_age: Duration,
}

impl RetentionSweeper {
    pub fn new(store: SharedStateStore, max_age: Duration) -> Self {
        Self { store, max_age }
    }

    pub fn sweep_once(&self) -> usize {
        lock_store(&self.store).cleanup(self.max_age)
    }

    pub async fn run(&self, every: Duration, mut shutdown: ShutdownSignal) {
        tracing::info!(max_age = ?self.max_age, interval = ?every, "Retention sweeper started");
        let mut ticker = ticker(every);
        // First tick is immediate; nothing is old enough at startup
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once();
                }
                _ = shutdown.wait() => break,
            }
        }
        tracing::info!("Retention sweeper stopped");
    }
}

// ============================================================
// MIGRATION
// ============================================================

/// Runs cache → relational migration for one session on a schedule
pub struct MigrationScheduler {
    engine: Arc<MigrationEngine>,
    cache: Arc<dyn DurabilityCache>,
    session_id: String,
}

impl MigrationScheduler {
    pub fn new(
        engine: Arc<MigrationEngine>,
        cache: Arc<dyn DurabilityCache>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            cache,
            session_id: session_id.into(),
        }
    }

    pub async fn run_once(&self) -> MigrationReport {
        self.engine
            .migrate_from_cache(self.cache.as_ref(), &self.session_id)
            .await
    }

    pub async fn run(&self, every: Duration, mut shutdown: ShutdownSignal) {
        tracing::info!(session_id = %self.session_id, interval = ?every, "Migration scheduler started");
        let mut ticker = ticker(every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_once().await;
                    if !report.is_complete() {
                        tracing::warn!(
                            session_id = %self.session_id,
                            errors = report.errors.len(),
                            "Scheduled migration incomplete, will retry next cycle"
                        );
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
        tracing::info!(session_id = %self.session_id, "Migration scheduler stopped");
    }
}
