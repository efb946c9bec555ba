//! exec-ledger service
//!
//! ```text
//! ┌──────────┐  replay  ┌────────────┐  drain  ┌─────────┐  migrate  ┌──────────┐
//! │ AuditLog │─────────▶│ StateStore │────────▶│  Cache  │──────────▶│ Postgres │
//! └──────────┘          └────────────┘         └─────────┘           └──────────┘
//! ```
//!
//! Startup runs recovery to completion before any background loop starts;
//! Ctrl-C stops the loops after a final flush.
//!
//! Usage: `exec-ledger [--env dev] [--session ID] [--date YYYY-MM-DD] [--flush-recovered]`

use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;

use exec_ledger::audit::JsonlAuditLog;
use exec_ledger::cache::{DurabilityCache, MemoryCache};
use exec_ledger::config::AppConfig;
use exec_ledger::db::Database;
use exec_ledger::flush::{FlushPipeline, MigrationScheduler, RetentionSweeper, shutdown_channel};
use exec_ledger::logging::init_logging;
use exec_ledger::recovery::{AuditRecovery, RecoveryOptions};
use exec_ledger::relational::{MigrationEngine, PgRelationalStore};
use exec_ledger::store::{StateStore, lock_store, shared};

// ============================================================
// ARGS
// ============================================================

fn get_arg(name: &str) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1).cloned())
}

fn has_flag(name: &str) -> bool {
    std::env::args().any(|a| a == name)
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_arg("--env").unwrap_or_else(|| "dev".to_string());
    let config = AppConfig::load(&env)?;
    let _guard = init_logging(&config);

    let session_id = get_arg("--session")
        .or_else(|| config.session_id.clone())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let date = get_arg("--date")
        .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
        .transpose()
        .context("--date must be YYYY-MM-DD")?;
    let flush_recovered = has_flag("--flush-recovered") || config.flush.flush_recovered;

    tracing::info!(env = %env, session_id = %session_id, "exec-ledger starting");

    let audit_log = Arc::new(JsonlAuditLog::new(&config.audit.data_dir));
    let cache = Arc::new(MemoryCache::new());
    cache.init().await?;
    let store = shared(StateStore::new());

    // --- Recovery (exclusive) ---
    let recovery = AuditRecovery::builder()
        .audit_log(audit_log)
        .store(store.clone())
        .cache(cache.clone())
        .build()?;
    let report = recovery
        .recover_from_audit_log(
            &session_id,
            &RecoveryOptions {
                date,
                flush_to_cache: flush_recovered,
            },
        )
        .await
        .context("audit log recovery failed")?;
    tracing::info!(
        orders = report.rebuild.orders_added_count,
        fills = report.rebuild.fills_added_count,
        cache_complete = report.is_complete(),
        "Recovery finished"
    );

    // --- Background loops ---
    let (trigger, signal) = shutdown_channel();
    let mut tasks = Vec::new();

    let mut pipeline = FlushPipeline::new(store.clone(), cache.clone());
    if config.flush.batch_size > 0 {
        pipeline = pipeline.with_batch_size(config.flush.batch_size);
    }
    let flush_every = config.flush.interval();
    let flush_signal = signal.clone();
    tasks.push(tokio::spawn(async move {
        pipeline.run(flush_every, flush_signal).await
    }));

    let sweeper = RetentionSweeper::new(store.clone(), config.retention.max_age());
    let sweep_every = config.retention.sweep_interval();
    let sweep_signal = signal.clone();
    tasks.push(tokio::spawn(async move {
        sweeper.run(sweep_every, sweep_signal).await
    }));

    let mut scheduler = None;
    if let Some(url) = &config.postgres_url {
        let db = Database::connect(url).await?;
        let relational = Arc::new(PgRelationalStore::new(db.pool().clone()));
        relational.init_schema().await?;
        let engine = Arc::new(
            MigrationEngine::new(relational).with_intervals(config.migration.intervals.clone()),
        );
        let migrate = Arc::new(MigrationScheduler::new(engine, cache.clone(), &session_id));
        let migrate_every = config.migration.interval();
        let migrate_signal = signal.clone();
        let runner = migrate.clone();
        tasks.push(tokio::spawn(async move {
            runner.run(migrate_every, migrate_signal).await
        }));
        scheduler = Some(migrate);
    } else {
        tracing::warn!("postgres_url not set, relational migration disabled");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    trigger.request_shutdown();
    for task in tasks {
        task.await?;
    }

    // Final flush has run; move the last snapshot to the store of record
    if let Some(scheduler) = scheduler {
        let report = scheduler.run_once().await;
        tracing::info!(complete = report.is_complete(), "Final migration finished");
    }

    let stats = lock_store(&store).stats();
    tracing::info!(?stats, "exec-ledger stopped");
    cache.close().await?;
    Ok(())
}
