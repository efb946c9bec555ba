//! In-memory ledger
//!
//! [`StateStore`] owns all mutation and lookup logic. Background tasks
//! (flush, retention, recovery) share it through [`SharedStateStore`].

pub mod index;
pub mod pending;
pub mod state;

pub use index::ExchangeIdIndex;
pub use pending::PendingQueue;
pub use state::{StateStore, StoreStats};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Store shared between ingestion and background tasks
///
/// The mutex serializes writers; a pending-queue drain happens entirely
/// under one lock acquisition, so no concurrent add can be lost by it.
pub type SharedStateStore = Arc<Mutex<StateStore>>;

/// Wrap a store for sharing
pub fn shared(store: StateStore) -> SharedStateStore {
    Arc::new(Mutex::new(store))
}

/// Lock the shared store
///
/// A panic in another holder does not leave the ledger half-updated
/// (every mutation completes under `&mut self`), so a poisoned lock is
/// recovered rather than propagated.
pub fn lock_store(store: &SharedStateStore) -> MutexGuard<'_, StateStore> {
    store.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        tracing::warn!("State store lock was poisoned, recovering");
        poisoned.into_inner()
    })
}
