//! Window store abstraction and backends.
//!
//! The store is the only shared mutable state in the crate: a key-value
//! mapping from a rate-limit key to the timestamps of recently admitted
//! requests plus a violation counter. Entries carry a TTL equal to the
//! policy window, so a key with no fresh writes simply ages out, which is
//! also what resets its violation counter after a quiet period.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod memory;

pub use memory::MemoryStore;

/// The per-key state held by a window store.
///
/// `timestamps` is kept in ascending order (duplicates allowed) and holds
/// the UNIX-second instants of admitted requests still inside the lookback
/// horizon. The evaluator prunes stale entries on every read before it
/// decides, so the list is bounded by the policy's request limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowRecord {
    /// Admitted-request instants, ascending, as UNIX seconds.
    pub timestamps: Vec<u64>,
    /// Number of rejections recorded for this key since the record was
    /// created. Resets only by the record expiring out of the store.
    pub violation_count: u32,
}

/// Errors that can occur in window store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer within its deadline.
    #[error("store operation timed out: {0}")]
    Timeout(String),
}

/// Trait for window store backends.
///
/// Per-key semantics are last-write-wins: there is no compare-and-swap, so
/// concurrent read-modify-write cycles on the same key may lose updates.
/// The evaluator tolerates this (a window can transiently overshoot its
/// limit by the number of in-flight racers).
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Fetch the record for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<WindowRecord>, StoreError>;

    /// Write the record for `key`, replacing any previous value. The entry
    /// expires `ttl` from now.
    async fn put(&self, key: &str, record: WindowRecord, ttl: Duration) -> Result<(), StoreError>;
}
