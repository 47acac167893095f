//! Sliding-window evaluation.
//!
//! The evaluator owns the admit/reject arithmetic: prune the stored
//! timestamps to the window ending at `now`, compare against the policy
//! limit, and either append the new request or compute how long the caller
//! must wait. Keeping the full timestamp list (bounded by the policy
//! limit, which is small for every shipped policy) gives an exact sliding
//! window instead of the fixed-bucket approximation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::policy::Policy;
use crate::store::{WindowRecord, WindowStore};

/// The outcome of one admission check.
///
/// Produced fresh per call and never persisted. Callers translate a
/// rejection into a 429 response: `retry_after_seconds` feeds the
/// `Retry-After` header, `limit`/`remaining`/`reset_at` feed the
/// `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset`
/// (epoch seconds) headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub admitted: bool,
    /// Seconds the caller should wait before retrying; 0 when admitted,
    /// at least 1 when rejected.
    pub retry_after_seconds: u64,
    /// The policy's request limit.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// UNIX second at which the window frees up.
    pub reset_at: u64,
}

/// Sliding-window evaluator over a pluggable store backend.
pub struct SlidingWindowEvaluator<S: WindowStore> {
    store: Arc<S>,
}

impl<S: WindowStore> SlidingWindowEvaluator<S> {
    /// Create an evaluator over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Evaluate one request for `key` under `policy` at time `now`
    /// (UNIX seconds).
    ///
    /// Never returns an error: a store failure on either side of the
    /// read-modify-write cycle becomes a fail-closed rejection with
    /// `retry_after_seconds` equal to the full window, so a dead store
    /// throttles traffic instead of disabling the limiter.
    pub async fn evaluate(&self, key: &str, policy: &Policy, now: u64) -> Decision {
        trace!(key, policy = %policy.name, now, "Evaluating admission");

        let record = match self.store.get(key).await {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                warn!(key, error = %e, "Window store read failed, rejecting");
                return Self::fail_closed(policy, now);
            }
        };

        // Reconcile the stored window against `now`. Saturating arithmetic
        // makes a backward clock step read as zero elapsed time, so stale
        // entries are never resurrected into negative ages.
        let mut timestamps: Vec<u64> = record
            .timestamps
            .into_iter()
            .filter(|&t| now.saturating_sub(t) <= policy.window_seconds)
            .collect();
        let active_count = timestamps.len() as u32;

        if active_count >= policy.max_requests {
            return self
                .reject(key, policy, now, timestamps, record.violation_count)
                .await;
        }

        timestamps.push(now);
        let updated = WindowRecord {
            timestamps,
            violation_count: record.violation_count,
        };
        if let Err(e) = self
            .store
            .put(key, updated, Duration::from_secs(policy.window_seconds))
            .await
        {
            warn!(key, error = %e, "Window store write failed, rejecting");
            return Self::fail_closed(policy, now);
        }

        debug!(
            key,
            used = active_count + 1,
            limit = policy.max_requests,
            "Request admitted"
        );

        Decision {
            admitted: true,
            retry_after_seconds: 0,
            limit: policy.max_requests,
            remaining: policy.max_requests - active_count - 1,
            reset_at: now + policy.window_seconds,
        }
    }

    async fn reject(
        &self,
        key: &str,
        policy: &Policy,
        now: u64,
        timestamps: Vec<u64>,
        violation_count: u32,
    ) -> Decision {
        // With max_requests = 0 the pruned list can be empty; the full
        // window then stands in for the oldest-entry arithmetic.
        let oldest = timestamps.first().copied();
        let elapsed = oldest.map_or(0, |t| now.saturating_sub(t));
        let mut retry_after = policy.window_seconds.saturating_sub(elapsed).max(1);
        let reset_at = oldest.map_or(now + policy.window_seconds, |t| t + policy.window_seconds);

        if policy.progressive_delay {
            retry_after = retry_after.saturating_mul(u64::from(violation_count) + 1);

            let updated = WindowRecord {
                timestamps,
                violation_count: violation_count.saturating_add(1),
            };
            if let Err(e) = self
                .store
                .put(key, updated, Duration::from_secs(policy.window_seconds))
                .await
            {
                // Still a rejection either way; the escalated counter is
                // simply lost.
                warn!(key, error = %e, "Failed to persist violation count");
            }
        }

        debug!(
            key,
            policy = %policy.name,
            retry_after,
            violations = violation_count,
            "Request rejected"
        );

        Decision {
            admitted: false,
            retry_after_seconds: retry_after,
            limit: policy.max_requests,
            remaining: 0,
            reset_at,
        }
    }

    fn fail_closed(policy: &Policy, now: u64) -> Decision {
        Decision {
            admitted: false,
            retry_after_seconds: policy.window_seconds,
            limit: policy.max_requests,
            remaining: 0,
            reset_at: now + policy.window_seconds,
        }
    }
}
