//! Admission gate: the single entry point handlers call.
//!
//! Composes identity resolution, the policy registry and the sliding
//! window evaluator. The gate adds no logic of its own beyond building the
//! rate-limit key and sampling the clock; HTTP concerns (status 429, the
//! `Retry-After` and `X-RateLimit-*` headers, the response body text from
//! [`Policy::message`](crate::policy::Policy)) stay with the caller.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::trace;

use crate::evaluator::{Decision, SlidingWindowEvaluator};
use crate::identity::{self, RequestMeta};
use crate::policy::PolicyRegistry;
use crate::store::WindowStore;

/// Request admission gate over a pluggable store backend.
///
/// Thread-safe; one gate is shared by every request-handling task.
pub struct AdmissionGate<S: WindowStore> {
    registry: PolicyRegistry,
    evaluator: SlidingWindowEvaluator<S>,
}

impl<S: WindowStore> AdmissionGate<S> {
    /// Create a gate from a registry and a store.
    pub fn new(registry: PolicyRegistry, store: Arc<S>) -> Self {
        Self {
            registry,
            evaluator: SlidingWindowEvaluator::new(store),
        }
    }

    /// The registry backing this gate, e.g. for fetching a policy's
    /// rejection message when shaping a 429 response.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Check one request against the named policy at wall-clock time.
    ///
    /// Unknown policy names fall back to the default authentication
    /// policy; malformed addresses fall back to the shared sentinel
    /// identity. This call never fails: store trouble surfaces as a
    /// fail-closed rejection.
    pub async fn check(&self, meta: &RequestMeta, policy_name: &str) -> Decision {
        self.check_at(meta, policy_name, unix_now()).await
    }

    /// Check one request at an explicit time (UNIX seconds).
    pub async fn check_at(&self, meta: &RequestMeta, policy_name: &str, now: u64) -> Decision {
        let policy = self.registry.resolve(policy_name);
        let identity = identity::resolve(meta);
        let key = format!("{}:{}", policy.key_prefix, identity);

        trace!(%key, policy = %policy.name, "Checking admission");

        self.evaluator.evaluate(&key, &policy, now).await
    }

    /// Check one request against several named policies, in order.
    ///
    /// Each admitted check consumes a slot in that policy's window, the
    /// same as stacked per-endpoint limiters would. The first rejection
    /// wins and later policies are not consulted; when every policy
    /// admits, the decision with the fewest remaining slots is returned so
    /// callers surface the tightest limit in their headers.
    pub async fn check_stacked(&self, meta: &RequestMeta, policy_names: &[&str]) -> Decision {
        self.check_stacked_at(meta, policy_names, unix_now()).await
    }

    /// [`check_stacked`](Self::check_stacked) at an explicit time.
    pub async fn check_stacked_at(
        &self,
        meta: &RequestMeta,
        policy_names: &[&str],
        now: u64,
    ) -> Decision {
        let mut tightest: Option<Decision> = None;

        for name in policy_names {
            let decision = self.check_at(meta, name, now).await;
            if !decision.admitted {
                return decision;
            }
            let tighter = tightest
                .as_ref()
                .map_or(true, |best| decision.remaining < best.remaining);
            if tighter {
                tightest = Some(decision);
            }
        }

        tightest.unwrap_or_else(|| empty_stack_decision(now))
    }
}

fn unix_now() -> u64 {
    // Clamps to 0 if the clock sits before the epoch.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Decision for a stacked check with no policies: nothing constrained the
/// request, so it passes.
fn empty_stack_decision(now: u64) -> Decision {
    Decision {
        admitted: true,
        retry_after_seconds: 0,
        limit: 0,
        remaining: 0,
        reset_at: now,
    }
}
