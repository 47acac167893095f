//! Turnstile - Sliding-Window Request Admission Control
//!
//! This crate decides whether an inbound request may proceed, using exact
//! sliding windows keyed by caller identity with progressive retry-after
//! escalation for repeat offenders. It owns no HTTP surface: handlers feed
//! it request metadata and a policy name, and turn the returned
//! [`Decision`] into a 429 response (or invoke the protected operation)
//! themselves.
//!
//! ```no_run
//! use std::sync::Arc;
//! use turnstile::{AdmissionGate, MemoryStore, PolicyRegistry, RequestMeta};
//!
//! # async fn example() {
//! let gate = AdmissionGate::new(PolicyRegistry::builtin(), Arc::new(MemoryStore::new()));
//!
//! let meta = RequestMeta {
//!     forwarded_for: Some("203.0.113.9, 10.0.0.1".to_string()),
//!     real_ip: None,
//!     remote_addr: "10.0.0.1:44123".to_string(),
//! };
//!
//! let decision = gate.check(&meta, "login").await;
//! if !decision.admitted {
//!     // Respond 429 with Retry-After = decision.retry_after_seconds.
//! }
//! # }
//! ```

pub mod error;
pub mod evaluator;
pub mod gate;
pub mod identity;
pub mod policy;
pub mod store;

pub use error::{Result, TurnstileError};
pub use evaluator::{Decision, SlidingWindowEvaluator};
pub use gate::AdmissionGate;
pub use identity::{RequestMeta, UNKNOWN_IDENTITY};
pub use policy::{Policy, PolicyRegistry, FALLBACK_POLICY};
pub use store::{MemoryStore, StoreError, WindowRecord, WindowStore};
