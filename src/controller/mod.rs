//! Controller for VLLM custom resources
//!
//! The reconciler follows the Kubernetes controller pattern: observe the
//! declared action, drive it through the orchestration service, report the
//! outcome in status.

mod runtime;

pub use runtime::{error_policy, reconcile, Context};
