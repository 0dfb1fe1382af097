//! vLLM operator - CRD-driven lifecycle controller for vLLM model runtimes
//!
//! The operator starts, stops and updates served model instances that are
//! declared as `VLLM` custom resources. Intent flows through a single
//! orchestration path: validate the transition, mutate the external control
//! plane, then record the result locally.
//!
//! # Modules
//!
//! - [`runtime`] - Runtime entity and lifecycle state machine
//! - [`crd`] - Custom Resource Definition for `VLLM` objects
//! - [`template`] - Model templates and deployment parameter rendering
//! - [`store`] - Resource store and idempotent create-or-patch upsert
//! - [`adapter`] - External control plane adapters (cluster, HTTP)
//! - [`service`] - Orchestration service sequencing lifecycle operations
//! - [`controller`] - Kubernetes reconciler for `VLLM` objects
//! - [`config`] - Operator configuration
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod adapter;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod runtime;
pub mod service;
pub mod store;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Namespace used when a request leaves it empty
pub const DEFAULT_NAMESPACE: &str = "default";

/// Field manager name for server-side apply and patches
pub const FIELD_MANAGER: &str = "vllm-operator";

/// Default directory holding `{model}.yaml` templates
pub const DEFAULT_TEMPLATE_DIR: &str = "config/samples";
