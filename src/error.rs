//! Error types for the vLLM runtime operator
//!
//! Errors separate benign idempotence signals (the runtime is already in the
//! requested state) from hard failures talking to the backend. Callers must
//! be able to tell the two apart, so they are never collapsed into a single
//! variant.

use thiserror::Error;

use crate::runtime::{LifecycleAction, RuntimeStatus};

/// Boxed error cause kept for diagnostics
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Illegal state change requested on a runtime instance
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Start requested while the runtime is already running
    #[error("model {model} is already running")]
    AlreadyRunning {
        /// Model identifier
        model: String,
    },

    /// Stop requested while the runtime is already stopped
    #[error("model {model} is already stopped")]
    AlreadyStopped {
        /// Model identifier
        model: String,
    },

    /// Update requested while an update is already in flight
    #[error("model {model} is already updating")]
    AlreadyUpdating {
        /// Model identifier
        model: String,
    },

    /// The action is not legal from the current status
    #[error("model {model} cannot {action} from status {from}")]
    InvalidTransition {
        /// Model identifier
        model: String,
        /// Action that was requested
        action: LifecycleAction,
        /// Status the runtime was in
        from: RuntimeStatus,
    },
}

impl TransitionError {
    /// True when the runtime is already in the requested state
    pub fn is_already_in_state(&self) -> bool {
        !matches!(self, TransitionError::InvalidTransition { .. })
    }
}

/// Main error type for runtime lifecycle operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Illegal or redundant state transition
    #[error("transition error: {0}")]
    Transition(#[from] TransitionError),

    /// The addressed declarative object does not exist
    #[error("{kind} {name:?} not found in namespace {namespace}")]
    NotFound {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Namespace that was searched
        namespace: String,
    },

    /// A template declares the wrong resource kind
    #[error("schema mismatch: expected kind {expected}, got {found}")]
    SchemaMismatch {
        /// Kind the operator manages
        expected: String,
        /// Kind declared by the template
        found: String,
    },

    /// A template lacks the resource name it must declare
    #[error("template for model {model} must specify metadata.name")]
    MissingIdentity {
        /// Model whose template is incomplete
        model: String,
    },

    /// No template exists for the requested model
    #[error("template not found for model {model}: {message}")]
    TemplateNotFound {
        /// Requested model
        model: String,
        /// Lookup detail
        message: String,
    },

    /// The template exists but cannot be decoded
    #[error("invalid template for model {model}: {message}")]
    TemplateInvalid {
        /// Requested model
        model: String,
        /// Decoding detail
        message: String,
    },

    /// Transport or API failure in the external control plane
    #[error("adapter error [{adapter}]: {message}")]
    Adapter {
        /// Adapter that failed (cluster, http)
        adapter: String,
        /// Description of what failed
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// The persistence layer is unreachable
    #[error("store unavailable: {message}")]
    StoreUnavailable {
        /// Description of what failed
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// Invalid request input
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a not-found error for a VLLM resource
    pub fn not_found(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::NotFound {
            kind: crate::crd::VLLM_KIND.to_string(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Create an adapter error with the given message
    pub fn adapter(adapter: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Adapter {
            adapter: adapter.into(),
            message: msg.into(),
            source: None,
        }
    }

    /// Create an adapter error preserving the underlying cause
    pub fn adapter_with_source(
        adapter: impl Into<String>,
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Adapter {
            adapter: adapter.into(),
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a store-unavailable error with the given message
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: msg.into(),
            source: None,
        }
    }

    /// Wrap a Kubernetes API failure as a store-unavailable error
    pub fn store_kube(msg: impl Into<String>, source: kube::Error) -> Self {
        Self::StoreUnavailable {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// True for "already in that state" outcomes.
    ///
    /// These are no-ops, not failures: the runtime already matches the
    /// request.
    pub fn is_benign(&self) -> bool {
        matches!(self, Error::Transition(t) if t.is_already_in_state())
    }

    /// True if retrying the same request may succeed without a spec change
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Adapter { .. } | Error::StoreUnavailable { .. } => true,
            Error::Transition(_)
            | Error::NotFound { .. }
            | Error::SchemaMismatch { .. }
            | Error::MissingIdentity { .. }
            | Error::TemplateNotFound { .. }
            | Error::TemplateInvalid { .. }
            | Error::Validation(_)
            | Error::Serialization(_) => false,
        }
    }

    /// True if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
