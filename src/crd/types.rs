//! Supporting types for the VLLM CRD

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::runtime::RuntimeStatus;

/// Maximum number of conditions kept in a status report
pub const MAX_CONDITIONS: usize = 10;

/// vLLM server settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct VllmConfig {
    /// Port the OpenAI-compatible server listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Use the v1 engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v1: Option<bool>,

    /// Environment variables passed to the server container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// A single environment variable
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    pub value: String,
}

impl EnvVar {
    /// Create an environment variable
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Pod-level deployment settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// Resource limits and requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Accelerator device requests
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_requests: Vec<DeviceRequest>,

    /// Container image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSpec>,
}

/// Resource quantities keyed by resource name (`cpu`, `memory`, `nvidia.com/gpu`)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceRequirements {
    /// Upper bounds
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,

    /// Scheduling requests
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

/// Request for a set of accelerator devices
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct DeviceRequest {
    /// Device driver (e.g., nvidia)
    pub driver: String,

    /// Number of devices
    pub count: u32,

    /// Required device capabilities
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Specific device identifiers
    #[serde(rename = "deviceIDs", default)]
    pub device_ids: Vec<String>,
}

/// Container image reference
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Registry host
    pub registry: String,

    /// Repository and tag
    pub name: String,

    /// Image pull policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<String>,
}

/// Phase reported in a VLLM status
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RuntimePhase {
    /// Not yet reconciled
    #[default]
    Pending,
    /// Start requested, not yet confirmed
    Starting,
    /// Serving traffic
    Running,
    /// Not serving
    Stopped,
    /// Rolling out new deployment parameters
    Updating,
    /// The last lifecycle operation failed
    Failed,
    /// The declared action is not recognized
    Unknown,
}

impl RuntimePhase {
    /// Instance status this phase corresponds to, if any
    pub fn as_status(&self) -> Option<RuntimeStatus> {
        match self {
            Self::Pending => Some(RuntimeStatus::Pending),
            Self::Running => Some(RuntimeStatus::Running),
            Self::Stopped => Some(RuntimeStatus::Stopped),
            Self::Updating => Some(RuntimeStatus::Updating),
            Self::Failed => Some(RuntimeStatus::Failed),
            Self::Starting | Self::Unknown => None,
        }
    }
}

impl From<RuntimeStatus> for RuntimePhase {
    fn from(status: RuntimeStatus) -> Self {
        match status {
            RuntimeStatus::Pending => Self::Pending,
            RuntimeStatus::Running => Self::Running,
            RuntimeStatus::Stopped => Self::Stopped,
            RuntimeStatus::Updating => Self::Updating,
            RuntimeStatus::Failed => Self::Failed,
        }
    }
}

impl std::fmt::Display for RuntimePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Updating => write!(f, "Updating"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition recorded on each lifecycle outcome
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Running, Failed)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// True if both conditions record the same outcome, ignoring timestamps
    pub fn same_outcome(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}
