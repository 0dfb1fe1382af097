//! Custom Resource Definitions for the vLLM operator

mod runtime;
mod types;

pub use runtime::{VllmRuntime, VllmRuntimeSpec, VllmRuntimeStatus};
pub use types::{
    Condition, ConditionStatus, DeploymentConfig, DeviceRequest, EnvVar, ImageSpec,
    ResourceRequirements, RuntimePhase, VllmConfig, MAX_CONDITIONS,
};

/// Kind of the managed custom resource
pub const VLLM_KIND: &str = "VLLM";

/// API version of the managed custom resource
pub const VLLM_API_VERSION: &str = "vllm.ai/v1";
