//! Rendering a complete `VLLM` document from deployment parameters

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RuntimeTemplate;
use crate::crd::{
    DeploymentConfig, DeviceRequest, EnvVar, ImageSpec, ResourceRequirements, VllmConfig,
};
use crate::runtime::{normalize_namespace, LifecycleAction};

const IMAGE_REGISTRY: &str = "docker.io";
const IMAGE_NAME: &str = "lmcache/vllm-openai:2025-05-27-v1";
const IMAGE_PULL_POLICY: &str = "IfNotPresent";
const SERVER_PORT: u16 = 8000;
const GPU_RESOURCE: &str = "nvidia.com/gpu";

/// Parameters for a new model deployment
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentParams {
    /// Object name
    pub name: String,
    /// Target namespace, `default` when empty
    pub namespace: String,
    /// Served model
    pub model: String,
    /// Logical runtime name
    pub runtime_name: String,
    /// Location of the model weights
    pub storage_uri: String,
    /// GPUs to pin the runtime to
    pub device_ids: Vec<String>,
    /// Fraction of GPU memory vLLM may use
    pub gpu_memory_utilization: f64,
    /// Maximum context length
    pub max_model_len: u32,
    /// Tensor parallel degree
    pub tensor_parallel_size: u32,
    /// Report prompt token details
    pub enable_prompt_token_stats: bool,
    /// Serving replicas
    pub replicas: i32,
}

impl DeploymentParams {
    fn server_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--gpu-memory-utilization={:.1}", self.gpu_memory_utilization),
            format!("--max-model-len={}", self.max_model_len),
            format!("--tensor-parallel-size={}", self.tensor_parallel_size),
        ];
        if self.enable_prompt_token_stats {
            args.push("--enable-prompt-tokens-details".to_string());
        }
        args
    }

    fn device_requests(&self) -> Vec<DeviceRequest> {
        if self.device_ids.is_empty() {
            return Vec::new();
        }
        vec![DeviceRequest {
            driver: "nvidia".to_string(),
            count: self.device_ids.len() as u32,
            capabilities: vec!["gpu".to_string(), "nvidia-compute".to_string()],
            device_ids: self.device_ids.clone(),
        }]
    }

    fn resources(&self) -> ResourceRequirements {
        ResourceRequirements {
            limits: BTreeMap::from([(
                GPU_RESOURCE.to_string(),
                self.device_ids.len().to_string(),
            )]),
            requests: BTreeMap::from([
                ("cpu".to_string(), "10".to_string()),
                ("memory".to_string(), "32Gi".to_string()),
            ]),
        }
    }
}

impl RuntimeTemplate {
    /// Render a complete document for a new deployment, action `start`
    pub fn from_params(params: &DeploymentParams) -> Self {
        let namespace = normalize_namespace(&params.namespace);
        let mut template = Self::empty(&params.name, &namespace);

        let spec = &mut template.spec;
        spec.namespace = Some(namespace);
        spec.model = Some(params.model.clone());
        spec.runtime_name = Some(params.runtime_name.clone());
        spec.replicas = Some(params.replicas);
        spec.args = params.server_args();
        spec.storage_uri = Some(params.storage_uri.clone());
        spec.action = Some(LifecycleAction::Start.to_string());
        spec.vllm_config = Some(VllmConfig {
            port: Some(SERVER_PORT),
            v1: Some(true),
            env: vec![EnvVar::new("HF_HOME", "/data")],
        });
        spec.deployment_config = Some(DeploymentConfig {
            resources: Some(params.resources()),
            device_requests: params.device_requests(),
            image: Some(ImageSpec {
                registry: IMAGE_REGISTRY.to_string(),
                name: IMAGE_NAME.to_string(),
                pull_policy: Some(IMAGE_PULL_POLICY.to_string()),
            }),
        });

        template
    }
}
