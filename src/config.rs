//! Operator configuration
//!
//! Assembled once in `main` from CLI flags and environment, then handed to
//! the collaborators that need it. Nothing reads the environment after that.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{ClusterControlPlane, ControlPlane, HttpControlPlane};
use crate::store::ObjectStore;
use crate::template::TemplateResolver;
use crate::{Error, DEFAULT_NAMESPACE, DEFAULT_TEMPLATE_DIR, FIELD_MANAGER};

/// Which control plane drives the runtimes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdapterKind {
    /// Write the desired action into the `VLLM` object
    #[default]
    Cluster,
    /// Call the remote vLLM control API
    Http,
}

impl std::str::FromStr for AdapterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cluster" => Ok(Self::Cluster),
            "http" => Ok(Self::Http),
            _ => Err(Error::validation(format!(
                "invalid adapter: {s}, expected one of: cluster, http"
            ))),
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cluster => write!(f, "cluster"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Runtime configuration for the operator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Directory holding `{model}.yaml` templates
    pub template_dir: PathBuf,
    /// Namespace used when a request leaves it empty
    pub namespace: String,
    /// Field manager for writes to the API server
    pub field_manager: String,
    /// Base URL of the remote control API
    pub control_endpoint: Option<String>,
    /// Control plane implementation
    pub adapter: AdapterKind,
    /// Requeue delay after a failed reconcile
    pub error_requeue: Duration,
    /// Periodic resync after a successful reconcile
    pub resync_interval: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            namespace: DEFAULT_NAMESPACE.to_string(),
            field_manager: FIELD_MANAGER.to_string(),
            control_endpoint: None,
            adapter: AdapterKind::default(),
            error_requeue: Duration::from_secs(5),
            resync_interval: Duration::from_secs(300),
        }
    }
}

impl OperatorConfig {
    /// Check that the chosen adapter has what it needs
    pub fn validate(&self) -> Result<(), Error> {
        if self.adapter == AdapterKind::Http
            && self.control_endpoint.as_deref().map_or(true, str::is_empty)
        {
            return Err(Error::validation(
                "http adapter requires a control endpoint (VLLM_CONTROL_ENDPOINT)",
            ));
        }
        if self.field_manager.is_empty() {
            return Err(Error::validation("field manager must not be empty"));
        }
        Ok(())
    }

    /// Build the configured control plane
    pub fn control_plane(
        &self,
        templates: Arc<dyn TemplateResolver>,
        objects: Arc<dyn ObjectStore>,
    ) -> Result<Arc<dyn ControlPlane>, Error> {
        self.validate()?;
        match self.adapter {
            AdapterKind::Cluster => Ok(Arc::new(ClusterControlPlane::new(templates, objects))),
            AdapterKind::Http => {
                let endpoint = self.control_endpoint.clone().unwrap_or_default();
                Ok(Arc::new(HttpControlPlane::new(endpoint)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryObjectStore;
    use crate::template::StaticTemplateResolver;

    #[test]
    fn defaults_use_cluster_adapter() {
        let config = OperatorConfig::default();
        assert_eq!(config.adapter, AdapterKind::Cluster);
        assert_eq!(config.namespace, "default");
        assert_eq!(config.error_requeue, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn http_adapter_requires_endpoint() {
        let config = OperatorConfig {
            adapter: AdapterKind::Http,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = OperatorConfig {
            control_endpoint: Some("http://vllm-service:8000".to_string()),
            ..config
        };
        assert!(config.validate().is_ok());
        assert!(config
            .control_plane(
                Arc::new(StaticTemplateResolver::new()),
                Arc::new(InMemoryObjectStore::new()),
            )
            .is_ok());
    }

    #[test]
    fn adapter_kind_parses_case_insensitively() {
        assert_eq!("HTTP".parse::<AdapterKind>().unwrap(), AdapterKind::Http);
        assert_eq!("cluster".parse::<AdapterKind>().unwrap(), AdapterKind::Cluster);
        assert!("grpc".parse::<AdapterKind>().is_err());
        assert_eq!(AdapterKind::Http.to_string(), "http");
    }
}
