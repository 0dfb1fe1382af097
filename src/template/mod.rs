//! Model templates
//!
//! Every servable model has a template: a complete `VLLM` document with
//! deployment defaults. The resource store resolves the template for a
//! requested model, overrides its identity and action, and writes it to the
//! cluster.

mod params;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{VllmRuntime, VllmRuntimeSpec, VLLM_API_VERSION, VLLM_KIND};
use crate::Error;

pub use params::DeploymentParams;

/// A `VLLM` document as read from a template source
///
/// Kind and name are not checked on decode; [`RuntimeTemplate::validate`]
/// reports them as typed errors instead.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeTemplate {
    /// API version declared by the template
    #[serde(default)]
    pub api_version: String,

    /// Resource kind declared by the template
    #[serde(default)]
    pub kind: String,

    /// Object metadata (name is required)
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Desired spec with deployment defaults
    #[serde(default)]
    pub spec: VllmRuntimeSpec,
}

impl RuntimeTemplate {
    /// Decode a YAML template for `model`
    pub fn from_yaml(model: &str, yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml).map_err(|e| Error::TemplateInvalid {
            model: model.to_string(),
            message: e.to_string(),
        })
    }

    /// Encode the template as YAML
    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).map_err(|e| Error::serialization(e.to_string()))
    }

    /// Declared resource name, if non-empty
    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref().filter(|n| !n.is_empty())
    }

    /// Check kind and identity before anything is written
    pub fn validate(&self, model: &str) -> Result<(), Error> {
        if self.kind != VLLM_KIND {
            return Err(Error::SchemaMismatch {
                expected: VLLM_KIND.to_string(),
                found: self.kind.clone(),
            });
        }
        if self.name().is_none() {
            return Err(Error::MissingIdentity {
                model: model.to_string(),
            });
        }
        Ok(())
    }

    /// Build the cluster object placed in `namespace`
    pub fn into_resource(self, namespace: &str) -> VllmRuntime {
        let mut metadata = self.metadata;
        metadata.namespace = Some(namespace.to_string());
        VllmRuntime {
            metadata,
            spec: self.spec,
            status: None,
        }
    }

    fn empty(name: &str, namespace: &str) -> Self {
        Self {
            api_version: VLLM_API_VERSION.to_string(),
            kind: VLLM_KIND.to_string(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: VllmRuntimeSpec::default(),
        }
    }
}

/// Trait resolving a model identifier to its template
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TemplateResolver: Send + Sync {
    /// Resolve the template for `model`
    ///
    /// Fails `TemplateNotFound` when no template exists and
    /// `TemplateInvalid` when it cannot be decoded.
    async fn resolve(&self, model: &str) -> Result<RuntimeTemplate, Error>;
}

/// Resolves templates from `{dir}/{model}.yaml`
#[derive(Clone, Debug)]
pub struct FileTemplateResolver {
    dir: PathBuf,
}

impl FileTemplateResolver {
    /// Create a resolver rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory templates are read from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, model: &str) -> Result<PathBuf, Error> {
        // Model names become file names; reject anything that would leave the directory
        if model.is_empty() || model.contains(['/', '\\']) || model == "." || model == ".." {
            return Err(Error::validation(format!("invalid model name: {model:?}")));
        }
        Ok(self.dir.join(format!("{model}.yaml")))
    }
}

#[async_trait]
impl TemplateResolver for FileTemplateResolver {
    async fn resolve(&self, model: &str) -> Result<RuntimeTemplate, Error> {
        let path = self.path_for(model)?;
        debug!(path = %path.display(), "reading template");

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::TemplateNotFound {
                model: model.to_string(),
                message: format!("failed to read {}: {e}", path.display()),
            })?;

        RuntimeTemplate::from_yaml(model, &content)
    }
}

/// Serves templates held in memory
#[derive(Clone, Debug, Default)]
pub struct StaticTemplateResolver {
    templates: HashMap<String, RuntimeTemplate>,
}

impl StaticTemplateResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template for `model`
    pub fn with_template(mut self, model: impl Into<String>, template: RuntimeTemplate) -> Self {
        self.templates.insert(model.into(), template);
        self
    }

    /// Register a YAML template for `model`
    pub fn with_yaml(self, model: impl Into<String>, yaml: &str) -> Result<Self, Error> {
        let model = model.into();
        let template = RuntimeTemplate::from_yaml(&model, yaml)?;
        Ok(self.with_template(model, template))
    }
}

#[async_trait]
impl TemplateResolver for StaticTemplateResolver {
    async fn resolve(&self, model: &str) -> Result<RuntimeTemplate, Error> {
        self.templates
            .get(model)
            .cloned()
            .ok_or_else(|| Error::TemplateNotFound {
                model: model.to_string(),
                message: "no template registered".to_string(),
            })
    }
}
