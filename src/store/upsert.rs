//! Idempotent create-or-patch of `VLLM` objects
//!
//! The template for the requested model is resolved and validated, its
//! identity and action are overridden, and the result is either created or
//! merge-patched onto the existing object. Repeating the same upsert converges
//! on the same object.

use std::sync::Arc;

use tracing::{debug, info};

use super::objects::ObjectStore;
use crate::crd::VllmRuntime;
use crate::runtime::{normalize_namespace, LifecycleAction};
use crate::template::TemplateResolver;
use crate::Error;

/// Fields the caller stamps onto the template before writing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpecOverrides {
    /// Desired lifecycle action
    pub action: Option<LifecycleAction>,
    /// Object to write, replacing the template's `metadata.name`
    ///
    /// Also becomes `spec.runtimeName`, so the object can be found again by
    /// its runtime key.
    pub runtime_name: Option<String>,
}

impl SpecOverrides {
    /// Overrides that only set the action
    pub fn action(action: LifecycleAction) -> Self {
        Self {
            action: Some(action),
            runtime_name: None,
        }
    }

    /// Overrides addressing the object named `runtime_name`
    pub fn for_runtime(runtime_name: impl Into<String>, action: LifecycleAction) -> Self {
        Self {
            action: Some(action),
            runtime_name: Some(runtime_name.into()),
        }
    }
}

/// Result of an upsert
#[derive(Clone, Debug, PartialEq)]
pub enum UpsertOutcome {
    /// No object existed; the full document was created
    Created(VllmRuntime),
    /// The object existed; its spec was merge-patched
    Patched(VllmRuntime),
}

impl UpsertOutcome {
    /// The object as stored after the upsert
    pub fn object(&self) -> &VllmRuntime {
        match self {
            Self::Created(obj) | Self::Patched(obj) => obj,
        }
    }

    /// True if the object was created
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Runs the create-or-patch algorithm against an object store
#[derive(Clone)]
pub struct Upserter {
    templates: Arc<dyn TemplateResolver>,
    objects: Arc<dyn ObjectStore>,
}

impl Upserter {
    /// Create an upserter from a template source and an object store
    pub fn new(templates: Arc<dyn TemplateResolver>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { templates, objects }
    }

    /// Create or patch the object for `model` in `namespace`
    pub async fn upsert(
        &self,
        namespace: &str,
        model: &str,
        overrides: &SpecOverrides,
    ) -> Result<UpsertOutcome, Error> {
        let mut template = self.templates.resolve(model).await?;
        template.validate(model)?;

        // Identity follows the requested model; deployment parameters stay as templated
        if template.spec.model.as_deref() != Some(model) {
            template.spec.model = Some(model.to_string());
            template.spec.runtime_name = Some(model.to_string());
        }
        if let Some(runtime_name) = overrides.runtime_name.as_deref().filter(|n| !n.is_empty()) {
            template.metadata.name = Some(runtime_name.to_string());
            template.spec.runtime_name = Some(runtime_name.to_string());
        }
        if let Some(action) = overrides.action {
            template.spec.action = Some(action.to_string());
        }

        let namespace = normalize_namespace(namespace);
        let name = template.name().unwrap_or_default().to_string();

        match self.objects.get(&namespace, &name).await? {
            None => {
                let object = template.into_resource(&namespace);
                let created = self.objects.create(&namespace, &object).await?;
                info!(%namespace, %name, model, "created VLLM object");
                Ok(UpsertOutcome::Created(created))
            }
            Some(_) => {
                let patch = serde_json::json!({ "spec": template.spec });
                let patched = self.objects.merge_patch(&namespace, &name, &patch).await?;
                debug!(%namespace, %name, model, "patched VLLM spec");
                Ok(UpsertOutcome::Patched(patched))
            }
        }
    }
}
