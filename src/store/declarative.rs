//! Runtime store that reads instance status from `VLLM` objects

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::objects::ObjectStore;
use super::upsert::{SpecOverrides, UpsertOutcome, Upserter};
use super::RuntimeStore;
use crate::crd::{VllmRuntime, VllmRuntimeStatus};
use crate::runtime::{RuntimeInstance, RuntimeKey, RuntimeStatus};
use crate::template::TemplateResolver;
use crate::Error;

/// Derives instance status from the object named by the key's runtime name
///
/// The declared action is the latest committed intent and wins; a reported
/// phase is used only when no recognized action is declared. `save` is a
/// no-op because the object is the record.
pub struct DeclarativeRuntimeStore {
    objects: Arc<dyn ObjectStore>,
    upserter: Upserter,
}

impl DeclarativeRuntimeStore {
    /// Create a store over the given templates and objects
    pub fn new(templates: Arc<dyn TemplateResolver>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            upserter: Upserter::new(templates, objects.clone()),
            objects,
        }
    }

    fn derive_status(object: &VllmRuntime) -> RuntimeStatus {
        object
            .spec
            .lifecycle_action()
            .map(|action| action.target_status())
            .or_else(|| object.status.as_ref().and_then(|s| s.phase.as_status()))
            .unwrap_or(RuntimeStatus::Stopped)
    }
}

#[async_trait]
impl RuntimeStore for DeclarativeRuntimeStore {
    async fn find_by_key(&self, key: &RuntimeKey) -> Result<RuntimeInstance, Error> {
        let status = match self.objects.get(&key.namespace, &key.runtime_name).await? {
            Some(object) => Self::derive_status(&object),
            None => {
                debug!(key = %key, "no object yet, treating runtime as stopped");
                RuntimeStatus::Stopped
            }
        };
        Ok(RuntimeInstance::with_status(key, status))
    }

    async fn save(&self, _instance: &RuntimeInstance) -> Result<(), Error> {
        Ok(())
    }

    async fn upsert_declarative_object(
        &self,
        namespace: &str,
        model: &str,
        overrides: &SpecOverrides,
    ) -> Result<UpsertOutcome, Error> {
        self.upserter.upsert(namespace, model, overrides).await
    }

    async fn patch_status(
        &self,
        namespace: &str,
        runtime_name: &str,
        report: &VllmRuntimeStatus,
    ) -> Result<(), Error> {
        self.objects
            .patch_status(namespace, runtime_name, report)
            .await
            .map(|_| ())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<VllmRuntime>, Error> {
        self.objects.list(namespace).await
    }
}
