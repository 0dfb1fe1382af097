//! Runtime store with a process-local status table

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::objects::ObjectStore;
use super::upsert::{SpecOverrides, UpsertOutcome, Upserter};
use super::RuntimeStore;
use crate::crd::{VllmRuntime, VllmRuntimeStatus};
use crate::runtime::{RuntimeInstance, RuntimeKey};
use crate::template::TemplateResolver;
use crate::Error;

/// Keeps instance status in memory and delegates objects to an [`ObjectStore`]
///
/// The table is the source of truth for instance status. Entries are created
/// on first lookup and never removed.
pub struct InMemoryRuntimeStore {
    instances: DashMap<RuntimeKey, RuntimeInstance>,
    objects: Arc<dyn ObjectStore>,
    upserter: Upserter,
}

impl InMemoryRuntimeStore {
    /// Create a store over the given templates and objects
    pub fn new(templates: Arc<dyn TemplateResolver>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            instances: DashMap::new(),
            upserter: Upserter::new(templates, objects.clone()),
            objects,
        }
    }

    /// Number of materialized instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// True if no instance has been looked up yet
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[async_trait]
impl RuntimeStore for InMemoryRuntimeStore {
    async fn find_by_key(&self, key: &RuntimeKey) -> Result<RuntimeInstance, Error> {
        let entry = self.instances.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, "materializing runtime instance");
            RuntimeInstance::new(key)
        });
        Ok(entry.value().clone())
    }

    async fn save(&self, instance: &RuntimeInstance) -> Result<(), Error> {
        self.instances.insert(instance.key(), instance.clone());
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
