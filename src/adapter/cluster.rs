//! Control plane that acts on the `VLLM` objects themselves

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::ControlPlane;
use crate::runtime::{LifecycleAction, RuntimeKey};
use crate::store::{ObjectStore, SpecOverrides, Upserter};
use crate::template::TemplateResolver;
use crate::Error;

/// Drives runtimes by writing the desired action into their `VLLM` object
///
/// The in-cluster operator for the `VLLM` kind does the actual serving work.
pub struct ClusterControlPlane {
    objects: Arc<dyn ObjectStore>,
    upserter: Upserter,
}

impl ClusterControlPlane {
    /// Create an adapter over the given templates and objects
    pub fn new(templates: Arc<dyn TemplateResolver>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            upserter: Upserter::new(templates, objects.clone()),
            objects,
        }
    }

    async fn require_object(&self, key: &RuntimeKey, action: LifecycleAction) -> Result<(), Error> {
        match self.objects.get(&key.namespace, &key.runtime_name).await? {
            Some(_) => Ok(()),
            None => {
                info!(key = %key, %action, "object not found");
                Err(Error::not_found(&key.runtime_name, &key.namespace))
            }
        }
    }
}

#[async_trait]
impl ControlPlane for ClusterControlPlane {
    #[instrument(skip(self, key), fields(key = %key))]
    async fn start(&self, key: &RuntimeKey) -> Result<(), Error> {
        let outcome = self
            .upserter
            .upsert(
                &key.namespace,
                &key.model,
                &SpecOverrides::for_runtime(&key.runtime_name, LifecycleAction::Start),
            )
            .await?;
        info!(created = outcome.is_created(), "start requested");
        Ok(())
    }

    #[instrument(skip(self, key), fields(key = %key))]
    async fn stop(&self, key: &RuntimeKey) -> Result<(), Error> {
        self.require_object(key, LifecycleAction::Stop).await?;

        let patch = serde_json::json!({
            "spec": { "action": LifecycleAction::Stop.as_str() }
        });
        self.objects
            .merge_patch(&key.namespace, &key.runtime_name, &patch)
            .await?;
        info!("stop requested");
        Ok(())
    }

    #[instrument(skip(self, key), fields(key = %key))]
    async fn update(&self, key: &RuntimeKey) -> Result<(), Error> {
        self.require_object(key, LifecycleAction::Update).await?;

        self.upserter
            .upsert(
                &key.namespace,
                &key.model,
                &SpecOverrides::for_runtime(&key.runtime_name, LifecycleAction::Update),
            )
            .await?;
        info!("update requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::VllmRuntimeSpec;
    use crate::store::objects::{InMemoryObjectStore, MockObjectStore};
    use crate::template::StaticTemplateResolver;

    const LLAMA: &str = r#"
apiVersion: vllm.ai/v1
kind: VLLM
metadata:
  name: llama-rt
spec:
  model: llama
  runtimeName: llama-rt
  replicas: 2
"#;

    fn adapter(objects: Arc<dyn ObjectStore>) -> ClusterControlPlane {
        let templates = StaticTemplateResolver::new()
            .with_yaml("llama", LLAMA)
            .unwrap();
        ClusterControlPlane::new(Arc::new(templates), objects)
    }

    fn key() -> RuntimeKey {
        RuntimeKey::new("ns1", "rt1", "llama")
    }

    #[tokio::test]
    async fn start_creates_object_with_start_action() {
        let objects = Arc::new(InMemoryObjectStore::new());
        adapter(objects.clone()).start(&key()).await.unwrap();

        let stored = objects.get("ns1", "rt1").await.unwrap().unwrap();
        assert_eq!(stored.spec.action.as_deref(), Some("start"));
        assert_eq!(stored.spec.runtime_name.as_deref(), Some("rt1"));
        assert_eq!(objects.len(), 1);
    }

    #[tokio::test]
    async fn stop_patches_only_the_action() {
        let objects = Arc::new(InMemoryObjectStore::new());
        let cp = adapter(objects.clone());
        cp.start(&key()).await.unwrap();

        cp.stop(&key()).await.unwrap();

        let stored = objects.get("ns1", "rt1").await.unwrap().unwrap();
        assert_eq!(stored.spec.action.as_deref(), Some("stop"));
        assert_eq!(stored.spec.replicas, Some(2));
    }

    #[tokio::test]
    async fn stop_without_object_is_not_found() {
        let mut objects = MockObjectStore::new();
        objects.expect_get().returning(|_, _| Ok(None));
        objects.expect_merge_patch().never();

        let err = adapter(Arc::new(objects)).stop(&key()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn update_requires_existing_object() {
        let objects = Arc::new(InMemoryObjectStore::new());
        let err = adapter(objects.clone()).update(&key()).await.unwrap_err();

        assert!(err.is_not_found());
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn update_patches_existing_object() {
        let objects = Arc::new(InMemoryObjectStore::new());
        objects
            .create(
                "ns1",
                &crate::crd::VllmRuntime::new(
                    "rt1",
                    VllmRuntimeSpec {
                        model: Some("llama".to_string()),
                        action: Some("start".to_string()),
                        ..Default::default()
                    },
                ),
            )
            .await
            .unwrap();

        adapter(objects.clone()).update(&key()).await.unwrap();

        let stored = objects.get("ns1", "rt1").await.unwrap().unwrap();
        assert_eq!(stored.spec.action.as_deref(), Some("update"));
        assert_eq!(stored.spec.replicas, Some(2));
    }
}
