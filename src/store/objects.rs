//! Declarative object store
//!
//! Thin CRUD surface over `VLLM` objects. [`KubeObjectStore`] talks to the
//! API server; [`InMemoryObjectStore`] keeps JSON documents in process and
//! applies JSON merge patches (RFC 7386) with `json_patch::merge`.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{VllmRuntime, VllmRuntimeStatus, VLLM_KIND};
use crate::Error;

/// CRUD operations on `VLLM` objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<VllmRuntime>, Error>;

    /// Create a new object
    async fn create(&self, namespace: &str, object: &VllmRuntime) -> Result<VllmRuntime, Error>;

    /// Apply a JSON merge patch to an existing object
    ///
    /// Fails `NotFound` when the object does not exist.
    async fn merge_patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<VllmRuntime, Error>;

    /// Merge-patch the status subresource only
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &VllmRuntimeStatus,
    ) -> Result<VllmRuntime, Error>;

    /// List all objects in a namespace
    async fn list(&self, namespace: &str) -> Result<Vec<VllmRuntime>, Error>;
}

/// Object store backed by the Kubernetes API
pub struct KubeObjectStore {
    client: Client,
    field_manager: String,
}

impl KubeObjectStore {
    /// Create a store using `field_manager` for all writes
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, namespace: &str) -> Api<VllmRuntime> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn map_write_error(err: kube::Error, name: &str, namespace: &str, what: &str) -> Error {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Error::not_found(name, namespace),
            e => Error::store_kube(format!("failed to {what} {VLLM_KIND} {namespace}/{name}"), e),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<VllmRuntime>, Error> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| Error::store_kube(format!("failed to get {VLLM_KIND} {namespace}/{name}"), e))
    }

    async fn create(&self, namespace: &str, object: &VllmRuntime) -> Result<VllmRuntime, Error> {
        let pp = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        let name = object.metadata.name.clone().unwrap_or_default();
        self.api(namespace)
            .create(&pp, object)
            .await
            .map_err(|e| Self::map_write_error(e, &name, namespace, "create"))
    }

    async fn merge_patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<VllmRuntime, Error> {
        self.api(namespace)
            .patch(
                name,
                &PatchParams::apply(&self.field_manager),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| Self::map_write_error(e, name, namespace, "patch"))
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &VllmRuntimeStatus,
    ) -> Result<VllmRuntime, Error> {
        let status_patch = serde_json::json!({
            "status": status
        });

        self.api(namespace)
            .patch_status(
                name,
                &PatchParams::apply(&self.field_manager),
                &Patch::Merge(&status_patch),
            )
            .await
            .map_err(|e| Self::map_write_error(e, name, namespace, "patch status of"))
    }

    async fn list(&self, namespace: &str) -> Result<Vec<VllmRuntime>, Error> {
        let list = self
            .api(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::store_kube(format!("failed to list {VLLM_KIND} in {namespace}"), e))?;
        Ok(list.items)
    }
}

/// Object store holding documents in process memory
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), Value>>,
}

impl InMemoryObjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects across all namespaces
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True if no objects are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<(String, String), Value>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<(String, String), Value>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }

    fn decode(doc: &Value) -> Result<VllmRuntime, Error> {
        Ok(serde_json::from_value(doc.clone())?)
    }

    fn patch_document(&self, namespace: &str, name: &str, patch: &Value) -> Result<VllmRuntime, Error> {
        let mut objects = self.write();
        let doc = objects
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| Error::not_found(name, namespace))?;

        // Validate on a copy so a patch that breaks the schema leaves the stored document intact
        let mut patched = doc.clone();
        json_patch::merge(&mut patched, patch);
        let object = Self::decode(&patched)?;
        *doc = patched;
        Ok(object)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<VllmRuntime>, Error> {
        self.read()
            .get(&(namespace.to_string(), name.to_string()))
            .map(Self::decode)
            .transpose()
    }

    async fn create(&self, namespace: &str, object: &VllmRuntime) -> Result<VllmRuntime, Error> {
        let name = object
            .metadata
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::validation("object must specify metadata.name"))?;

        let mut object = object.clone();
        object.metadata.namespace = Some(namespace.to_string());
        let doc = serde_json::to_value(&object)?;

        let mut objects = self.write();
        let key = (namespace.to_string(), name.clone());
        if objects.contains_key(&key) {
            return Err(Error::validation(format!(
                "{VLLM_KIND} {name:?} already exists in namespace {namespace}"
            )));
        }
        debug!(namespace, name = %name, "created object");
        objects.insert(key, doc);
        Ok(object)
    }

    async fn merge_patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<VllmRuntime, Error> {
        self.patch_document(namespace, name, patch)
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &VllmRuntimeStatus,
    ) -> Result<VllmRuntime, Error> {
        let status_patch = serde_json::json!({
            "status": status
        });
        self.patch_document(namespace, name, &status_patch)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<VllmRuntime>, Error> {
        self.read()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, doc)| Self::decode(doc))
            .collect()
    }
}
