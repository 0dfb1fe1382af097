//! Orchestration service
//!
//! Every lifecycle operation runs the same sequence under a per-key lock:
//!
//! 1. Load the instance (materialized as `Stopped` when unknown)
//! 2. Check the transition on a copy; an illegal request never reaches the
//!    control plane
//! 3. Call the control plane
//! 4. Apply the transition and persist it
//! 5. Re-read and return the stored instance
//!
//! The external call happens before anything is persisted, so a control
//! plane failure leaves the stored status untouched.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::adapter::{self, ControlPlane};
use crate::crd::{RuntimePhase, VllmRuntimeStatus};
use crate::runtime::{normalize_namespace, LifecycleAction, RuntimeInstance, RuntimeKey};
use crate::store::RuntimeStore;
use crate::Error;

/// Model reported for objects that do not declare one
const UNKNOWN_MODEL: &str = "unknown";

/// One async mutex per runtime key
///
/// Entries are created on first use and removed when the last holder or
/// waiter lets go.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<RuntimeKey, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &RuntimeKey) -> KeyedGuard<'_> {
        // Clone the Arc out so the map shard is not held across the await
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            locks: &self.locks,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently locked or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if no key is locked or waited on
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one key, released on drop
pub struct KeyedGuard<'a> {
    locks: &'a DashMap<RuntimeKey, Arc<Mutex<()>>>,
    key: RuntimeKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // Unlock first; afterwards only the table and pending waiters hold the mutex
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Listing projection of a `VLLM` object
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RuntimeSummary {
    /// Object name
    pub name: String,
    /// Served model, `unknown` when not declared
    pub model: String,
    /// Reported phase
    pub phase: String,
}

/// Sequences lifecycle operations against a store and a control plane
pub struct RuntimeService {
    store: Arc<dyn RuntimeStore>,
    control_plane: Arc<dyn ControlPlane>,
    locks: KeyedLocks,
}

impl RuntimeService {
    /// Create a service over the given collaborators
    pub fn new(store: Arc<dyn RuntimeStore>, control_plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            store,
            control_plane,
            locks: KeyedLocks::new(),
        }
    }

    /// Start a runtime
    pub async fn start(
        &self,
        namespace: &str,
        runtime_name: &str,
        model: &str,
    ) -> Result<RuntimeInstance, Error> {
        self.run(LifecycleAction::Start, RuntimeKey::new(namespace, runtime_name, model))
            .await
    }

    /// Stop a runtime
    pub async fn stop(
        &self,
        namespace: &str,
        runtime_name: &str,
        model: &str,
    ) -> Result<RuntimeInstance, Error> {
        self.run(LifecycleAction::Stop, RuntimeKey::new(namespace, runtime_name, model))
            .await
    }

    /// Roll out new deployment parameters to a running runtime
    pub async fn update(
        &self,
        namespace: &str,
        runtime_name: &str,
        model: &str,
    ) -> Result<RuntimeInstance, Error> {
        self.run(LifecycleAction::Update, RuntimeKey::new(namespace, runtime_name, model))
            .await
    }

    /// Run `action` against the runtime identified by `key`
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn run(&self, action: LifecycleAction, key: RuntimeKey) -> Result<RuntimeInstance, Error> {
        key.validate()?;
        let _guard = self.locks.lock(&key).await;

        let current = self.store.find_by_key(&key).await?;
        let mut next = current.clone();
        next.apply(action)?;
        debug!(from = %current.status, to = %next.status, "transition allowed");

        if let Err(e) = adapter::execute(self.control_plane.as_ref(), action, &key).await {
            warn!(error = %e, %action, "control plane call failed");
            return Err(e);
        }

        self.store.save(&next).await?;
        let refreshed = self.store.find_by_key(&key).await?;
        info!(%action, status = %refreshed.status, "lifecycle operation completed");
        Ok(refreshed)
    }

    /// Current instance for a key, without side effects on the control plane
    pub async fn get_status(
        &self,
        namespace: &str,
        runtime_name: &str,
        model: &str,
    ) -> Result<RuntimeInstance, Error> {
        let key = RuntimeKey::new(namespace, runtime_name, model);
        key.validate()?;
        self.store.find_by_key(&key).await
    }

    /// Summaries of every object in a namespace
    pub async fn list(&self, namespace: &str) -> Result<Vec<RuntimeSummary>, Error> {
        let objects = self.store.list(&normalize_namespace(namespace)).await?;
        Ok(objects
            .iter()
            .map(|obj| RuntimeSummary {
                name: obj.metadata.name.clone().unwrap_or_default(),
                model: obj
                    .spec
                    .model
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
                phase: obj.phase().to_string(),
            })
            .collect())
    }

    /// Summaries of objects whose reported phase is `Running`
    pub async fn list_running(&self, namespace: &str) -> Result<Vec<RuntimeSummary>, Error> {
        let running = RuntimePhase::Running.to_string();
        let mut summaries = self.list(namespace).await?;
        summaries.retain(|s| s.phase == running);
        Ok(summaries)
    }

    /// Write a status report onto an object
    pub async fn record_status(
        &self,
        namespace: &str,
        runtime_name: &str,
        report: &VllmRuntimeStatus,
    ) -> Result<(), Error> {
        self.store
            .patch_status(&normalize_namespace(namespace), runtime_name, report)
            .await
    }
}
