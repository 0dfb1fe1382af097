//! Resource store
//!
//! [`RuntimeStore`] is the persistence capability the orchestration service
//! depends on. Two implementations exist:
//!
//! - [`InMemoryRuntimeStore`] keeps instance status in a local keyed table
//! - [`DeclarativeRuntimeStore`] derives status from the `VLLM` objects
//!
//! Both share the create-or-patch algorithm in [`upsert`].

mod declarative;
mod memory;
pub mod objects;
pub mod upsert;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::crd::{VllmRuntime, VllmRuntimeStatus};
use crate::runtime::{RuntimeInstance, RuntimeKey};
use crate::Error;

pub use declarative::DeclarativeRuntimeStore;
pub use memory::InMemoryRuntimeStore;
pub use objects::{InMemoryObjectStore, KubeObjectStore, ObjectStore};
pub use upsert::{SpecOverrides, UpsertOutcome, Upserter};

/// Persistence operations for runtime instances and their objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RuntimeStore: Send + Sync {
    /// Look up an instance, materializing it as `Stopped` when unknown
    ///
    /// Never fails with "not found".
    async fn find_by_key(&self, key: &RuntimeKey) -> Result<RuntimeInstance, Error>;

    /// Persist an instance's status
    async fn save(&self, instance: &RuntimeInstance) -> Result<(), Error>;

    /// Create or patch the `VLLM` object for `model`
    async fn upsert_declarative_object(
        &self,
        namespace: &str,
        model: &str,
        overrides: &SpecOverrides,
    ) -> Result<UpsertOutcome, Error>;

    /// Merge-patch the status of an object, leaving its spec alone
    async fn patch_status(
        &self,
        namespace: &str,
        runtime_name: &str,
        report: &VllmRuntimeStatus,
    ) -> Result<(), Error>;

    /// All objects in a namespace
    async fn list(&self, namespace: &str) -> Result<Vec<VllmRuntime>, Error>;
}
