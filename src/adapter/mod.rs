//! External control plane adapters
//!
//! The orchestration service drives runtimes through the [`ControlPlane`]
//! trait. Implementations:
//!
//! - [`ClusterControlPlane`] - mutates the `VLLM` object itself
//! - [`HttpControlPlane`] - calls a remote vLLM control API
//!
//! Adapters perform no retries and impose no timeouts; dropping the returned
//! future cancels the in-flight call.

mod cluster;
mod http;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::runtime::{LifecycleAction, RuntimeKey};
use crate::Error;

pub use cluster::ClusterControlPlane;
pub use http::HttpControlPlane;

/// Effects a lifecycle action on the system that actually runs the model
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Bring the runtime up
    async fn start(&self, key: &RuntimeKey) -> Result<(), Error>;

    /// Bring the runtime down
    async fn stop(&self, key: &RuntimeKey) -> Result<(), Error>;

    /// Roll out new deployment parameters
    async fn update(&self, key: &RuntimeKey) -> Result<(), Error>;
}

/// Dispatch `action` to the matching adapter call
pub async fn execute(
    control_plane: &dyn ControlPlane,
    action: LifecycleAction,
    key: &RuntimeKey,
) -> Result<(), Error> {
    match action {
        LifecycleAction::Start => control_plane.start(key).await,
        LifecycleAction::Stop => control_plane.stop(key).await,
        LifecycleAction::Update => control_plane.update(key).await,
    }
}
