//! VLLM controller implementation
//!
//! Re-derives the desired lifecycle action from each `VLLM` object, drives
//! it through the orchestration service, and writes the outcome back as a
//! status report. The status patch is attempted on every path so the object
//! never silently drifts from the last known outcome.

use std::sync::Arc;

use chrono::Utc;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::config::OperatorConfig;
use crate::crd::{Condition, ConditionStatus, RuntimePhase, VllmRuntime, VllmRuntimeStatus};
use crate::runtime::{LifecycleAction, RuntimeKey};
use crate::service::RuntimeService;
use crate::store::{InMemoryRuntimeStore, KubeObjectStore, ObjectStore};
use crate::template::{FileTemplateResolver, TemplateResolver};
use crate::Error;

/// Controller context shared across reconciles
pub struct Context {
    /// Object store used to fetch the current object
    pub objects: Arc<dyn ObjectStore>,
    /// Orchestration service driving lifecycle operations
    pub service: Arc<RuntimeService>,
    /// Operator configuration
    pub config: OperatorConfig,
}

impl Context {
    /// Create a context from explicit collaborators
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        service: Arc<RuntimeService>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            objects,
            service,
            config,
        }
    }

    /// Build the production context for a cluster
    ///
    /// Instance status is tracked in a process-local table; the `VLLM`
    /// objects carry intent and the reported outcome.
    pub fn for_cluster(client: Client, config: OperatorConfig) -> Result<Self, Error> {
        let objects: Arc<dyn ObjectStore> =
            Arc::new(KubeObjectStore::new(client, &config.field_manager));
        let templates: Arc<dyn TemplateResolver> =
            Arc::new(FileTemplateResolver::new(&config.template_dir));
        let control_plane = config.control_plane(templates.clone(), objects.clone())?;
        let store = Arc::new(InMemoryRuntimeStore::new(templates, objects.clone()));
        let service = Arc::new(RuntimeService::new(store, control_plane));
        Ok(Self::new(objects, service, config))
    }

    /// Create a context for testing with default configuration
    #[cfg(test)]
    pub fn for_testing(objects: Arc<dyn ObjectStore>, service: Arc<RuntimeService>) -> Self {
        Self::new(objects, service, OperatorConfig::default())
    }
}

/// Reconcile a VLLM object
///
/// Dispatches on `spec.action`: recognized actions run through the
/// orchestration service, anything else is reported as `Unknown` without
/// touching the control plane.
#[instrument(skip(runtime, ctx), fields(runtime = %runtime.name_any()))]
pub async fn reconcile(runtime: Arc<VllmRuntime>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = runtime.name_any();
    let namespace = runtime.namespace_or_default();

    // Work from a fresh copy; the cached event may be stale
    let Some(current) = ctx.objects.get(&namespace, &name).await? else {
        debug!("object no longer exists");
        return Ok(Action::await_change());
    };

    let model = current.spec.model.clone().unwrap_or_default();
    let Some(action) = current.spec.lifecycle_action() else {
        let declared = current.spec.action.clone().unwrap_or_default();
        warn!(action = %declared, "unrecognized action");
        update_status_unknown(&current, &ctx, &declared).await?;
        return Ok(Action::await_change());
    };

    info!(%action, model = %model, "reconciling runtime");
    let key = RuntimeKey::new(&namespace, &name, &model);

    match ctx.service.run(action, key).await {
        Ok(instance) => {
            debug!(status = %instance.status, "lifecycle operation applied");
            update_status_succeeded(&current, &ctx, action, &model, true).await?;
            Ok(Action::requeue(ctx.config.resync_interval))
        }
        Err(e) if e.is_benign() => {
            debug!(reason = %e, "runtime already converged");
            update_status_succeeded(&current, &ctx, action, &model, false).await?;
            Ok(Action::requeue(ctx.config.resync_interval))
        }
        Err(e) => {
            warn!(error = %e, %action, "lifecycle operation failed");
            if let Err(patch_err) = update_status_failed(&current, &ctx, action, &e).await {
                error!(error = %patch_err, "failed to record failure status");
            }
            Err(e)
        }
    }
}

/// Error policy for the controller
///
/// Requeues after the configured fixed delay.
pub fn error_policy(runtime: Arc<VllmRuntime>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        runtime = %runtime.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );
    Action::requeue(ctx.config.error_requeue)
}

fn base_status(runtime: &VllmRuntime) -> VllmRuntimeStatus {
    runtime.status.clone().unwrap_or_default()
}

/// Record the success phase for `action`
///
/// `transitioned` is false when the runtime was already in the requested
/// state; the start time then keeps its previous value.
async fn update_status_succeeded(
    runtime: &VllmRuntime,
    ctx: &Context,
    action: LifecycleAction,
    model: &str,
    transitioned: bool,
) -> Result<(), Error> {
    let (message, condition) = match action {
        LifecycleAction::Start => (
            format!("vLLM model '{model}' is running"),
            Condition::new(
                "Running",
                ConditionStatus::True,
                "ModelStarted",
                "vLLM model start operation succeeded",
            ),
        ),
        LifecycleAction::Stop => (
            format!("vLLM model '{model}' is stopped"),
            Condition::new(
                "Stopped",
                ConditionStatus::True,
                "ModelStopped",
                "vLLM model stop operation succeeded",
            ),
        ),
        LifecycleAction::Update => (
            format!("vLLM model '{model}' is updating"),
            Condition::new(
                "Updating",
                ConditionStatus::True,
                "ModelUpdateRequested",
                "vLLM model update operation initiated",
            ),
        ),
    };

    let mut status = base_status(runtime)
        .phase(RuntimePhase::from(action.target_status()))
        .message(message)
        .condition(condition);
    if action == LifecycleAction::Start && (transitioned || status.start_time.is_none()) {
        status = status.start_time(Utc::now());
    }

    ctx.service
        .record_status(&runtime.namespace_or_default(), &runtime.name_any(), &status)
        .await?;

    info!(phase = %status.phase, "updated status");
    Ok(())
}

/// Record a failed lifecycle operation
async fn update_status_failed(
    runtime: &VllmRuntime,
    ctx: &Context,
    action: LifecycleAction,
    error: &Error,
) -> Result<(), Error> {
    let reason = match action {
        LifecycleAction::Start => "StartFailed",
        LifecycleAction::Stop => "StopFailed",
        LifecycleAction::Update => "UpdateFailed",
    };
    let message = format!("failed to {action} runtime: {error}");

    let status = base_status(runtime)
        .phase(RuntimePhase::Failed)
        .message(message.clone())
        .condition(Condition::new(
            "Failed",
            ConditionStatus::True,
            reason,
            message,
        ));

    ctx.service
        .record_status(&runtime.namespace_or_default(), &runtime.name_any(), &status)
        .await?;

    info!("updated status to Failed");
    Ok(())
}

/// Record an unrecognized action
async fn update_status_unknown(
    runtime: &VllmRuntime,
    ctx: &Context,
    declared: &str,
) -> Result<(), Error> {
    let message = format!("unknown action {declared:?}, expected one of: start, stop, update");

    let status = base_status(runtime)
        .phase(RuntimePhase::Unknown)
        .message(message.clone())
        .condition(Condition::new(
            "Unknown",
            ConditionStatus::True,
            "UnrecognizedAction",
            message,
        ));

    ctx.service
        .record_status(&runtime.namespace_or_default(), &runtime.name_any(), &status)
        .await?;

    info!("updated status to Unknown");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc as StdArc, Mutex};
    use std::time::Duration;

    use crate::adapter::MockControlPlane;
    use crate::crd::VllmRuntimeSpec;
    use crate::store::objects::MockObjectStore;
    use crate::template::StaticTemplateResolver;

    /// Captures status patches written by the reconciler
    #[derive(Clone)]
    struct StatusCapture {
        updates: StdArc<Mutex<Vec<VllmRuntimeStatus>>>,
    }

    impl StatusCapture {
        fn new() -> Self {
            Self {
                updates: StdArc::new(Mutex::new(Vec::new())),
            }
        }

        fn record(&self, status: VllmRuntimeStatus) {
            self.updates.lock().unwrap().push(status);
        }

        fn last(&self) -> Option<VllmRuntimeStatus> {
            self.updates.lock().unwrap().last().cloned()
        }

        fn last_phase(&self) -> Option<RuntimePhase> {
            self.last().map(|s| s.phase)
        }

        fn count(&self) -> usize {
            self.updates.lock().unwrap().len()
        }
    }

    fn sample_runtime(action: &str) -> VllmRuntime {
        let mut rt = VllmRuntime::new(
            "rt1",
            VllmRuntimeSpec {
                model: Some("llama".to_string()),
                runtime_name: Some("rt1".to_string()),
                action: Some(action.to_string()),
                ..Default::default()
            },
        );
        rt.metadata.namespace = Some("ns1".to_string());
        rt
    }

    /// Object store that serves `object` and records status patches
    ///
    /// Reads see the most recently captured status, as the API server would.
    fn objects_with_capture(object: Option<VllmRuntime>) -> (Arc<MockObjectStore>, StatusCapture) {
        let capture = StatusCapture::new();
        let capture_clone = capture.clone();
        let observed = capture.clone();

        let mut objects = MockObjectStore::new();
        objects.expect_get().returning(move |_, _| {
            Ok(object.clone().map(|mut obj| {
                if let Some(status) = observed.last() {
                    obj.status = Some(status);
                }
                obj
            }))
        });
        objects
            .expect_patch_status()
            .returning(move |_, name, status| {
                capture_clone.record(status.clone());
                Ok(VllmRuntime::new(name, VllmRuntimeSpec::default()))
            });

        (Arc::new(objects), capture)
    }

    fn context(objects: Arc<MockObjectStore>, control_plane: MockControlPlane) -> Arc<Context> {
        let store = Arc::new(InMemoryRuntimeStore::new(
            Arc::new(StaticTemplateResolver::new()),
            objects.clone(),
        ));
        let service = Arc::new(RuntimeService::new(store, Arc::new(control_plane)));
        Arc::new(Context::for_testing(objects, service))
    }

    // ==========================================================================
    // Story Tests: Reconciling Declared Actions
    // ==========================================================================

    /// Story: a declared start runs the runtime and reports Running
    #[tokio::test]
    async fn story_start_action_reports_running() {
        let rt = sample_runtime("start");
        let (objects, capture) = objects_with_capture(Some(rt.clone()));
        let mut cp = MockControlPlane::new();
        cp.expect_start().times(1).returning(|_| Ok(()));
        let ctx = context(objects, cp);

        let action = reconcile(Arc::new(rt), ctx.clone()).await.unwrap();

        assert_eq!(action, Action::requeue(ctx.config.resync_interval));
        let status = capture.last().unwrap();
        assert_eq!(status.phase, RuntimePhase::Running);
        assert!(status.start_time.is_some());
        assert_eq!(status.conditions.last().unwrap().reason, "ModelStarted");
    }

    /// Story: reconciling a converged object does not call out again
    ///
    /// The second reconcile sees AlreadyRunning, which is treated as success,
    /// and writes the same phase without duplicating the condition.
    #[tokio::test]
    async fn story_repeat_reconcile_is_converged() {
        let rt = sample_runtime("start");
        let (objects, capture) = objects_with_capture(Some(rt.clone()));
        let mut cp = MockControlPlane::new();
        cp.expect_start().times(1).returning(|_| Ok(()));
        let ctx = context(objects, cp);

        reconcile(Arc::new(rt.clone()), ctx.clone()).await.unwrap();
        let first = capture.last().unwrap();
        reconcile(Arc::new(rt), ctx).await.unwrap();

        assert_eq!(capture.count(), 2);
        let second = capture.last().unwrap();
        assert_eq!(second.phase, RuntimePhase::Running);
        assert_eq!(second.conditions, first.conditions);
        assert_eq!(second.start_time, first.start_time);
    }

    /// Story: a control plane failure is reported as Failed and re-raised
    #[tokio::test]
    async fn story_failure_reports_failed_and_returns_error() {
        let rt = sample_runtime("start");
        let (objects, capture) = objects_with_capture(Some(rt.clone()));
        let mut cp = MockControlPlane::new();
        cp.expect_start()
            .returning(|_| Err(Error::adapter("http", "connection refused")));
        let ctx = context(objects, cp);

        let err = reconcile(Arc::new(rt), ctx).await.unwrap_err();

        assert!(matches!(err, Error::Adapter { .. }));
        let status = capture.last().unwrap();
        assert_eq!(status.phase, RuntimePhase::Failed);
        assert!(status.message.unwrap().contains("connection refused"));
        assert_eq!(status.conditions.last().unwrap().reason, "StartFailed");
    }

    /// Story: an unrecognized action is reported as Unknown, without error
    #[tokio::test]
    async fn story_unknown_action_reports_unknown() {
        let rt = sample_runtime("restart");
        let (objects, capture) = objects_with_capture(Some(rt.clone()));
        let mut cp = MockControlPlane::new();
        cp.expect_start().never();
        cp.expect_stop().never();
        cp.expect_update().never();
        let ctx = context(objects, cp);

        let action = reconcile(Arc::new(rt), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(capture.last_phase(), Some(RuntimePhase::Unknown));
        assert!(capture.last().unwrap().message.unwrap().contains("restart"));
    }

    #[tokio::test]
    async fn deleted_object_awaits_change_without_patch() {
        let rt = sample_runtime("start");
        let (objects, capture) = objects_with_capture(None);
        let mut cp = MockControlPlane::new();
        cp.expect_start().never();
        let ctx = context(objects, cp);

        let action = reconcile(Arc::new(rt), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(capture.count(), 0);
    }

    #[tokio::test]
    async fn update_while_stopped_reports_failed() {
        let rt = sample_runtime("update");
        let (objects, capture) = objects_with_capture(Some(rt.clone()));
        let mut cp = MockControlPlane::new();
        cp.expect_update().never();
        let ctx = context(objects, cp);

        let err = reconcile(Arc::new(rt), ctx).await.unwrap_err();

        assert!(!err.is_benign());
        assert_eq!(capture.last_phase(), Some(RuntimePhase::Failed));
        assert_eq!(capture.last().unwrap().conditions.last().unwrap().reason, "UpdateFailed");
    }

    #[tokio::test]
    async fn stop_on_fresh_runtime_reports_stopped() {
        let rt = sample_runtime("stop");
        let (objects, capture) = objects_with_capture(Some(rt.clone()));
        let mut cp = MockControlPlane::new();
        cp.expect_stop().never();
        let ctx = context(objects, cp);

        reconcile(Arc::new(rt), ctx).await.unwrap();

        assert_eq!(capture.last_phase(), Some(RuntimePhase::Stopped));
    }

    #[tokio::test]
    async fn status_patch_failure_surfaces_original_error() {
        let rt = sample_runtime("start");
        let served = rt.clone();
        let mut objects = MockObjectStore::new();
        objects
            .expect_get()
            .returning(move |_, _| Ok(Some(served.clone())));
        objects
            .expect_patch_status()
            .times(1)
            .returning(|_, _, _| Err(Error::store_unavailable("api server gone")));
        let mut cp = MockControlPlane::new();
        cp.expect_start()
            .returning(|_| Err(Error::adapter("http", "connection refused")));
        let ctx = context(Arc::new(objects), cp);

        let err = reconcile(Arc::new(rt), ctx).await.unwrap_err();
        assert!(matches!(err, Error::Adapter { .. }));
    }

    #[test]
    fn error_policy_requeues_after_fixed_delay() {
        let (objects, _) = objects_with_capture(None);
        let ctx = context(objects, MockControlPlane::new());
        let err = Error::adapter("http", "timeout");

        let action = error_policy(Arc::new(sample_runtime("start")), &err, ctx);
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));
    }
}
