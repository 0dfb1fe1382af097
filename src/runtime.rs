//! Runtime entity and lifecycle state machine
//!
//! States: `Pending -> Stopped <-> Running -> Updating -> Running`, with
//! `Failed` reachable from any state. The transition methods are the only
//! place that encodes legality; they touch nothing but the in-memory value.

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::DEFAULT_NAMESPACE;

/// Observed status of a runtime instance
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum RuntimeStatus {
    /// Never observed
    #[default]
    Pending,
    /// Serving traffic
    Running,
    /// Materialized but not serving
    Stopped,
    /// Rolling out new deployment parameters
    Updating,
    /// An external call failed
    Failed,
}

impl RuntimeStatus {
    /// Parse a status name as written in a status report phase.
    ///
    /// Returns `None` for transitional phases such as `Starting`.
    pub fn from_phase(phase: &str) -> Option<Self> {
        match phase {
            "Pending" => Some(Self::Pending),
            "Running" => Some(Self::Running),
            "Stopped" => Some(Self::Stopped),
            "Updating" => Some(Self::Updating),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Updating => write!(f, "Updating"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Lifecycle action requested against a runtime
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    /// Bring the runtime up
    Start,
    /// Bring the runtime down
    Stop,
    /// Roll out new deployment parameters
    Update,
}

impl LifecycleAction {
    /// Wire name of the action (`start`, `stop`, `update`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Update => "update",
        }
    }

    /// Parse an action string from a declarative spec.
    ///
    /// Unrecognized strings yield `None`; the reconciler reports those as an
    /// `Unknown` phase instead of failing.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "update" => Some(Self::Update),
            _ => None,
        }
    }

    /// Status a runtime holds once this action has succeeded
    pub fn target_status(&self) -> RuntimeStatus {
        match self {
            Self::Start => RuntimeStatus::Running,
            Self::Stop => RuntimeStatus::Stopped,
            Self::Update => RuntimeStatus::Updating,
        }
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LifecycleAction {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(&s.to_lowercase()).ok_or_else(|| {
            crate::Error::validation(format!(
                "invalid action: {s}, expected one of: start, stop, update"
            ))
        })
    }
}

/// Identity of a runtime instance: `(namespace, runtime_name, model)`
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeKey {
    /// Partitioning namespace, never empty
    pub namespace: String,
    /// Name of the declarative object
    pub runtime_name: String,
    /// Served model artifact
    pub model: String,
}

impl RuntimeKey {
    /// Build a key, defaulting an empty namespace to `default`
    pub fn new(
        namespace: impl Into<String>,
        runtime_name: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            namespace: normalize_namespace(&namespace.into()),
            runtime_name: runtime_name.into(),
            model: model.into(),
        }
    }

    /// Require the fields needed to address the external resource
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.runtime_name.is_empty() {
            return Err(crate::Error::validation("runtimeName is required"));
        }
        if self.model.is_empty() {
            return Err(crate::Error::validation("model is required"));
        }
        Ok(())
    }
}

impl std::fmt::Display for RuntimeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.namespace, self.runtime_name, self.model)
    }
}

/// Map an empty namespace to `default`
pub fn normalize_namespace(namespace: &str) -> String {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE.to_string()
    } else {
        namespace.to_string()
    }
}

/// One served model and its lifecycle status
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInstance {
    /// Partitioning namespace
    pub namespace: String,
    /// Name of the declarative object
    pub runtime_name: String,
    /// Served model artifact
    pub model: String,
    /// Current lifecycle status
    pub status: RuntimeStatus,
}

impl RuntimeInstance {
    /// A freshly materialized instance, `Stopped`
    pub fn new(key: &RuntimeKey) -> Self {
        Self::with_status(key, RuntimeStatus::Stopped)
    }

    /// An instance at a known status
    pub fn with_status(key: &RuntimeKey, status: RuntimeStatus) -> Self {
        Self {
            namespace: key.namespace.clone(),
            runtime_name: key.runtime_name.clone(),
            model: key.model.clone(),
            status,
        }
    }

    /// Identity triple of this instance
    pub fn key(&self) -> RuntimeKey {
        RuntimeKey::new(&self.namespace, &self.runtime_name, &self.model)
    }

    /// Transition to `Running`
    pub fn start(&mut self) -> Result<(), TransitionError> {
        if self.status == RuntimeStatus::Running {
            return Err(TransitionError::AlreadyRunning {
                model: self.model.clone(),
            });
        }
        self.status = RuntimeStatus::Running;
        Ok(())
    }

    /// Transition to `Stopped`
    pub fn stop(&mut self) -> Result<(), TransitionError> {
        if self.status == RuntimeStatus::Stopped {
            return Err(TransitionError::AlreadyStopped {
                model: self.model.clone(),
            });
        }
        self.status = RuntimeStatus::Stopped;
        Ok(())
    }

    /// Transition to `Updating`; only legal from `Running`
    pub fn update(&mut self) -> Result<(), TransitionError> {
        match self.status {
            RuntimeStatus::Updating => Err(TransitionError::AlreadyUpdating {
                model: self.model.clone(),
            }),
            RuntimeStatus::Running => {
                self.status = RuntimeStatus::Updating;
                Ok(())
            }
            from => Err(TransitionError::InvalidTransition {
                model: self.model.clone(),
                action: LifecycleAction::Update,
                from,
            }),
        }
    }

    /// Mark the instance `Failed`; legal from any status
    pub fn fail(&mut self) {
        self.status = RuntimeStatus::Failed;
    }

    /// Apply the transition for `action`
    pub fn apply(&mut self, action: LifecycleAction) -> Result<(), TransitionError> {
        match action {
            LifecycleAction::Start => self.start(),
            LifecycleAction::Stop => self.stop(),
            LifecycleAction::Update => self.update(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn instance(status: RuntimeStatus) -> RuntimeInstance {
        RuntimeInstance::with_status(&RuntimeKey::new("ns1", "rt1", "llama"), status)
    }

    #[rstest]
    #[case(RuntimeStatus::Pending)]
    #[case(RuntimeStatus::Stopped)]
    #[case(RuntimeStatus::Updating)]
    #[case(RuntimeStatus::Failed)]
    fn start_from_non_running_reaches_running(#[case] from: RuntimeStatus) {
        let mut rt = instance(from);
        rt.start().unwrap();
        assert_eq!(rt.status, RuntimeStatus::Running);
    }

    #[test]
    fn start_when_running_fails_and_keeps_status() {
        let mut rt = instance(RuntimeStatus::Running);
        let err = rt.start().unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyRunning { .. }));
        assert_eq!(rt.status, RuntimeStatus::Running);
    }

    #[test]
    fn stop_when_stopped_fails_and_keeps_status() {
        let mut rt = instance(RuntimeStatus::Stopped);
        let err = rt.stop().unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyStopped { .. }));
        assert_eq!(rt.status, RuntimeStatus::Stopped);
    }

    #[rstest]
    #[case(RuntimeStatus::Running)]
    #[case(RuntimeStatus::Updating)]
    #[case(RuntimeStatus::Failed)]
    fn stop_from_non_stopped_reaches_stopped(#[case] from: RuntimeStatus) {
        let mut rt = instance(from);
        rt.stop().unwrap();
        assert_eq!(rt.status, RuntimeStatus::Stopped);
    }

    #[test]
    fn update_only_from_running() {
        let mut rt = instance(RuntimeStatus::Running);
        rt.update().unwrap();
        assert_eq!(rt.status, RuntimeStatus::Updating);
    }

    #[rstest]
    #[case(RuntimeStatus::Pending)]
    #[case(RuntimeStatus::Stopped)]
    #[case(RuntimeStatus::Failed)]
    fn update_from_non_running_is_invalid(#[case] from: RuntimeStatus) {
        let mut rt = instance(from);
        let err = rt.update().unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                model: "llama".to_string(),
                action: LifecycleAction::Update,
                from,
            }
        );
        assert_eq!(rt.status, from);
    }

    #[test]
    fn update_while_updating_is_already_in_state() {
        let mut rt = instance(RuntimeStatus::Updating);
        let err = rt.update().unwrap_err();
        assert!(err.is_already_in_state());
        assert_eq!(rt.status, RuntimeStatus::Updating);
    }

    #[test]
    fn fail_is_reachable_from_any_status() {
        for status in [
            RuntimeStatus::Pending,
            RuntimeStatus::Running,
            RuntimeStatus::Stopped,
            RuntimeStatus::Updating,
        ] {
            let mut rt = instance(status);
            rt.fail();
            assert_eq!(rt.status, RuntimeStatus::Failed);
        }
    }

    #[test]
    fn empty_namespace_defaults() {
        let key = RuntimeKey::new("", "rt1", "llama");
        assert_eq!(key.namespace, "default");
        assert_eq!(key.to_string(), "default/rt1@llama");
    }

    #[test]
    fn key_requires_runtime_name_and_model() {
        assert!(RuntimeKey::new("ns", "", "llama").validate().is_err());
        assert!(RuntimeKey::new("ns", "rt", "").validate().is_err());
        assert!(RuntimeKey::new("ns", "rt", "llama").validate().is_ok());
    }

    #[test]
    fn action_parsing() {
        assert_eq!(LifecycleAction::parse("start"), Some(LifecycleAction::Start));
        assert_eq!(LifecycleAction::parse("restart"), None);
        assert_eq!(
            "STOP".parse::<LifecycleAction>().unwrap(),
            LifecycleAction::Stop
        );
        assert!("bogus".parse::<LifecycleAction>().is_err());
    }

    #[test]
    fn phase_names_round_trip_through_display() {
        for status in [
            RuntimeStatus::Pending,
            RuntimeStatus::Running,
            RuntimeStatus::Stopped,
            RuntimeStatus::Updating,
            RuntimeStatus::Failed,
        ] {
            assert_eq!(RuntimeStatus::from_phase(&status.to_string()), Some(status));
        }
        assert_eq!(RuntimeStatus::from_phase("Starting"), None);
    }
}
