//! VLLM Custom Resource Definition
//!
//! A `VLLM` object declares one served model and the lifecycle action the
//! operator should drive it towards.

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, DeploymentConfig, RuntimePhase, VllmConfig, MAX_CONDITIONS};
use crate::runtime::LifecycleAction;

/// Specification for a vLLM runtime
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "vllm.ai",
    version = "v1",
    kind = "VLLM",
    root = "VllmRuntime",
    derive = "PartialEq",
    plural = "vllms",
    shortname = "vllm",
    status = "VllmRuntimeStatus",
    namespaced,
    printcolumn = r#"{"name":"Model","type":"string","jsonPath":".spec.model"}"#,
    printcolumn = r#"{"name":"Action","type":"string","jsonPath":".spec.action"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VllmRuntimeSpec {
    /// Served model artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Logical runtime name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_name: Option<String>,

    /// Namespace the runtime is deployed into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Desired lifecycle action (start, stop, update)
    ///
    /// Kept as a free string so unrecognized values survive admission and
    /// surface as an `Unknown` phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Number of serving replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Extra vLLM server arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Location of the model weights
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,

    /// vLLM server settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vllm_config: Option<VllmConfig>,

    /// Pod-level deployment settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_config: Option<DeploymentConfig>,
}

impl VllmRuntimeSpec {
    /// Parse the declared action, `None` when absent or unrecognized
    pub fn lifecycle_action(&self) -> Option<LifecycleAction> {
        self.action.as_deref().and_then(LifecycleAction::parse)
    }
}

/// Status for a vLLM runtime
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VllmRuntimeStatus {
    /// Current phase
    #[serde(default)]
    pub phase: RuntimePhase,

    /// Human-readable outcome of the last operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the runtime was last started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// Replicas reporting ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,

    /// Outcome log, oldest first
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl VllmRuntimeStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: RuntimePhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the phase and return self for chaining
    pub fn phase(mut self, phase: RuntimePhase) -> Self {
        self.phase = phase;
        self
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Set the start time and return self for chaining
    pub fn start_time(mut self, at: DateTime<Utc>) -> Self {
        self.start_time = Some(at);
        self
    }

    /// Append a condition and return self for chaining
    ///
    /// Re-recording the latest outcome is a no-op so the original transition
    /// time survives repeated reconciles. Only the most recent
    /// [`MAX_CONDITIONS`] entries are kept.
    pub fn condition(mut self, condition: Condition) -> Self {
        let repeated = self
            .conditions
            .last()
            .is_some_and(|last| last.same_outcome(&condition));
        if !repeated {
            self.conditions.push(condition);
        }
        if self.conditions.len() > MAX_CONDITIONS {
            let excess = self.conditions.len() - MAX_CONDITIONS;
            self.conditions.drain(..excess);
        }
        self
    }
}

impl VllmRuntime {
    /// Current phase, `Pending` when no status has been written
    pub fn phase(&self) -> RuntimePhase {
        self.status
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or_default()
    }

    /// Namespace of the object, `default` when unset
    pub fn namespace_or_default(&self) -> String {
        crate::runtime::normalize_namespace(&self.namespace().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ConditionStatus;
    use kube::CustomResourceExt;

    fn running(msg: &str) -> Condition {
        Condition::new("Running", ConditionStatus::True, "Started", msg)
    }

    // ==========================================================================
    // Story Tests: Status Reporting
    // ==========================================================================

    /// Story: every lifecycle outcome is appended to the condition log
    #[test]
    fn story_conditions_accumulate_in_order() {
        let status = VllmRuntimeStatus::with_phase(RuntimePhase::Running)
            .condition(running("first"))
            .condition(Condition::new(
                "Stopped",
                ConditionStatus::True,
                "Stopped",
                "second",
            ));

        assert_eq!(status.conditions.len(), 2);
        assert_eq!(status.conditions[0].message, "first");
        assert_eq!(status.conditions[1].type_, "Stopped");
    }

    /// Story: reconciling the same outcome twice keeps the original timestamp
    #[test]
    fn story_repeated_outcome_is_not_duplicated() {
        let first = running("up");
        let at = first.last_transition_time;
        let status = VllmRuntimeStatus::default()
            .condition(first)
            .condition(running("up"));

        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].last_transition_time, at);
    }

    /// Story: the condition log never grows past its bound
    #[test]
    fn story_condition_log_is_bounded() {
        let mut status = VllmRuntimeStatus::default();
        for i in 0..(MAX_CONDITIONS + 5) {
            status = status.condition(running(&format!("attempt {i}")));
        }

        assert_eq!(status.conditions.len(), MAX_CONDITIONS);
        assert_eq!(status.conditions[0].message, "attempt 5");
        assert_eq!(
            status.conditions[MAX_CONDITIONS - 1].message,
            format!("attempt {}", MAX_CONDITIONS + 4)
        );
    }

    #[test]
    fn spec_parses_action() {
        let spec = VllmRuntimeSpec {
            action: Some("stop".to_string()),
            ..Default::default()
        };
        assert_eq!(spec.lifecycle_action(), Some(LifecycleAction::Stop));

        let bogus = VllmRuntimeSpec {
            action: Some("restart".to_string()),
            ..Default::default()
        };
        assert_eq!(bogus.lifecycle_action(), None);
    }

    #[test]
    fn spec_serializes_camel_case_and_skips_absent_fields() {
        let spec = VllmRuntimeSpec {
            model: Some("llama".to_string()),
            runtime_name: Some("llama".to_string()),
            storage_uri: Some("pvc://models".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "llama",
                "runtimeName": "llama",
                "storageUri": "pvc://models",
            })
        );
    }

    #[test]
    fn crd_is_namespaced_under_vllm_ai() {
        let crd = VllmRuntime::crd();
        assert_eq!(crd.spec.group, "vllm.ai");
        assert_eq!(crd.spec.names.kind, "VLLM");
        assert_eq!(crd.spec.names.plural, "vllms");
        assert_eq!(crd.spec.scope, "Namespaced");
    }

    #[test]
    fn missing_status_reads_as_pending() {
        let rt = VllmRuntime::new("rt1", VllmRuntimeSpec::default());
        assert_eq!(rt.phase(), RuntimePhase::Pending);
        assert_eq!(rt.namespace_or_default(), "default");
    }
}
