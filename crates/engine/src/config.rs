//! Executor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the executor. Passed in explicitly; read once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Issue a round's completion calls one at a time instead of all at once.
    pub sequential: bool,
    /// Pause before a completion call. Sequential mode skips it for the
    /// first call of each round; parallel mode applies it to every call.
    pub request_delay: Duration,
    /// Pause between rounds.
    pub round_pause: Duration,
    /// Consecutive empty rounds tolerated before declaring a deadlock.
    pub deadlock_grace_ticks: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            sequential: true,
            request_delay: Duration::ZERO,
            round_pause: Duration::from_millis(50),
            deadlock_grace_ticks: 5,
        }
    }
}

impl ExecutorConfig {
    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }
}

/// The two workflow settings the chat client exposes, as stored in its
/// settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowSettings {
    pub sequential_workflow_requests: bool,
    /// Seconds.
    pub workflow_request_delay: f64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            sequential_workflow_requests: true,
            workflow_request_delay: 0.0,
        }
    }
}

impl WorkflowSettings {
    /// The delay as a `Duration`; negative or non-finite values mean none.
    pub fn request_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.workflow_request_delay).unwrap_or(Duration::ZERO)
    }
}

impl From<&WorkflowSettings> for ExecutorConfig {
    fn from(settings: &WorkflowSettings) -> Self {
        ExecutorConfig::default()
            .sequential(settings.sequential_workflow_requests)
            .with_request_delay(settings.request_delay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_sequential_without_delay() {
        let settings: WorkflowSettings = serde_json::from_str("{}").unwrap();
        let config = ExecutorConfig::from(&settings);
        assert!(config.sequential);
        assert_eq!(config.request_delay, Duration::ZERO);
        assert_eq!(config.deadlock_grace_ticks, 5);
    }

    #[test]
    fn settings_use_client_field_names() {
        let settings: WorkflowSettings = serde_json::from_str(
            r#"{ "sequentialWorkflowRequests": false, "workflowRequestDelay": 1.5 }"#,
        )
        .unwrap();
        let config = ExecutorConfig::from(&settings);
        assert!(!config.sequential);
        assert_eq!(config.request_delay, Duration::from_millis(1500));
    }

    #[test]
    fn negative_delay_is_ignored() {
        let settings = WorkflowSettings {
            sequential_workflow_requests: true,
            workflow_request_delay: -3.0,
        };
        assert_eq!(settings.request_delay(), Duration::ZERO);
    }
}
