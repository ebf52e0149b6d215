//! Client settings file: the model list plus the workflow settings.
//!
//! ```json
//! {
//!   "models": [{ "nickname": "flash" }, { "nickname": "pro" }],
//!   "sequentialWorkflowRequests": true,
//!   "workflowRequestDelay": 1.5
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use completion::Model;
use engine::WorkflowSettings;
use serde::Deserialize;

/// Nicknames available when no settings file is given.
pub const DEFAULT_MODELS: [&str; 3] = ["flash-lite", "flash", "pro"];

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_models")]
    pub models: Vec<Model>,
    #[serde(flatten)]
    pub workflow: WorkflowSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            models: default_models(),
            workflow: WorkflowSettings::default(),
        }
    }
}

fn default_models() -> Vec<Model> {
    DEFAULT_MODELS.iter().map(|n| Model::new(*n)).collect()
}

impl ClientSettings {
    /// Read settings from `path`, or fall back to defaults when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read settings file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid settings file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_defaults() {
        let settings = ClientSettings::load(None).unwrap();
        let names: Vec<_> = settings.models.iter().map(|m| m.nickname.as_str()).collect();
        assert_eq!(names, DEFAULT_MODELS);
        assert!(settings.workflow.sequential_workflow_requests);
    }

    #[test]
    fn settings_document_parses() {
        let settings: ClientSettings = serde_json::from_str(
            r#"{
                "models": [{ "nickname": "local", "endpoint": "http://localhost" }],
                "sequentialWorkflowRequests": false,
                "workflowRequestDelay": 2
            }"#,
        )
        .unwrap();
        assert_eq!(settings.models, vec![Model::new("local")]);
        assert!(!settings.workflow.sequential_workflow_requests);
        assert_eq!(settings.workflow.workflow_request_delay, 2.0);
    }

    #[test]
    fn omitted_models_fall_back_to_defaults() {
        let settings: ClientSettings =
            serde_json::from_str(r#"{ "workflowRequestDelay": 0.5 }"#).unwrap();
        assert_eq!(settings.models.len(), DEFAULT_MODELS.len());
    }
}
