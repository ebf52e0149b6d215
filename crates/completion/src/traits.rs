//! The `CompletionClient` trait — what the engine needs from the chat client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::CompletionError;

/// A configured model, addressed in workflow scripts by its nickname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub nickname: String,
}

impl Model {
    pub fn new(nickname: impl Into<String>) -> Self {
        Self { nickname: nickname.into() }
    }

    /// Nicknames compare case-insensitively.
    pub fn answers_to(&self, nickname: &str) -> bool {
        self.nickname.to_lowercase() == nickname.to_lowercase()
    }
}

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// The surrounding chat client, as seen by the workflow engine.
///
/// Implementations own transport, timeouts, retry and cancellation. A
/// cancelled request should surface as [`CompletionError::Cancelled`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Models the client knows how to call.
    fn models(&self) -> Vec<Model>;

    /// The active conversation transcript, oldest turn first.
    async fn messages(&self) -> Result<Vec<Message>, CompletionError>;

    /// Issue one completion call and return the generated text.
    ///
    /// `flags` are the node's `+flag` tokens, passed through untouched.
    async fn generate(
        &self,
        nickname: &str,
        messages: Vec<Message>,
        flags: &[String],
    ) -> Result<String, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_matching_ignores_case() {
        let model = Model::new("Flash-Lite");
        assert!(model.answers_to("flash-lite"));
        assert!(model.answers_to("FLASH-LITE"));
        assert!(!model.answers_to("flash"));
    }

    #[test]
    fn model_entries_ignore_unknown_fields() {
        let model: Model = serde_json::from_str(
            r#"{ "nickname": "pro", "endpoint": "https://example.invalid", "temperature": 0.7 }"#,
        )
        .expect("model entry should deserialize");
        assert_eq!(model, Model::new("pro"));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::user("hi")).expect("serialize");
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
