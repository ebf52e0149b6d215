//! Dry-run completion client: answers every call by echoing the prompt.

use async_trait::async_trait;
use completion::{CompletionClient, CompletionError, Message, Model};
use tracing::debug;

pub struct EchoClient {
    models: Vec<Model>,
}

impl EchoClient {
    pub fn new(models: Vec<Model>) -> Self {
        Self { models }
    }
}

#[async_trait]
impl CompletionClient for EchoClient {
    fn models(&self) -> Vec<Model> {
        self.models.clone()
    }

    /// There is no conversation outside a chat session.
    async fn messages(&self) -> Result<Vec<Message>, CompletionError> {
        Ok(Vec::new())
    }

    async fn generate(
        &self,
        nickname: &str,
        messages: Vec<Message>,
        flags: &[String],
    ) -> Result<String, CompletionError> {
        let prompt = messages
            .last()
            .map(|m| m.content.as_str())
            .ok_or_else(|| CompletionError::Request("no messages to send".into()))?;
        debug!(model = nickname, ?flags, "echo completion");
        Ok(format!("[{nickname}] {prompt}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_the_final_turn() {
        let client = EchoClient::new(vec![Model::new("flash")]);
        let out = client
            .generate("flash", vec![Message::user("a"), Message::user("b")], &[])
            .await
            .unwrap();
        assert_eq!(out, "[flash] b");
    }

    #[tokio::test]
    async fn empty_message_list_is_an_error() {
        let client = EchoClient::new(Vec::new());
        assert!(client.generate("flash", Vec::new(), &[]).await.is_err());
    }
}
