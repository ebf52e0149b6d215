//! `MockClient` — a test double for `CompletionClient`.
//!
//! Useful in unit and integration tests where a real model endpoint is
//! either unavailable or irrelevant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{CompletionClient, CompletionError, Message, Model};

/// Behaviour injected into `MockClient` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Reply with `[<model>] <last prompt>`.
    Echo,
    /// Reply with a fixed string.
    Reply(String),
    /// Fail with the given error.
    Fail(CompletionError),
}

/// One `generate` call as seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<Message>,
    pub flags: Vec<String>,
    /// When the call was issued (tokio clock, so paused-time tests work).
    pub at: Instant,
}

impl RecordedCall {
    /// Content of the final turn, i.e. the assembled prompt.
    pub fn prompt(&self) -> &str {
        self.messages.last().map(|m| m.content.as_str()).unwrap_or_default()
    }
}

/// A mock completion client that records every call it receives and
/// answers according to per-model behaviour.
pub struct MockClient {
    models: Vec<Model>,
    history: Vec<Message>,
    default: MockBehaviour,
    per_model: HashMap<String, MockBehaviour>,
    latency: Duration,
    /// All calls seen by this client (in issue order).
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
    events: Option<Arc<Mutex<Vec<String>>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockClient {
    /// Create a mock that knows the given nicknames and echoes every prompt.
    pub fn echo(nicknames: &[&str]) -> Self {
        Self {
            models: nicknames.iter().map(|n| Model::new(*n)).collect(),
            history: Vec::new(),
            default: MockBehaviour::Echo,
            per_model: HashMap::new(),
            latency: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
            events: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Answer calls to `nickname` with a fixed reply.
    pub fn replying(mut self, nickname: &str, reply: impl Into<String>) -> Self {
        self.per_model
            .insert(nickname.to_lowercase(), MockBehaviour::Reply(reply.into()));
        self
    }

    /// Fail every call to `nickname`.
    pub fn failing(mut self, nickname: &str, error: CompletionError) -> Self {
        self.per_model
            .insert(nickname.to_lowercase(), MockBehaviour::Fail(error));
        self
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Transcript returned from `messages()`.
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Push `call: <model>` into a shared log whenever a call is issued.
    pub fn with_event_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.events = Some(log);
        self
    }

    /// Number of `generate` calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Snapshot of all recorded calls.
    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Prompts of all recorded calls, in issue order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.prompt().to_owned())
            .collect()
    }

    /// Highest number of calls that were awaiting a response at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for MockClient {
    fn models(&self) -> Vec<Model> {
        self.models.clone()
    }

    async fn messages(&self) -> Result<Vec<Message>, CompletionError> {
        Ok(self.history.clone())
    }

    async fn generate(
        &self,
        nickname: &str,
        messages: Vec<Message>,
        flags: &[String],
    ) -> Result<String, CompletionError> {
        let call = RecordedCall {
            model: nickname.to_owned(),
            messages,
            flags: flags.to_vec(),
            at: Instant::now(),
        };
        let prompt = call.prompt().to_owned();
        self.calls.lock().unwrap().push(call);
        if let Some(events) = &self.events {
            events.lock().unwrap().push(format!("call: {nickname}"));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let behaviour = self
            .per_model
            .get(&nickname.to_lowercase())
            .unwrap_or(&self.default);
        match behaviour {
            MockBehaviour::Echo => Ok(format!("[{nickname}] {prompt}")),
            MockBehaviour::Reply(text) => Ok(text.clone()),
            MockBehaviour::Fail(err) => Err(err.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_replies_with_model_and_prompt() {
        let client = MockClient::echo(&["flash"]);
        let out = client
            .generate("flash", vec![Message::user("hello")], &[])
            .await
            .expect("echo should succeed");
        assert_eq!(out, "[flash] hello");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn per_model_behaviour_overrides_default() {
        let client = MockClient::echo(&["flash", "pro"])
            .replying("PRO", "fixed")
            .failing("flash", CompletionError::Cancelled);

        let ok = client.generate("pro", vec![Message::user("x")], &[]).await;
        assert_eq!(ok.as_deref(), Ok("fixed"));

        let err = client.generate("flash", vec![Message::user("x")], &[]).await;
        assert_eq!(err, Err(CompletionError::Cancelled));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_uses_the_tokio_clock() {
        let client = MockClient::echo(&["flash"]).with_latency(Duration::from_secs(3));
        let started = Instant::now();
        client
            .generate("flash", vec![Message::user("x")], &["google".into()])
            .await
            .expect("echo should succeed");
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(client.recorded()[0].flags, vec!["google".to_string()]);
    }
}
