//! Scripted collaborators for orchestrator tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::errors::{CompletionError, PersistenceError};
use crate::llm::{Completion, CompletionClient, CompletionRequest};
use crate::output::{Artifact, OutputWriter};
use crate::usage::UsageCounts;

/// Usage reported for scripted text responses.
const SCRIPTED_USAGE: UsageCounts = UsageCounts {
    prompt_tokens: 10,
    completion_tokens: 5,
    total_tokens: 15,
};

/// A completion client that replays queued responses and records requests.
///
/// Once the queue is empty every call succeeds with the default text.
#[derive(Debug)]
pub struct ScriptedCompletionClient {
    script: Mutex<VecDeque<Result<Completion, CompletionError>>>,
    default_text: String,
    requests: Mutex<Vec<CompletionRequest>>,
    cancel_after: Mutex<Option<(usize, Arc<CancellationToken>)>>,
}

impl Default for ScriptedCompletionClient {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_text: "generated".to_string(),
            requests: Mutex::new(Vec::new()),
            cancel_after: Mutex::new(None),
        }
    }
}

impl ScriptedCompletionClient {
    /// Creates a client with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the text returned once the script runs out.
    #[must_use]
    pub fn with_default_text(mut self, text: impl Into<String>) -> Self {
        self.default_text = text.into();
        self
    }

    /// Queues a successful response with fixed usage.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push_completion(Completion::new(text, SCRIPTED_USAGE));
    }

    /// Queues a successful response.
    pub fn push_completion(&self, completion: Completion) {
        self.script.lock().push_back(Ok(completion));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: CompletionError) {
        self.script.lock().push_back(Err(error));
    }

    /// Cancels `token` as soon as call number `calls` has returned.
    pub fn cancel_after(&self, calls: usize, token: Arc<CancellationToken>) {
        *self.cancel_after.lock() = Some((calls, token));
    }

    /// Returns the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Returns the most recent request.
    #[must_use]
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        let calls = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };

        let response = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Completion::new(self.default_text.clone(), SCRIPTED_USAGE)));

        if let Some((after, token)) = self.cancel_after.lock().as_ref() {
            if calls >= *after {
                token.cancel("cancelled by test client");
            }
        }

        response
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

/// An output writer whose every write fails.
#[derive(Debug, Clone, Default)]
pub struct FailingOutputWriter {
    message: String,
}

impl FailingOutputWriter {
    /// Creates a writer failing with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl OutputWriter for FailingOutputWriter {
    async fn write(&self, stage_name: &str, _text: &str) -> Result<Artifact, PersistenceError> {
        Err(PersistenceError::new(stage_name, self.message.clone()))
    }

    async fn read(&self, _stage_name: &str) -> Result<Option<String>, PersistenceError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    fn request() -> CompletionRequest {
        CompletionRequest::new("m", vec![Message::user("hi")], 0.7, 16)
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let client = ScriptedCompletionClient::new().with_default_text("fallback");
        client.push_error(CompletionError::transient("503"));
        client.push_text("first");

        assert!(client.complete(&request()).await.is_err());
        assert_eq!(client.complete(&request()).await.unwrap().text, "first");
        assert_eq!(client.complete(&request()).await.unwrap().text, "fallback");
        assert_eq!(client.call_count(), 3);
        assert_eq!(client.last_request(), Some(request()));
    }

    #[tokio::test]
    async fn test_cancel_after() {
        let token = Arc::new(CancellationToken::new());
        let client = ScriptedCompletionClient::new();
        client.cancel_after(2, token.clone());

        client.complete(&request()).await.unwrap();
        assert!(!token.is_cancelled());
        client.complete(&request()).await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_failing_writer() {
        let err = FailingOutputWriter::new("disk full").write("a", "x").await.unwrap_err();
        assert_eq!(err.stage, "a");
        assert_eq!(err.message, "disk full");
    }
}
