//! Request and response types for completion calls.

use crate::errors::CompletionError;
use crate::usage::UsageCounts;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Creates a new message.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Input to one completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation.
    pub messages: Vec<Message>,
    /// Sampling temperature in `[0, 2]`.
    pub temperature: f32,
    /// Maximum tokens to generate; must be positive.
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
            max_tokens,
        }
    }

    /// Checks the request before it goes on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::InvalidRequest`] for an empty model or
    /// message list, a temperature outside `[0, 2]`, or zero `max_tokens`.
    pub fn validate(&self) -> Result<(), CompletionError> {
        if self.model.trim().is_empty() {
            return Err(CompletionError::InvalidRequest(
                "model identifier is empty".to_string(),
            ));
        }
        if self.messages.is_empty() {
            return Err(CompletionError::InvalidRequest(
                "message list is empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(CompletionError::InvalidRequest(format!(
                "temperature {} is outside [0, 2]",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(CompletionError::InvalidRequest(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the total characters across all message contents.
    #[must_use]
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }
}

/// Generated text and the usage the service reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Generated text.
    pub text: String,
    /// Reported token usage.
    pub usage: UsageCounts,
    /// Model that actually served the request, if reported.
    pub model: Option<String>,
    /// Finish reason, if reported.
    pub finish_reason: Option<String>,
}

impl Completion {
    /// Creates a completion with no model or finish-reason metadata.
    #[must_use]
    pub fn new(text: impl Into<String>, usage: UsageCounts) -> Self {
        Self {
            text: text.into(),
            usage,
            model: None,
            finish_reason: None,
        }
    }

    /// Rejects completions whose text is empty or whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::EmptyCompletion`].
    pub fn ensure_non_empty(self) -> Result<Self, CompletionError> {
        if self.text.trim().is_empty() {
            Err(CompletionError::EmptyCompletion)
        } else {
            Ok(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(temperature: f32, max_tokens: u32) -> CompletionRequest {
        CompletionRequest::new("gpt-test", vec![Message::user("hi")], temperature, max_tokens)
    }

    #[test]
    fn test_role_serialize_lowercase() {
        let json = serde_json::to_string(&Message::system("be terse")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be terse"}"#);
    }

    #[test]
    fn test_validate_accepts_bounds() {
        assert!(request(0.0, 1).validate().is_ok());
        assert!(request(2.0, 4096).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_temperature_out_of_range() {
        assert!(matches!(
            request(2.5, 10).validate(),
            Err(CompletionError::InvalidRequest(_))
        ));
        assert!(request(-0.1, 10).validate().is_err());
        assert!(request(f32::NAN, 10).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_max_tokens() {
        assert!(request(0.7, 0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_messages() {
        let req = CompletionRequest::new("m", Vec::new(), 0.7, 10);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_ensure_non_empty() {
        assert!(Completion::new("code", UsageCounts::default()).ensure_non_empty().is_ok());
        assert_eq!(
            Completion::new("  \n", UsageCounts::default()).ensure_non_empty(),
            Err(CompletionError::EmptyCompletion)
        );
    }
}
