//! Completion client adapter.
//!
//! [`CompletionClient`] is the seam between the orchestrator and the remote
//! chat-completion service. [`OpenAiCompatibleClient`] talks to any endpoint
//! that accepts the OpenAI chat-completions request shape; tests use the
//! scripted client in [`crate::testing`].

mod client;
mod openai;
mod types;

pub use client::CompletionClient;
pub use openai::{ClientConfig, OpenAiCompatibleClient, DEFAULT_ENDPOINT};
pub use types::{Completion, CompletionRequest, Message, Role};
