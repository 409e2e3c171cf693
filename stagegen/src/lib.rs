//! # Stagegen
//!
//! Staged, multi-turn code generation against LLM chat-completion APIs.
//!
//! A large prompt describing a target application is split into ordered
//! generation stages. Each stage sees the output of the stages it depends on,
//! token usage is tracked per stage, and every stage's text is persisted as
//! soon as it is generated, so a failure late in a run never loses earlier
//! work.
//!
//! - **Prompts**: `{placeholder}` templates resolved before any network call
//! - **Stage plans**: validated ordered stages with context dependencies
//! - **Completion clients**: an OpenAI-compatible HTTP client behind a trait
//! - **Orchestration**: sequential execution with retry and cancellation
//! - **Output**: atomic per-stage artifact files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagegen::prelude::*;
//! use std::sync::Arc;
//!
//! let config = GeneratorConfig::default();
//! let api_key = load_credential(&config)?;
//! let client = OpenAiCompatibleClient::new(ClientConfig::from_generator(&config, api_key))?;
//!
//! let state = Orchestrator::new(Arc::new(client), Arc::new(FsOutputWriter::new("out")), config)
//!     .with_substitution("base_prompt", "Build a note-taking app.")
//!     .run(&plans::staged()?)
//!     .await?;
//!
//! println!("{}", state.summary());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod errors;
pub mod events;
pub mod llm;
pub mod observability;
pub mod output;
pub mod pipeline;
pub mod plans;
pub mod prompt;
pub mod stages;
pub mod testing;
pub mod usage;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{load_credential, ApiKey, GeneratorConfig};
    pub use crate::errors::{
        CompletionError, ErrorInfo, ErrorKind, InvalidStagePlan, MissingSubstitution,
        PersistenceError, StagegenError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::llm::{
        ClientConfig, Completion, CompletionClient, CompletionRequest, Message,
        OpenAiCompatibleClient, Role,
    };
    pub use crate::output::{Artifact, FsOutputWriter, InMemoryOutputWriter, OutputWriter};
    pub use crate::pipeline::{Orchestrator, RetryConfig, RunOutcome, RunState};
    pub use crate::plans;
    pub use crate::prompt::{PromptTemplate, ResolvedPrompt, Substitutions};
    pub use crate::stages::{Stage, StagePlan, StageResult, StageRole, StageStatus};
    pub use crate::usage::{TokenUsage, UsageSummary, UsageTracker};
}
