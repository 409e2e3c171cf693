//! Run lifecycle events.
//!
//! The orchestrator reports progress to an injected [`EventSink`]. Event
//! payloads are JSON objects that always carry the `run_id`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run began.
pub const RUN_STARTED: &str = "run.started";
/// A stage is about to make its first completion call.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage hit a transient error and will be retried.
pub const STAGE_RETRYING: &str = "stage.retrying";
/// A stage produced text.
pub const STAGE_SUCCEEDED: &str = "stage.succeeded";
/// A stage failed.
pub const STAGE_FAILED: &str = "stage.failed";
/// Generated text could not be written.
pub const ARTIFACT_PERSIST_FAILED: &str = "artifact.persist_failed";
/// A run ended, whatever the outcome.
pub const RUN_FINISHED: &str = "run.finished";
