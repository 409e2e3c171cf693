//! Test doubles for runs that never touch the network or the disk.
//!
//! This module provides:
//! - A scripted completion client that records every request
//! - An output writer that always fails
//! - Assertions over run states

mod assertions;
mod mocks;

pub use assertions::{assert_not_attempted, assert_stage_failed, assert_stage_succeeded};
pub use mocks::{FailingOutputWriter, ScriptedCompletionClient};
