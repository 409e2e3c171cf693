//! Cooperative cancellation.
//!
//! A run checks its token between stages and while waiting to retry; an
//! in-flight completion call is always awaited to the end.

mod token;

pub use token::CancellationToken;
