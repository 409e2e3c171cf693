//! The completion client trait.

use super::{Completion, CompletionRequest};
use crate::errors::CompletionError;
use async_trait::async_trait;
use std::sync::Arc;

/// A single request/response exchange with a completion service.
///
/// Implementations must be safe to call concurrently from independent runs.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sends one completion request.
    ///
    /// # Errors
    ///
    /// Returns a [`CompletionError`] whose variant tells the caller whether the
    /// call may be retried ([`CompletionError::Transient`]), the run must stop
    /// ([`CompletionError::Authentication`]), or the stage failed.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError>;

    /// Short provider name used in logs.
    fn provider(&self) -> &str {
        "completion"
    }
}

#[async_trait]
impl<T: CompletionClient + ?Sized> CompletionClient for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        (**self).complete(request).await
    }

    fn provider(&self) -> &str {
        (**self).provider()
    }
}
