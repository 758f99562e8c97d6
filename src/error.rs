//! Typed failures surfaced by the recognition and synthesis gates
//!
//! Providers report errors through `anyhow`; everything crossing a gate
//! boundary is converted into [`GateError`] so no provider-specific error type
//! reaches the HTTP layer.

use crate::session::CancellationDetails;
use std::time::Duration;
use thiserror::Error;

/// Result alias for gate operations
pub type GateResult<T> = std::result::Result<T, GateError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GateError {
    /// Provider could not be started or stopped (credentials, device, network)
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Recognition provider reported a cancellation
    #[error("recognition canceled: {0}")]
    RecognitionCanceled(CancellationDetails),

    /// Synthesis provider reported a cancellation
    #[error("synthesis canceled: {0}")]
    SynthesisCanceled(CancellationDetails),

    /// No terminal event arrived within the wait budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Operation requested without the session it needs
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Another session of the same kind is already active
    #[error("conflict: {0}")]
    Conflict(String),

    /// Text completion provider failed
    #[error("completion failed: {0}")]
    Completion(String),
}

impl GateError {
    /// Wrap a provider error, keeping the whole context chain
    pub fn provider(err: anyhow::Error) -> Self {
        Self::ProviderUnavailable(format!("{err:#}"))
    }
}
