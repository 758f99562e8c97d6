use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a provider canceled an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationReason {
    /// Provider-side failure (bad credentials, network, service error)
    Error,
    /// Audio input ended before anything could be produced
    EndOfStream,
    /// The caller stopped the operation
    CancelledByUser,
}

/// Cancellation details, passed through from the provider unchanged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationDetails {
    pub reason: CancellationReason,
    pub error_code: Option<String>,
    pub error_details: Option<String>,
}

impl CancellationDetails {
    pub fn error(code: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            reason: CancellationReason::Error,
            error_code: Some(code.into()),
            error_details: Some(details.into()),
        }
    }

    pub fn by_user() -> Self {
        Self {
            reason: CancellationReason::CancelledByUser,
            error_code: None,
            error_details: None,
        }
    }
}

impl fmt::Display for CancellationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reason={:?}", self.reason)?;
        if let Some(code) = &self.error_code {
            write!(f, " code={code}")?;
        }
        if let Some(details) = &self.error_details {
            write!(f, " details={details}")?;
        }
        Ok(())
    }
}

/// Everything a recognition provider can report about a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Partial transcription, never authoritative
    Interim(String),
    /// Final transcription of an utterance
    Recognized(String),
    /// Speech was captured but could not be recognized
    NoMatch,
    /// Provider gave up
    Canceled(CancellationDetails),
    /// Provider stopped recognizing
    SessionStopped,
}

impl RecognitionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecognitionEvent::Interim(_))
    }
}

/// The single authoritative result of a recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Recognized(String),
    NoMatch,
    Canceled(CancellationDetails),
}

/// Everything a synthesis provider can report about a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    AudioReady(Vec<u8>),
    Canceled(CancellationDetails),
}

/// The single authoritative result of a synthesis request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    AudioReady(Vec<u8>),
    Canceled(CancellationDetails),
}

impl From<SynthesisEvent> for SynthesisOutcome {
    fn from(event: SynthesisEvent) -> Self {
        match event {
            SynthesisEvent::AudioReady(bytes) => SynthesisOutcome::AudioReady(bytes),
            SynthesisEvent::Canceled(details) => SynthesisOutcome::Canceled(details),
        }
    }
}
