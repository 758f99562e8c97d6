use crate::speech::RecognitionMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a recognition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, provider not started yet
    Idle,
    /// Provider is recognizing, nobody is waiting
    Listening,
    /// A caller is waiting for the outcome
    AwaitingResult,
    /// Recognized or no-match outcome recorded
    Completed,
    /// Cancellation outcome recorded
    Canceled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Canceled)
    }
}

/// Snapshot of a recognition session for the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Session identifier
    pub session_id: String,

    /// Current lifecycle state
    pub state: SessionState,

    /// Recognition mode the session runs in
    pub mode: RecognitionMode,

    /// Recognition language tag (e.g., "en-US")
    pub language: String,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Seconds since the session was created
    pub duration_secs: f64,

    /// Latest partial transcription (diagnostic only)
    pub interim_text: String,

    /// Whether the session has released its provider
    pub ended: bool,
}
