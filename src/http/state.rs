use crate::completion::TextCompletion;
use crate::error::{GateError, GateResult};
use crate::session::{Outcome, RecognitionGate, SynthesisGate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Per-process settings the handlers pass to the gates
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    /// Recognition language tag
    pub language: String,
    /// Synthesis voice
    pub voice: String,
    pub recognition_timeout: Duration,
    pub synthesis_timeout: Duration,
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Recording sessions (at most one active)
    pub recognition: Arc<RecognitionGate>,

    /// Synthesis requests (at most one active)
    pub synthesis: Arc<SynthesisGate>,

    /// Language model answering the recognized prompt
    pub completion: Arc<dyn TextCompletion>,

    pub settings: Arc<AssistantSettings>,

    /// Last recognized prompt, consumed by /startSynthesizing
    pub prompt: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        recognition: Arc<RecognitionGate>,
        synthesis: Arc<SynthesisGate>,
        completion: Arc<dyn TextCompletion>,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            recognition,
            synthesis,
            completion,
            settings: Arc::new(settings),
            prompt: Arc::new(RwLock::new(None)),
        }
    }

    /// Store a recognized prompt; returns the text to send back
    pub async fn record_outcome(&self, outcome: Outcome) -> GateResult<String> {
        match outcome {
            Outcome::Recognized(text) => {
                *self.prompt.write().await = Some(text.clone());
                Ok(text)
            }
            Outcome::NoMatch => Ok(String::new()),
            Outcome::Canceled(details) => Err(GateError::RecognitionCanceled(details)),
        }
    }

    pub async fn last_prompt(&self) -> Option<String> {
        self.prompt.read().await.clone()
    }
}
