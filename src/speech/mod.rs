//! Cloud speech providers
//!
//! Recognizers and synthesizers report through the sinks of the session they
//! serve and hand back a [`ProviderHandle`] the session uses to stop them.

mod recognizer;
mod synthesizer;

pub use recognizer::{recognition_event_from_response, AzureSpeechRecognizer, ShortAudioResponse};
pub use synthesizer::{build_ssml, AzureSpeechSynthesizer, DEFAULT_OUTPUT_FORMAT};

use crate::session::{RecognitionSink, SynthesisSink};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// How long a recognizer keeps listening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMode {
    /// Recognize one utterance, then stop
    #[default]
    SingleShot,
    /// Keep recognizing utterances until stopped
    Continuous,
}

/// Running provider operation
#[async_trait::async_trait]
pub trait ProviderHandle: Send {
    /// Stop the operation and release its resources
    async fn stop(&mut self) -> Result<()>;
}

/// Speech-to-text provider
#[async_trait::async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Start recognizing; events are delivered through `events`
    async fn start(
        &self,
        language: &str,
        mode: RecognitionMode,
        events: RecognitionSink,
    ) -> Result<Box<dyn ProviderHandle>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Text-to-speech provider
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Start synthesizing; the audio or a cancellation arrives through `events`
    async fn start(
        &self,
        text: &str,
        voice: &str,
        events: SynthesisSink,
    ) -> Result<Box<dyn ProviderHandle>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
