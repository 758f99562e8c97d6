//! Azure Speech synthesis over the TTS REST endpoint

use super::{ProviderHandle, SpeechSynthesizer};
use crate::session::{CancellationDetails, SynthesisEvent, SynthesisSink};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Default output: 24kHz 16-bit mono RIFF, playable by browsers as WAV
pub const DEFAULT_OUTPUT_FORMAT: &str = "riff-24khz-16bit-mono-pcm";

/// Wrap `text` in an SSML document for `voice`
pub fn build_ssml(text: &str, voice: &str, language: &str) -> String {
    format!(
        "<speak version='1.0' xml:lang='{}'><voice name='{}'>{}</voice></speak>",
        escape_xml(language),
        escape_xml(voice),
        escape_xml(text)
    )
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Synthesizes speech with Azure Speech
pub struct AzureSpeechSynthesizer {
    client: reqwest::Client,
    key: String,
    region: String,
    language: String,
    output_format: String,
}

impl AzureSpeechSynthesizer {
    pub fn new(key: String, region: String, language: String, output_format: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            key,
            region,
            language,
            output_format,
        })
    }

    pub fn endpoint(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            self.region
        )
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for AzureSpeechSynthesizer {
    async fn start(
        &self,
        text: &str,
        voice: &str,
        events: SynthesisSink,
    ) -> Result<Box<dyn ProviderHandle>> {
        if self.key.is_empty() || self.region.is_empty() {
            anyhow::bail!("speech subscription key and region must be set (SPEECH_KEY / SPEECH_REGION)");
        }

        let request = self
            .client
            .post(self.endpoint())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", &self.output_format)
            .header("User-Agent", "voice-assistant")
            .body(build_ssml(text, voice, &self.language));

        let chars = text.chars().count();
        let task = tokio::spawn(async move {
            debug!("Sending {} characters to speech synthesis", chars);
            events.emit(synthesize(request).await);
        });

        Ok(Box::new(AzureSynthesisHandle { task: Some(task) }))
    }

    fn name(&self) -> &str {
        "azure-speech"
    }
}

async fn synthesize(request: reqwest::RequestBuilder) -> SynthesisEvent {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            error!("Speech synthesis request failed: {}", e);
            return SynthesisEvent::Canceled(CancellationDetails::error(
                "ConnectionFailure",
                e.to_string(),
            ));
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return SynthesisEvent::Canceled(CancellationDetails::error(
            status.as_u16().to_string(),
            body,
        ));
    }

    match response.bytes().await {
        Ok(audio) => {
            info!("Speech synthesis completed ({} bytes)", audio.len());
            SynthesisEvent::AudioReady(audio.to_vec())
        }
        Err(e) => SynthesisEvent::Canceled(CancellationDetails::error(
            "ConnectionFailure",
            e.to_string(),
        )),
    }
}

struct AzureSynthesisHandle {
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl ProviderHandle for AzureSynthesisHandle {
    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for AzureSynthesisHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
