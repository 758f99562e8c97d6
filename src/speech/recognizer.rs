//! Azure Speech recognition over the short-audio REST endpoint

use super::{ProviderHandle, RecognitionMode, SpeechRecognizer};
use crate::audio::{
    encode_wav, AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioSource,
    EndpointingConfig, Utterance, UtteranceSegmenter,
};
use crate::session::{CancellationDetails, RecognitionEvent, RecognitionSink};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Body returned by the short-audio endpoint in `simple` format
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShortAudioResponse {
    pub recognition_status: String,
    #[serde(default)]
    pub display_text: Option<String>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub duration: Option<u64>,
}

/// Map a short-audio response to the event it represents
pub fn recognition_event_from_response(response: ShortAudioResponse) -> RecognitionEvent {
    match response.recognition_status.as_str() {
        "Success" => RecognitionEvent::Recognized(response.display_text.unwrap_or_default()),
        "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => RecognitionEvent::NoMatch,
        status => RecognitionEvent::Canceled(CancellationDetails::error(
            status,
            response
                .display_text
                .unwrap_or_else(|| format!("recognition failed with status {status}")),
        )),
    }
}

/// Recognizes utterances captured from an audio source with Azure Speech
pub struct AzureSpeechRecognizer {
    client: reqwest::Client,
    key: String,
    region: String,
    source: AudioSource,
    audio: AudioBackendConfig,
    endpointing: EndpointingConfig,
}

impl AzureSpeechRecognizer {
    pub fn new(
        key: String,
        region: String,
        source: AudioSource,
        endpointing: EndpointingConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            key,
            region,
            source,
            audio: AudioBackendConfig::default(),
            endpointing,
        })
    }

    pub fn endpoint(&self, language: &str) -> String {
        format!(
            "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1?language={}&format=simple",
            self.region, language
        )
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for AzureSpeechRecognizer {
    async fn start(
        &self,
        language: &str,
        mode: RecognitionMode,
        events: RecognitionSink,
    ) -> Result<Box<dyn ProviderHandle>> {
        if self.key.is_empty() || self.region.is_empty() {
            anyhow::bail!("speech subscription key and region must be set (SPEECH_KEY / SPEECH_REGION)");
        }

        let mut backend = AudioBackendFactory::create(&self.source, self.audio.clone())
            .context("Failed to create audio backend")?;
        let frames = backend
            .start()
            .await
            .with_context(|| format!("Failed to start {} capture", backend.name()))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = RecognitionWorker {
            client: self.client.clone(),
            key: self.key.clone(),
            url: self.endpoint(language),
            sample_rate: self.audio.target_sample_rate,
            mode,
            events,
        };
        let segmenter = UtteranceSegmenter::new(self.endpointing.clone());

        let task = tokio::spawn(worker.run(backend, frames, segmenter, stop_rx));

        Ok(Box::new(AzureRecognitionHandle {
            stop_tx,
            task: Some(task),
        }))
    }

    fn name(&self) -> &str {
        "azure-speech"
    }
}

struct RecognitionWorker {
    client: reqwest::Client,
    key: String,
    url: String,
    sample_rate: u32,
    mode: RecognitionMode,
    events: RecognitionSink,
}

impl RecognitionWorker {
    async fn run(
        self,
        mut backend: Box<dyn AudioBackend>,
        mut frames: mpsc::Receiver<crate::audio::AudioFrame>,
        mut segmenter: UtteranceSegmenter,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        info!("Recognition task started ({:?})", self.mode);

        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        if let Some(utterance) = segmenter.push(frame) {
                            let event = self.recognize(utterance).await;
                            if self.deliver(event) {
                                break;
                            }
                        }
                    }
                    None => {
                        debug!("Audio source ended");
                        if let Some(utterance) = segmenter.flush() {
                            let event = self.recognize(utterance).await;
                            self.deliver(event);
                        }
                        break;
                    }
                },
                _ = stop_rx.changed() => {
                    debug!("Recognition stop requested");
                    if let Some(utterance) = segmenter.flush() {
                        let event = self.recognize(utterance).await;
                        self.deliver(event);
                    }
                    break;
                }
            }
        }

        if let Err(e) = backend.stop().await {
            error!("Failed to stop audio backend: {}", e);
        }

        info!("Session stopped event.");
        self.events.emit(RecognitionEvent::SessionStopped);
    }

    /// Emit an utterance result; returns true when recognition should end
    fn deliver(&self, event: RecognitionEvent) -> bool {
        // A failed utterance does not end a continuous session
        if self.mode == RecognitionMode::Continuous {
            let unusable = match &event {
                RecognitionEvent::NoMatch => true,
                RecognitionEvent::Recognized(text) => text.trim().is_empty(),
                _ => false,
            };
            if unusable {
                info!("NOMATCH: utterance could not be recognized, still listening");
                return false;
            }
        }

        let ends = self.mode == RecognitionMode::SingleShot
            || matches!(event, RecognitionEvent::Canceled(_));
        self.events.emit(event);
        ends
    }

    async fn recognize(&self, utterance: Utterance) -> RecognitionEvent {
        debug!(
            "Recognizing {}ms utterance ({} samples)",
            utterance.duration_ms,
            utterance.samples.len()
        );

        let wav = match encode_wav(&utterance.samples, utterance.sample_rate, utterance.channels) {
            Ok(wav) => wav,
            Err(e) => {
                return RecognitionEvent::Canceled(CancellationDetails::error(
                    "AudioEncodingFailure",
                    format!("{e:#}"),
                ))
            }
        };

        let response = self
            .client
            .post(&self.url)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header(
                "Content-Type",
                format!("audio/wav; codecs=audio/pcm; samplerate={}", self.sample_rate),
            )
            .header("Accept", "application/json")
            .body(wav)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!("Speech recognition request failed: {}", e);
                return RecognitionEvent::Canceled(CancellationDetails::error(
                    "ConnectionFailure",
                    e.to_string(),
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Speech recognition API error {}: {}", status, body);
            return RecognitionEvent::Canceled(CancellationDetails::error(
                status.as_u16().to_string(),
                body,
            ));
        }

        match response.json::<ShortAudioResponse>().await {
            Ok(body) => {
                debug!("Recognition status: {}", body.recognition_status);
                recognition_event_from_response(body)
            }
            Err(e) => RecognitionEvent::Canceled(CancellationDetails::error(
                "InvalidResponse",
                e.to_string(),
            )),
        }
    }
}

struct AzureRecognitionHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl ProviderHandle for AzureRecognitionHandle {
    async fn stop(&mut self) -> Result<()> {
        // The task may already have finished (single-shot, source ended)
        let _ = self.stop_tx.send(true);

        if let Some(task) = self.task.take() {
            task.await.context("Recognition task panicked")?;
        }
        Ok(())
    }
}

impl Drop for AzureRecognitionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
