use super::backend::AudioFrame;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Energy-based endpointing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointingConfig {
    /// RMS level (0.0..=1.0) above which a frame counts as speech
    pub energy_threshold: f32,

    /// Silence that ends an utterance
    pub trailing_silence_ms: u64,

    /// Hard cap on utterance length
    pub max_utterance_ms: u64,

    /// Utterances with less speech than this are discarded as noise
    pub min_speech_ms: u64,

    /// Audio kept from before speech starts
    pub pre_roll_ms: u64,
}

impl Default for EndpointingConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.015,
            trailing_silence_ms: 900,
            max_utterance_ms: 15_000,
            min_speech_ms: 250,
            pre_roll_ms: 300,
        }
    }
}

/// A contiguous stretch of speech ready for recognition
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Timestamp of the first frame
    pub start_ms: u64,
    pub duration_ms: u64,
    /// Portion of the utterance above the energy threshold
    pub speech_ms: u64,
}

struct PendingUtterance {
    utterance: Utterance,
    silence_ms: u64,
}

/// Splits a frame stream into utterances
pub struct UtteranceSegmenter {
    config: EndpointingConfig,
    pre_roll: VecDeque<AudioFrame>,
    pre_roll_ms: u64,
    current: Option<PendingUtterance>,
}

impl UtteranceSegmenter {
    pub fn new(config: EndpointingConfig) -> Self {
        Self {
            config,
            pre_roll: VecDeque::new(),
            pre_roll_ms: 0,
            current: None,
        }
    }

    /// Whether speech is currently being accumulated
    pub fn in_utterance(&self) -> bool {
        self.current.is_some()
    }

    /// Feed one frame; returns an utterance once it is complete
    pub fn push(&mut self, frame: AudioFrame) -> Option<Utterance> {
        let frame_ms = frame.duration_ms();
        let is_speech = frame.rms() >= self.config.energy_threshold;

        let Some(pending) = self.current.as_mut() else {
            if is_speech {
                self.start_utterance(frame, frame_ms);
            } else {
                self.push_pre_roll(frame, frame_ms);
            }
            return None;
        };

        pending.utterance.samples.extend_from_slice(&frame.samples);
        pending.utterance.duration_ms += frame_ms;
        if is_speech {
            pending.utterance.speech_ms += frame_ms;
            pending.silence_ms = 0;
        } else {
            pending.silence_ms += frame_ms;
        }

        let ended = pending.silence_ms >= self.config.trailing_silence_ms
            || pending.utterance.duration_ms >= self.config.max_utterance_ms;

        if ended {
            self.finish()
        } else {
            None
        }
    }

    /// Close the utterance in progress, if it holds enough speech
    pub fn flush(&mut self) -> Option<Utterance> {
        self.finish()
    }

    fn start_utterance(&mut self, frame: AudioFrame, frame_ms: u64) {
        let mut samples = Vec::new();
        let mut duration_ms = 0;
        let mut start_ms = frame.timestamp_ms;

        for buffered in self.pre_roll.drain(..) {
            if duration_ms == 0 {
                start_ms = buffered.timestamp_ms;
            }
            duration_ms += buffered.duration_ms();
            samples.extend_from_slice(&buffered.samples);
        }
        self.pre_roll_ms = 0;

        samples.extend_from_slice(&frame.samples);
        duration_ms += frame_ms;

        debug!("Speech started at {}ms", start_ms);

        self.current = Some(PendingUtterance {
            utterance: Utterance {
                samples,
                sample_rate: frame.sample_rate,
                channels: frame.channels,
                start_ms,
                duration_ms,
                speech_ms: frame_ms,
            },
            silence_ms: 0,
        });
    }

    fn push_pre_roll(&mut self, frame: AudioFrame, frame_ms: u64) {
        self.pre_roll.push_back(frame);
        self.pre_roll_ms += frame_ms;

        while self.pre_roll_ms > self.config.pre_roll_ms {
            match self.pre_roll.pop_front() {
                Some(dropped) => self.pre_roll_ms -= dropped.duration_ms(),
                None => break,
            }
        }
    }

    fn finish(&mut self) -> Option<Utterance> {
        let pending = self.current.take()?;
        let utterance = pending.utterance;

        if utterance.speech_ms < self.config.min_speech_ms {
            debug!(
                "Discarding {}ms of noise ({}ms above threshold)",
                utterance.duration_ms, utterance.speech_ms
            );
            return None;
        }

        debug!(
            "Utterance complete: {}ms - {}ms ({}ms speech)",
            utterance.start_ms,
            utterance.start_ms + utterance.duration_ms,
            utterance.speech_ms
        );
        Some(utterance)
    }
}
