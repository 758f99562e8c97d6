use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration of the frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let per_channel = (self.samples.len() / self.channels as usize) as u64;
        per_channel * 1000 / self.sample_rate as u64
    }

    /// Root-mean-square level normalized to 0.0..=1.0
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let v = s as f64 / i16::MAX as f64;
                v * v
            })
            .sum();
        (sum_squares / self.samples.len() as f64).sqrt() as f32
    }

    /// Convert to the target format: down-mix to mono, then resample
    pub fn convert(self, target_sample_rate: u32, target_channels: u16) -> AudioFrame {
        let mut processed = self;

        if processed.channels != target_channels && target_channels == 1 {
            processed = processed.to_mono();
        }

        if processed.sample_rate != target_sample_rate {
            processed = processed.resample(target_sample_rate);
        }

        processed
    }

    /// Average all channels into one
    pub fn to_mono(self) -> AudioFrame {
        if self.channels <= 1 {
            return self;
        }

        let channels = self.channels as usize;
        let mono_samples = self
            .samples
            .chunks_exact(channels)
            .map(|chunk| {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect();

        AudioFrame {
            samples: mono_samples,
            sample_rate: self.sample_rate,
            channels: 1,
            timestamp_ms: self.timestamp_ms,
        }
    }

    /// Linear-interpolation resampling of a mono frame
    pub fn resample(self, target_rate: u32) -> AudioFrame {
        if self.sample_rate == target_rate || self.channels != 1 || self.samples.is_empty() {
            return self;
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = (self.samples.len() as f64 / ratio).floor() as usize;
        let last = self.samples.len() - 1;

        let resampled = (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = pos.floor() as usize;
                let frac = pos - idx as f64;
                let a = self.samples[idx.min(last)] as f64;
                let b = self.samples[(idx + 1).min(last)] as f64;
                (a + (b - a) * frac).round() as i16
            })
            .collect();

        AudioFrame {
            samples: resampled,
            sample_rate: target_rate,
            channels: 1,
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate (will resample if needed)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // Azure short-audio recognition expects 16kHz
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms buffers
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device
/// - File: replay a WAV file (for testing/offline runs)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone input
    Microphone,
    /// WAV file input
    File(PathBuf),
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend for the given source
    pub fn create(source: &AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                let backend = super::microphone::MicrophoneBackend::new(config);
                Ok(Box::new(backend))
            }
            AudioSource::File(path) => {
                let backend = super::file::FileBackend::new(path.clone(), config);
                Ok(Box::new(backend))
            }
        }
    }
}
