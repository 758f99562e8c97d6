use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Captures the default input device
///
/// cpal streams are not `Send` on every platform, so the stream lives on a
/// dedicated thread that owns it until `stop` is called.
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            stop_tx: None,
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.is_capturing() {
            anyhow::bail!("microphone capture already started");
        }

        let (frame_tx, frame_rx) = mpsc::channel(100);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("microphone-capture".to_string())
            .spawn(move || capture_thread(config, frame_tx, ready_tx, stop_rx))
            .context("Failed to spawn capture thread")?;

        ready_rx
            .await
            .map_err(|_| anyhow!("capture thread exited before the stream started"))??;

        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);

        info!("Microphone capture started");
        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The thread may already be gone if the stream failed
            let _ = stop_tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("Failed to join capture thread")?
                .map_err(|_| anyhow!("capture thread panicked"))?;
            info!("Microphone capture stopped");
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

fn capture_thread(
    config: AudioBackendConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<()>>,
    stop_rx: std::sync::mpsc::Receiver<()>,
) {
    let stream = match open_stream(&config, frame_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let _ = ready_tx.send(Ok(()));

    // Blocks until stop() or until the backend is dropped
    let _ = stop_rx.recv();
    drop(stream);
    debug!("Capture thread exiting");
}

fn open_stream(config: &AudioBackendConfig, frame_tx: mpsc::Sender<AudioFrame>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no input device available"))?;

    let supported = device
        .default_input_config()
        .context("Failed to query input config")?;
    let sample_format = supported.sample_format();
    let stream_config: StreamConfig = supported.into();

    debug!(
        "Opening {} ({} Hz, {} channels, {:?})",
        device.name().unwrap_or_default(),
        stream_config.sample_rate.0,
        stream_config.channels,
        sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, config, frame_tx)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, config, frame_tx)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, config, frame_tx)?,
        SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, config, frame_tx)?,
        other => anyhow::bail!("unsupported sample format {:?}", other),
    };

    stream.play().context("Failed to start input stream")?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    config: &AudioBackendConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let sample_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels;
    let target_rate = config.target_sample_rate;
    let target_channels = config.target_channels;

    // Accumulate callback data into buffer_duration_ms frames
    let frame_len =
        (sample_rate as u64 * config.buffer_duration_ms / 1000) as usize * channels as usize;
    let mut pending: Vec<i16> = Vec::with_capacity(frame_len);
    let mut captured_samples: u64 = 0;

    let stream = device
        .build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                pending.extend(data.iter().map(|&s| i16::from_sample(s)));

                while pending.len() >= frame_len.max(1) {
                    let samples: Vec<i16> = pending.drain(..frame_len.max(1)).collect();
                    let timestamp_ms = captured_samples * 1000 / sample_rate as u64;
                    captured_samples += (samples.len() / channels as usize) as u64;

                    let frame = AudioFrame {
                        samples,
                        sample_rate,
                        channels,
                        timestamp_ms,
                    }
                    .convert(target_rate, target_channels);

                    if let Err(e) = frame_tx.try_send(frame) {
                        warn!("Dropping audio frame: {}", e);
                    }
                }
            },
            |err| {
                error!("Audio capture error: {}", err);
            },
            None,
        )
        .context("Failed to build input stream")?;

    Ok(stream)
}
