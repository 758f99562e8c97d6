// Scripted providers shared by the gate and HTTP tests
//
// The fakes keep every sink they were handed so a test can play the provider
// side of a session by emitting events directly.

#![allow(dead_code)]

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use voice_assistant::speech::{ProviderHandle, RecognitionMode, SpeechRecognizer, SpeechSynthesizer};
use voice_assistant::{RecognitionEvent, RecognitionSink, SynthesisEvent, SynthesisSink, TextCompletion};

pub struct FakeHandle {
    stops: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ProviderHandle for FakeHandle {
    async fn stop(&mut self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Recognizer that emits `script` as soon as it starts
#[derive(Default)]
pub struct FakeRecognizer {
    script: Vec<RecognitionEvent>,
    fail_start: bool,
    hold: Option<Arc<Notify>>,
    sinks: Mutex<Vec<RecognitionSink>>,
    starts: AtomicUsize,
    stops: Arc<AtomicUsize>,
}

impl FakeRecognizer {
    /// Never reports anything on its own
    pub fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(script: Vec<RecognitionEvent>) -> Arc<Self> {
        Arc::new(Self {
            script,
            ..Default::default()
        })
    }

    /// Blocks in `start` until `release` is notified
    pub fn held(release: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            hold: Some(release),
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_start: true,
            ..Default::default()
        })
    }

    /// Sink of the most recently started session
    pub fn last_sink(&self) -> RecognitionSink {
        self.sinks
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("recognizer was never started")
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for FakeRecognizer {
    async fn start(
        &self,
        _language: &str,
        _mode: RecognitionMode,
        events: RecognitionSink,
    ) -> Result<Box<dyn ProviderHandle>> {
        if let Some(release) = &self.hold {
            release.notified().await;
        }
        if self.fail_start {
            anyhow::bail!("speech key is not set");
        }

        self.starts.fetch_add(1, Ordering::SeqCst);
        for event in &self.script {
            events.emit(event.clone());
        }
        self.sinks.lock().unwrap().push(events);

        Ok(Box::new(FakeHandle {
            stops: Arc::clone(&self.stops),
        }))
    }

    fn name(&self) -> &str {
        "fake-recognizer"
    }
}

/// Synthesizer that answers with `reply`, or stays silent when it is `None`
#[derive(Default)]
pub struct FakeSynthesizer {
    reply: Option<SynthesisEvent>,
    sinks: Mutex<Vec<SynthesisSink>>,
    starts: AtomicUsize,
    stops: Arc<AtomicUsize>,
}

impl FakeSynthesizer {
    pub fn replying(reply: SynthesisEvent) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply),
            ..Default::default()
        })
    }

    pub fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last_sink(&self) -> SynthesisSink {
        self.sinks
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("synthesizer was never started")
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn start(
        &self,
        _text: &str,
        _voice: &str,
        events: SynthesisSink,
    ) -> Result<Box<dyn ProviderHandle>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(reply) = &self.reply {
            events.emit(reply.clone());
        }
        self.sinks.lock().unwrap().push(events);

        Ok(Box::new(FakeHandle {
            stops: Arc::clone(&self.stops),
        }))
    }

    fn name(&self) -> &str {
        "fake-synthesizer"
    }
}

/// Completion that echoes the prompt, remembering what it was asked
#[derive(Default)]
pub struct EchoCompletion {
    pub prompts: Mutex<Vec<String>>,
    pub fail: bool,
}

#[async_trait::async_trait]
impl TextCompletion for EchoCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.fail {
            anyhow::bail!("completion service returned 401");
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(format!("You said: {prompt}"))
    }

    fn name(&self) -> &str {
        "echo"
    }
}
