use super::events::{CancellationDetails, CancellationReason, SynthesisEvent, SynthesisOutcome};
use super::gate::Gate;
use crate::error::{GateError, GateResult};
use crate::speech::{ProviderHandle, SpeechSynthesizer};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Runs synthesis requests, one at a time
pub struct SynthesisGate {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    active: tokio::sync::Mutex<Option<Arc<SynthesisSession>>>,
}

impl SynthesisGate {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            synthesizer,
            active: tokio::sync::Mutex::new(None),
        }
    }

    /// Synthesize `text` with `voice` and wait for the audio
    ///
    /// Empty text yields empty audio without calling the provider.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        timeout: Duration,
    ) -> GateResult<SynthesisOutcome> {
        if text.is_empty() {
            info!("Text is empty, skipping synthesis");
            return Ok(SynthesisOutcome::AudioReady(Vec::new()));
        }

        let session = self.begin(text, voice).await?;
        let _guard = session.end_on_drop();
        let result = session.await_result(timeout).await;
        self.end(&session).await?;
        result
    }

    /// Start a synthesis request and make it the active one
    ///
    /// The slot is reserved before the provider starts.
    pub async fn begin(&self, text: &str, voice: &str) -> GateResult<Arc<SynthesisSession>> {
        let session = {
            let mut active = self.active.lock().await;

            if let Some(current) = active.as_ref() {
                if !current.is_ended() {
                    return Err(GateError::Conflict(format!(
                        "synthesis {} is still active",
                        current.id()
                    )));
                }
            }

            let session = Arc::new(SynthesisSession::new(text, voice));
            *active = Some(Arc::clone(&session));
            session
        };

        debug!(
            "Starting synthesis {} with {} (voice={}, chars={})",
            session.id(),
            self.synthesizer.name(),
            voice,
            text.chars().count()
        );

        let handle = match self.synthesizer.start(text, voice, session.sink()).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to start synthesis: {:#}", e);
                if let Err(end_err) = self.end(&session).await {
                    warn!("Failed to release synthesis {}: {}", session.id(), end_err);
                }
                return Err(GateError::provider(e));
            }
        };

        session.attach(handle).await;

        Ok(session)
    }

    pub async fn active(&self) -> Option<Arc<SynthesisSession>> {
        self.active.lock().await.clone().filter(|s| !s.is_ended())
    }

    /// Detach the active synthesis so the caller can stop it
    pub async fn take_active(&self) -> Option<Arc<SynthesisSession>> {
        self.active.lock().await.take().filter(|s| !s.is_ended())
    }

    /// End `session` and clear it from the active slot
    pub async fn end(&self, session: &SynthesisSession) -> GateResult<()> {
        {
            let mut active = self.active.lock().await;
            if active.as_ref().is_some_and(|s| s.id() == session.id()) {
                *active = None;
            }
        }
        session.end().await
    }
}

/// Sink handed to the synthesis provider
#[derive(Clone)]
pub struct SynthesisSink {
    shared: Arc<Shared>,
}

impl SynthesisSink {
    pub fn emit(&self, event: SynthesisEvent) {
        self.shared.dispatch(event);
    }
}

/// One synthesis request
pub struct SynthesisSession {
    id: String,
    text: String,
    voice: String,
    shared: Arc<Shared>,
    handle: tokio::sync::Mutex<Option<Box<dyn ProviderHandle>>>,
}

struct Shared {
    session_id: String,
    inner: Mutex<Inner>,
    gate: Gate,
}

#[derive(Default)]
struct Inner {
    outcome: Option<SynthesisOutcome>,
    disposed: bool,
    timed_out: bool,
}

impl SynthesisSession {
    pub fn new(text: &str, voice: &str) -> Self {
        let id = format!("synthesis-{}", uuid::Uuid::new_v4());
        Self {
            shared: Arc::new(Shared {
                session_id: id.clone(),
                inner: Mutex::new(Inner::default()),
                gate: Gate::new(),
            }),
            id,
            text: text.to_string(),
            voice: voice.to_string(),
            handle: tokio::sync::Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn sink(&self) -> SynthesisSink {
        SynthesisSink {
            shared: Arc::clone(&self.shared),
        }
    }

    pub async fn attach(&self, handle: Box<dyn ProviderHandle>) {
        let mut slot = self.handle.lock().await;
        *slot = Some(handle);

        if self.is_ended() {
            if let Some(mut handle) = slot.take() {
                drop(slot);
                debug!("Synthesis {} ended while starting, stopping synthesizer", self.id);
                if let Err(e) = handle.stop().await {
                    warn!("Failed to stop synthesizer for {}: {:#}", self.id, e);
                }
            }
        }
    }

    /// Guard that ends this request if it is dropped first
    pub fn end_on_drop(self: &Arc<Self>) -> SynthesisGuard {
        SynthesisGuard {
            session: Arc::clone(self),
        }
    }

    /// Wait for the audio or a cancellation; cached once terminal
    pub async fn await_result(&self, timeout: Duration) -> GateResult<SynthesisOutcome> {
        {
            let inner = self.shared.lock();
            if let Some(outcome) = &inner.outcome {
                return Ok(outcome.clone());
            }
            if inner.timed_out {
                return Err(GateError::Timeout(timeout));
            }
            if inner.disposed {
                return Err(GateError::InvalidState(format!(
                    "synthesis {} has already ended",
                    self.id
                )));
            }
        }

        if self.shared.gate.wait(timeout).await {
            return self.shared.lock().outcome.clone().ok_or_else(|| {
                GateError::InvalidState(format!(
                    "synthesis {} released without an outcome",
                    self.id
                ))
            });
        }

        {
            let mut inner = self.shared.lock();
            if let Some(outcome) = &inner.outcome {
                return Ok(outcome.clone());
            }
            inner.timed_out = true;
        }

        warn!("Synthesis {} produced no audio within {:?}", self.id, timeout);
        if let Err(e) = self.end().await {
            warn!("Failed to stop timed-out synthesis {}: {}", self.id, e);
        }

        Err(GateError::Timeout(timeout))
    }

    pub fn outcome(&self) -> Option<SynthesisOutcome> {
        self.shared.lock().outcome.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.shared.lock().disposed
    }

    pub fn gate_releases(&self) -> usize {
        self.shared.gate.releases()
    }

    /// Release the synthesizer
    ///
    /// Idempotent. Ending before any audio arrived records a cancellation by
    /// the user and releases the waiter with it.
    pub async fn end(&self) -> GateResult<()> {
        let released = {
            let mut inner = self.shared.lock();
            if inner.disposed {
                false
            } else {
                inner.disposed = true;
                if inner.outcome.is_none() && !inner.timed_out {
                    inner.outcome = Some(SynthesisOutcome::Canceled(CancellationDetails::by_user()));
                    true
                } else {
                    false
                }
            }
        };

        if released {
            info!("Synthesis {} stopped before audio was ready", self.id);
            self.shared.gate.release();
        }

        let handle = self.handle.lock().await.take();
        match handle {
            Some(mut handle) => handle.stop().await.map_err(|e| {
                error!("Failed to stop synthesizer for {}: {:#}", self.id, e);
                GateError::provider(e)
            }),
            None => Ok(()),
        }
    }
}

/// Ends its synthesis on drop unless it already ended
pub struct SynthesisGuard {
    session: Arc<SynthesisSession>,
}

impl Drop for SynthesisGuard {
    fn drop(&mut self) {
        if self.session.is_ended() {
            return;
        }

        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!("Request for synthesis {} was dropped, ending it", session.id());
                runtime.spawn(async move {
                    if let Err(e) = session.end().await {
                        warn!("Failed to end abandoned synthesis {}: {}", session.id(), e);
                    }
                });
            }
            Err(_) => warn!("No runtime to end abandoned synthesis {}", session.id()),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, event: SynthesisEvent) {
        {
            let mut inner = self.lock();

            if inner.disposed {
                debug!("Ignoring synthesis event for ended {}", self.session_id);
                return;
            }
            if inner.outcome.is_some() {
                debug!("Synthesis {} already terminal, ignoring event", self.session_id);
                return;
            }

            match &event {
                SynthesisEvent::AudioReady(bytes) => {
                    info!("Speech synthesized for {} ({} bytes)", self.session_id, bytes.len());
                }
                SynthesisEvent::Canceled(details) => {
                    info!("CANCELED [{}]: Reason={:?}", self.session_id, details.reason);
                    if details.reason == CancellationReason::Error {
                        error!("CANCELED: ErrorCode={:?}", details.error_code);
                        error!("CANCELED: ErrorDetails={:?}", details.error_details);
                        error!("CANCELED: Did you set the speech resource key and region values?");
                    }
                }
            }

            inner.outcome = Some(event.into());
        }

        self.gate.release();
    }
}
