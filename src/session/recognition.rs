use super::events::{CancellationDetails, CancellationReason, Outcome, RecognitionEvent};
use super::gate::Gate;
use super::stats::{SessionState, SessionStatus};
use crate::error::{GateError, GateResult};
use crate::speech::{ProviderHandle, RecognitionMode, SpeechRecognizer};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Starts recognition sessions and tracks the one currently active
pub struct RecognitionGate {
    recognizer: Arc<dyn SpeechRecognizer>,
    mode: RecognitionMode,
    active: tokio::sync::Mutex<Option<Arc<Session>>>,
}

impl RecognitionGate {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, mode: RecognitionMode) -> Self {
        Self {
            recognizer,
            mode,
            active: tokio::sync::Mutex::new(None),
        }
    }

    pub fn mode(&self) -> RecognitionMode {
        self.mode
    }

    /// Start a fresh session and make it the active one
    ///
    /// Fails with `Conflict` while another session has not ended, and with
    /// `ProviderUnavailable` if the recognizer cannot start. The slot is
    /// reserved before the provider starts, so the lock is not held while the
    /// device opens.
    pub async fn begin(&self, language: &str) -> GateResult<Arc<Session>> {
        let session = {
            let mut active = self.active.lock().await;

            if let Some(current) = active.as_ref() {
                if !current.is_ended() {
                    return Err(GateError::Conflict(format!(
                        "recording session {} is still active",
                        current.id()
                    )));
                }
            }

            let session = Arc::new(Session::new(language, self.mode));
            *active = Some(Arc::clone(&session));
            session
        };

        info!(
            "Starting {:?} recognition session {} ({}) with {}",
            self.mode,
            session.id(),
            language,
            self.recognizer.name()
        );

        let handle = match self
            .recognizer
            .start(language, self.mode, session.sink())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to start recognition: {:#}", e);
                if let Err(end_err) = self.end(&session).await {
                    warn!("Failed to release session {}: {}", session.id(), end_err);
                }
                return Err(GateError::provider(e));
            }
        };

        session.attach(handle).await;

        info!("Speak into your microphone.");
        Ok(session)
    }

    /// The active session, if any
    pub async fn active(&self) -> Option<Arc<Session>> {
        self.active.lock().await.clone().filter(|s| !s.is_ended())
    }

    /// Detach the active session so the caller can finish it
    pub async fn take_active(&self) -> Option<Arc<Session>> {
        self.active.lock().await.take().filter(|s| !s.is_ended())
    }

    /// End `session` and clear it from the active slot
    pub async fn end(&self, session: &Session) -> GateResult<()> {
        {
            let mut active = self.active.lock().await;
            if active.as_ref().is_some_and(|s| s.id() == session.id()) {
                *active = None;
            }
        }
        session.end().await
    }
}

/// Sink handed to the provider; every provider event goes through it
#[derive(Clone)]
pub struct RecognitionSink {
    shared: Arc<Shared>,
}

impl RecognitionSink {
    pub fn emit(&self, event: RecognitionEvent) {
        self.shared.dispatch(event);
    }
}

/// One recording-to-result cycle
pub struct Session {
    id: String,
    language: String,
    mode: RecognitionMode,
    started_at: DateTime<Utc>,
    shared: Arc<Shared>,
    handle: tokio::sync::Mutex<Option<Box<dyn ProviderHandle>>>,
}

struct Shared {
    session_id: String,
    inner: Mutex<Inner>,
    gate: Gate,
}

struct Inner {
    state: SessionState,
    latest_interim_text: String,
    final_text: Option<String>,
    cancel_reason: Option<CancellationDetails>,
    outcome: Option<Outcome>,
    disposed: bool,
    timed_out: bool,
}

impl Session {
    pub fn new(language: &str, mode: RecognitionMode) -> Self {
        let id = format!("recording-{}", uuid::Uuid::new_v4());
        Self {
            shared: Arc::new(Shared {
                session_id: id.clone(),
                inner: Mutex::new(Inner {
                    state: SessionState::Idle,
                    latest_interim_text: String::new(),
                    final_text: None,
                    cancel_reason: None,
                    outcome: None,
                    disposed: false,
                    timed_out: false,
                }),
                gate: Gate::new(),
            }),
            id,
            language: language.to_string(),
            mode,
            started_at: Utc::now(),
            handle: tokio::sync::Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn mode(&self) -> RecognitionMode {
        self.mode
    }

    pub fn sink(&self) -> RecognitionSink {
        RecognitionSink {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Take ownership of the provider handle and start listening
    ///
    /// A session ended while its provider was starting stops the handle
    /// right away.
    pub async fn attach(&self, handle: Box<dyn ProviderHandle>) {
        let mut slot = self.handle.lock().await;
        *slot = Some(handle);

        if self.is_ended() {
            if let Some(mut handle) = slot.take() {
                drop(slot);
                debug!("Session {} ended while starting, stopping recognizer", self.id);
                if let Err(e) = handle.stop().await {
                    warn!("Failed to stop recognizer for session {}: {:#}", self.id, e);
                }
            }
            return;
        }
        drop(slot);

        let mut inner = self.shared.lock();
        if inner.state == SessionState::Idle {
            inner.state = SessionState::Listening;
        }
    }

    /// Guard that ends this session if it is dropped first
    pub fn end_on_drop(self: &Arc<Self>) -> SessionGuard {
        SessionGuard {
            session: Arc::clone(self),
        }
    }

    /// Wait for the terminal outcome
    ///
    /// A terminal session answers from its cached outcome without waiting. On
    /// timeout the provider is stopped before `Timeout` is returned.
    pub async fn await_result(&self, timeout: Duration) -> GateResult<Outcome> {
        {
            let mut inner = self.shared.lock();
            if let Some(outcome) = &inner.outcome {
                return Ok(outcome.clone());
            }
            if inner.timed_out {
                return Err(GateError::Timeout(timeout));
            }
            if inner.disposed {
                return Err(GateError::InvalidState(format!(
                    "session {} has already ended",
                    self.id
                )));
            }
            if matches!(inner.state, SessionState::Idle | SessionState::Listening) {
                inner.state = SessionState::AwaitingResult;
            }
        }

        if self.shared.gate.wait(timeout).await {
            return self.shared.lock().outcome.clone().ok_or_else(|| {
                GateError::InvalidState(format!(
                    "session {} released without an outcome",
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

        warn!(
            "Recognition session {} produced no result within {:?}",
            self.id, timeout
        );
        if let Err(e) = self.end().await {
            warn!("Failed to stop timed-out session {}: {}", self.id, e);
        }

        Err(GateError::Timeout(timeout))
    }

    /// Latest partial transcription, or empty string
    pub fn interim_text(&self) -> String {
        self.shared.lock().latest_interim_text.clone()
    }

    pub fn final_text(&self) -> Option<String> {
        self.shared.lock().final_text.clone()
    }

    pub fn cancel_reason(&self) -> Option<CancellationDetails> {
        self.shared.lock().cancel_reason.clone()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.shared.lock().outcome.clone()
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn is_ended(&self) -> bool {
        self.shared.lock().disposed
    }

    /// Number of times this session's gate has been released
    pub fn gate_releases(&self) -> usize {
        self.shared.gate.releases()
    }

    /// Release provider resources
    ///
    /// Idempotent. Ending a session that has no outcome yet counts as the
    /// session-stopped event, so any waiter is released with `NoMatch`.
    /// Events arriving afterwards are ignored.
    pub async fn end(&self) -> GateResult<()> {
        let released = {
            let mut inner = self.shared.lock();
            if inner.disposed {
                false
            } else {
                inner.disposed = true;
                if inner.outcome.is_none() && !inner.timed_out {
                    inner.complete(Outcome::NoMatch);
                    true
                } else {
                    false
                }
            }
        };

        if released {
            info!("Session {} stopped before a final result", self.id);
            self.shared.gate.release();
        }

        let handle = self.handle.lock().await.take();
        match handle {
            Some(mut handle) => {
                debug!("Stopping recognizer for session {}", self.id);
                handle.stop().await.map_err(|e| {
                    error!("Failed to stop recognizer for session {}: {:#}", self.id, e);
                    GateError::provider(e)
                })
            }
            None => Ok(()),
        }
    }

    pub fn status(&self) -> SessionStatus {
        let duration = Utc::now().signed_duration_since(self.started_at);
        let inner = self.shared.lock();

        SessionStatus {
            session_id: self.id.clone(),
            state: inner.state,
            mode: self.mode,
            language: self.language.clone(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            interim_text: inner.latest_interim_text.clone(),
            ended: inner.disposed,
        }
    }
}

/// Ends its session on drop unless it already ended
///
/// Handlers hold one across `await_result`; a request future dropped by a
/// disconnecting client otherwise leaves the recognizer running.
pub struct SessionGuard {
    session: Arc<Session>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.session.is_ended() {
            return;
        }

        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!("Request for session {} was dropped, ending it", session.id());
                runtime.spawn(async move {
                    if let Err(e) = session.end().await {
                        warn!("Failed to end abandoned session {}: {}", session.id(), e);
                    }
                });
            }
            Err(_) => warn!("No runtime to end abandoned session {}", session.id()),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Single entry point for provider events; the first terminal event wins
    fn dispatch(&self, event: RecognitionEvent) {
        let released = {
            let mut inner = self.lock();

            if inner.disposed {
                debug!(
                    "Ignoring {:?} for ended session {}",
                    event, self.session_id
                );
                return;
            }

            let outcome = match event {
                RecognitionEvent::Interim(text) => {
                    if inner.outcome.is_none() {
                        inner.latest_interim_text = text;
                    }
                    return;
                }
                terminal => terminal_outcome(terminal),
            };

            if inner.outcome.is_some() {
                debug!(
                    "Session {} already terminal, ignoring {:?}",
                    self.session_id, outcome
                );
                return;
            }

            log_outcome(&self.session_id, &outcome);
            inner.complete(outcome);
            true
        };

        if released {
            self.gate.release();
        }
    }
}

impl Inner {
    fn complete(&mut self, outcome: Outcome) {
        match &outcome {
            Outcome::Recognized(text) => {
                self.state = SessionState::Completed;
                self.final_text = Some(text.clone());
            }
            Outcome::NoMatch => {
                self.state = SessionState::Completed;
            }
            Outcome::Canceled(details) => {
                self.state = SessionState::Canceled;
                self.cancel_reason = Some(details.clone());
            }
        }
        self.outcome = Some(outcome);
    }
}

/// Outcome a terminal event would set
fn terminal_outcome(event: RecognitionEvent) -> Outcome {
    match event {
        RecognitionEvent::Recognized(text) if text.trim().is_empty() => Outcome::NoMatch,
        RecognitionEvent::Recognized(text) => Outcome::Recognized(text),
        RecognitionEvent::Interim(_)
        | RecognitionEvent::NoMatch
        | RecognitionEvent::SessionStopped => Outcome::NoMatch,
        RecognitionEvent::Canceled(details) => Outcome::Canceled(details),
    }
}

fn log_outcome(session_id: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Recognized(text) => info!("RECOGNIZED [{}]: Text={}", session_id, text),
        Outcome::NoMatch => info!("NOMATCH [{}]: Speech could not be recognized.", session_id),
        Outcome::Canceled(details) => {
            info!("CANCELED [{}]: Reason={:?}", session_id, details.reason);
            if details.reason == CancellationReason::Error {
                error!("CANCELED: ErrorCode={:?}", details.error_code);
                error!("CANCELED: ErrorDetails={:?}", details.error_details);
                error!("CANCELED: Did you set the speech resource key and region values?");
            }
        }
    }
}
