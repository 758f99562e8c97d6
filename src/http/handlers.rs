use super::state::AppState;
use crate::error::GateError;
use crate::session::{SessionStatus, SynthesisOutcome};
use crate::speech::RecognitionMode;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use serde::{Serialize, Serializer};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisResponse {
    /// Synthesized audio, base64 encoded
    #[serde(serialize_with = "serialize_base64")]
    pub audio_file: Vec<u8>,

    /// Reply generated for the recorded prompt
    pub chatbot_response: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub mode: RecognitionMode,
    pub recording: Option<SessionStatus>,
    pub synthesizing: bool,
    pub last_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = match &self {
            GateError::InvalidState(_) => StatusCode::BAD_REQUEST,
            GateError::Conflict(_) => StatusCode::CONFLICT,
            GateError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GateError::ProviderUnavailable(_)
            | GateError::RecognitionCanceled(_)
            | GateError::SynthesisCanceled(_)
            | GateError::Completion(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        error!("Request failed ({}): {}", status, self);

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /startRecording
/// Start recognizing from the microphone
///
/// Single-shot mode answers with the recognized text; continuous mode answers
/// immediately with an empty body and keeps listening until /stopRecording.
pub async fn start_recording(State(state): State<AppState>) -> Result<Response, GateError> {
    let session = state.recognition.begin(&state.settings.language).await?;

    if session.mode() == RecognitionMode::Continuous {
        info!("Recording started for session {}", session.id());
        return Ok((StatusCode::OK, String::new()).into_response());
    }

    let _guard = session.end_on_drop();
    let result = session.await_result(state.settings.recognition_timeout).await;
    if let Err(e) = state.recognition.end(&session).await {
        warn!("Failed to release recognizer for {}: {}", session.id(), e);
    }

    let text = state.record_outcome(result?).await?;
    Ok((StatusCode::OK, text).into_response())
}

/// POST /stopRecording
/// Wait for the active session's result, then stop it
pub async fn stop_recording(State(state): State<AppState>) -> Result<Response, GateError> {
    let Some(session) = state.recognition.take_active().await else {
        return Ok((
            StatusCode::BAD_REQUEST,
            "No recording is currently in progress",
        )
            .into_response());
    };

    info!("Stopping recording session {}", session.id());

    let _guard = session.end_on_drop();
    let result = session.await_result(state.settings.recognition_timeout).await;
    session.end().await?;
    state.record_outcome(result?).await?;

    info!("Recording stopped successfully for session {}", session.id());
    Ok((StatusCode::OK, "Recording stopped successfully").into_response())
}

/// POST /startSynthesizing
/// Answer the last recorded prompt and synthesize the reply
pub async fn start_synthesizing(State(state): State<AppState>) -> Result<Response, GateError> {
    let prompt = state
        .last_prompt()
        .await
        .ok_or_else(|| GateError::InvalidState("no prompt has been recorded yet".to_string()))?;

    let response = state.completion.complete(&prompt).await.map_err(|e| {
        error!("{} completion failed: {:#}", state.completion.name(), e);
        GateError::Completion(format!("{e:#}"))
    })?;

    let outcome = state
        .synthesis
        .synthesize(
            &response,
            &state.settings.voice,
            state.settings.synthesis_timeout,
        )
        .await?;

    match outcome {
        SynthesisOutcome::AudioReady(audio) => Ok((
            StatusCode::OK,
            Json(SynthesisResponse {
                audio_file: audio,
                chatbot_response: response,
            }),
        )
            .into_response()),
        SynthesisOutcome::Canceled(details) => Err(GateError::SynthesisCanceled(details)),
    }
}

/// POST /stopSynthesizing
/// Stop the synthesis in progress
pub async fn stop_synthesizing(State(state): State<AppState>) -> Result<Response, GateError> {
    let Some(session) = state.synthesis.take_active().await else {
        return Ok((
            StatusCode::BAD_REQUEST,
            "No synthesis is currently in progress",
        )
            .into_response());
    };

    session.end().await?;

    info!("Synthesis {} stopped", session.id());
    Ok((StatusCode::OK, "Synthesizing stopped successfully").into_response())
}

/// GET /status
/// Active session diagnostics, including the interim transcription
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let recording = state.recognition.active().await.map(|s| s.status());
    let synthesizing = state.synthesis.active().await.is_some();

    (
        StatusCode::OK,
        Json(StatusResponse {
            mode: state.recognition.mode(),
            recording,
            synthesizing,
            last_prompt: state.last_prompt().await,
        }),
    )
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
