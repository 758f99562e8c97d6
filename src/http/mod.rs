//! HTTP API for the voice assistant front end
//!
//! This module provides a REST API driving the recording/synthesis cycle:
//! - POST /startRecording - Start recognizing (single-shot returns the text)
//! - POST /stopRecording - Wait for the recognition result and stop
//! - POST /startSynthesizing - Complete the last prompt and synthesize the reply
//! - POST /stopSynthesizing - Stop the synthesis in progress
//! - GET /status - Active session diagnostics
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, StatusResponse, SynthesisResponse};
pub use routes::create_router;
pub use state::{AppState, AssistantSettings};
