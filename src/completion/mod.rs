//! Text completion providers
//!
//! - `OpenAiCompletion`: OpenAI `/v1/completions`
//! - `AzureOpenAiCompletion`: Azure OpenAI chat completions on a deployment

mod azure;
mod openai;

pub use azure::{AzureOpenAiCompletion, ChatCompletionResponse};
pub use openai::{CompletionResponse, OpenAiCompletion};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

/// Generates a reply for a prompt
#[async_trait::async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Log which completion answered and when it was created
fn log_completion_created(id: &str, created: i64) {
    let created_at = DateTime::<Utc>::from_timestamp(created, 0)
        .map(|t| t.format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_else(|| created.to_string());
    info!("Completion ID={} is created at {}", id, created_at);
}
