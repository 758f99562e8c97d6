use super::{log_completion_created, TextCompletion};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/completions";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    #[serde(default)]
    pub created: i64,
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
    #[serde(default)]
    pub index: u32,
}

impl CompletionResponse {
    /// Text of the first choice
    pub fn into_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .context("completion returned no choices")
    }
}

/// OpenAI legacy completions API
pub struct OpenAiCompletion {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiCompletion {
    pub fn new(api_key: String, model: String, max_tokens: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model,
            max_tokens,
        })
    }
}

#[async_trait::async_trait]
impl TextCompletion for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            anyhow::bail!("OpenAI API key is not set (OPENAI_KEY)");
        }

        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: self.max_tokens,
        };

        debug!("Requesting completion from {}", self.model);

        let response = self
            .client
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("OpenAI API error {}: {}", status, body);
            anyhow::bail!("OpenAI API error {status}: {body}");
        }

        let body: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        log_completion_created(&body.id, body.created);
        body.into_text()
    }

    fn name(&self) -> &str {
        "openai"
    }
}
