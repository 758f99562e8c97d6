use super::{log_completion_created, TextCompletion};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    #[serde(default)]
    pub created: i64,
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoiceMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Content of the first choice, or empty string when there is none
    pub fn into_text(self) -> String {
        match self.choices.into_iter().next() {
            Some(choice) => {
                info!(
                    "Index: {}, Chat Role: {}",
                    choice.index, choice.message.role
                );
                choice.message.content.unwrap_or_default()
            }
            None => String::new(),
        }
    }
}

/// Azure OpenAI chat completions on a named deployment
pub struct AzureOpenAiCompletion {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    deployment: String,
    api_version: String,
}

impl AzureOpenAiCompletion {
    pub fn new(
        api_key: String,
        endpoint: String,
        deployment: String,
        api_version: String,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            endpoint,
            deployment,
            api_version,
        })
    }

    pub fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }
}

#[async_trait::async_trait]
impl TextCompletion for AzureOpenAiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() || self.endpoint.is_empty() {
            anyhow::bail!("Azure OpenAI key and endpoint must be set (AZURE_OPENAI_KEY / AZURE_OPENAI_ENDPOINT)");
        }

        let request = ChatCompletionRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!("Requesting chat completion from deployment {}", self.deployment);

        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Azure OpenAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Azure OpenAI API error {}: {}", status, body);
            anyhow::bail!("Azure OpenAI API error {status}: {body}");
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse Azure OpenAI response")?;

        log_completion_created(&body.id, body.created);
        let text = body.into_text();
        info!("Message: {}", text);
        Ok(text)
    }

    fn name(&self) -> &str {
        "azure-openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_choice_content_is_returned() {
        let json = r#"{
            "id": "chatcmpl-1",
            "created": 1700000000,
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Hi there!"}, "finish_reason": "stop"}
            ]
        }"#;

        let body: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.into_text(), "Hi there!");
    }

    #[test]
    fn test_no_choices_yields_empty_text() {
        let json = r#"{"id": "chatcmpl-2", "created": 0, "choices": []}"#;
        let body: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.into_text(), "");
    }

    #[test]
    fn test_url_joins_endpoint_and_deployment() {
        let completion = AzureOpenAiCompletion::new(
            "key".to_string(),
            "https://example.openai.azure.com/".to_string(),
            "chatgpt1".to_string(),
            "2023-05-15".to_string(),
        )
        .unwrap();

        assert_eq!(
            completion.url(),
            "https://example.openai.azure.com/openai/deployments/chatgpt1/chat/completions?api-version=2023-05-15"
        );
    }
}
