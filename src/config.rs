use crate::audio::EndpointingConfig;
use crate::speech::{RecognitionMode, DEFAULT_OUTPUT_FORMAT};
use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub speech: SpeechConfig,
    pub recognition: RecognitionConfig,
    pub synthesis: SynthesisConfig,
    pub completion: CompletionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-assistant".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Azure Speech settings shared by recognition and synthesis
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Subscription key (SPEECH_KEY)
    pub key: String,
    /// Resource region, e.g. "westeurope" (SPEECH_REGION)
    pub region: String,
    /// Recognition language tag
    pub language: String,
    /// Synthesis voice
    pub voice: String,
    /// Synthesis audio format
    pub output_format: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            region: String::new(),
            language: "en-US".to_string(),
            voice: "en-US-DavisNeural".to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub mode: RecognitionMode,
    /// How long a request waits for a recognition result
    pub timeout_secs: u64,
    /// WAV file to recognize instead of the microphone
    pub input: Option<String>,
    pub endpointing: EndpointingConfig,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            mode: RecognitionMode::SingleShot,
            timeout_secs: 30,
            input: None,
            endpointing: EndpointingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// How long a request waits for synthesized audio
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    #[default]
    OpenAi,
    Azure,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub provider: CompletionProvider,
    /// OPENAI_KEY or AZURE_OPENAI_KEY, depending on the provider
    pub api_key: String,
    /// Azure resource endpoint (AZURE_OPENAI_ENDPOINT)
    pub endpoint: String,
    /// OpenAI model
    pub model: String,
    /// Azure deployment name
    pub deployment: String,
    /// Azure API version
    pub api_version: String,
    pub max_tokens: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: CompletionProvider::OpenAi,
            api_key: String::new(),
            endpoint: String::new(),
            model: "gpt-3.5-turbo-instruct".to_string(),
            deployment: "chatgpt1".to_string(),
            api_version: "2023-05-15".to_string(),
            max_tokens: 300,
        }
    }
}

impl Config {
    /// Load from an optional file plus the process environment
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    /// Load with a custom lookup for the conventional variables
    ///
    /// Precedence, lowest first: defaults, the file at `path` (optional),
    /// `VOICE_ASSISTANT_*` variables, then SPEECH_KEY, SPEECH_REGION,
    /// OPENAI_KEY, AZURE_OPENAI_KEY and AZURE_OPENAI_ENDPOINT.
    pub fn load_with_env(path: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_ASSISTANT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;
        cfg.apply_conventional_env(lookup);
        Ok(cfg)
    }

    fn apply_conventional_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(key) = var("SPEECH_KEY") {
            self.speech.key = key;
        }
        if let Some(region) = var("SPEECH_REGION") {
            self.speech.region = region;
        }

        match self.completion.provider {
            CompletionProvider::OpenAi => {
                if let Some(key) = var("OPENAI_KEY") {
                    self.completion.api_key = key;
                }
            }
            CompletionProvider::Azure => {
                if let Some(key) = var("AZURE_OPENAI_KEY") {
                    self.completion.api_key = key;
                }
                if let Some(endpoint) = var("AZURE_OPENAI_ENDPOINT") {
                    self.completion.endpoint = endpoint;
                }
            }
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_secs(self.recognition.timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis.timeout_secs)
    }
}
