use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voice_assistant::{
    create_router, AppState, AssistantSettings, AudioSource, AzureOpenAiCompletion,
    AzureSpeechRecognizer, AzureSpeechSynthesizer, CompletionProvider, Config, OpenAiCompletion,
    RecognitionGate, RecognitionMode, SynthesisGate, TextCompletion,
};

/// Voice assistant - speech in, completion, speech out over HTTP
#[derive(Parser)]
#[command(name = "voice-assistant", version, about)]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/voice-assistant")]
    config: String,

    /// Address to bind the HTTP server to
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Recognition mode
    #[arg(long, value_enum)]
    mode: Option<RecognitionMode>,

    /// Recognize a WAV file instead of the microphone
    #[arg(long)]
    input: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,voice_assistant=info",
        1 => "info,voice_assistant=debug",
        _ => "debug",
    };

    // RUST_LOG wins over -v
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = Config::load(&cli.config)?;

    if let Some(bind) = cli.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = cli.port {
        cfg.service.http.port = port;
    }
    if let Some(mode) = cli.mode {
        cfg.recognition.mode = mode;
    }
    if let Some(input) = cli.input {
        cfg.recognition.input = Some(input.display().to_string());
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let state = build_state(&cfg)?;
    let app = create_router(state);

    let addr = cfg.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shut down");
    Ok(())
}

fn build_state(cfg: &Config) -> Result<AppState> {
    let source = match &cfg.recognition.input {
        Some(path) => AudioSource::File(PathBuf::from(path)),
        None => AudioSource::Microphone,
    };

    // Missing credentials are reported per request, so the server still starts
    if cfg.speech.key.is_empty() || cfg.speech.region.is_empty() {
        tracing::warn!("SPEECH_KEY / SPEECH_REGION not set; speech requests will fail");
    }

    let recognizer = AzureSpeechRecognizer::new(
        cfg.speech.key.clone(),
        cfg.speech.region.clone(),
        source.clone(),
        cfg.recognition.endpointing.clone(),
    )?;
    let synthesizer = AzureSpeechSynthesizer::new(
        cfg.speech.key.clone(),
        cfg.speech.region.clone(),
        cfg.speech.language.clone(),
        cfg.speech.output_format.clone(),
    )?;

    let completion: Arc<dyn TextCompletion> = match cfg.completion.provider {
        CompletionProvider::OpenAi => Arc::new(OpenAiCompletion::new(
            cfg.completion.api_key.clone(),
            cfg.completion.model.clone(),
            cfg.completion.max_tokens,
        )?),
        CompletionProvider::Azure => Arc::new(AzureOpenAiCompletion::new(
            cfg.completion.api_key.clone(),
            cfg.completion.endpoint.clone(),
            cfg.completion.deployment.clone(),
            cfg.completion.api_version.clone(),
        )?),
    };

    info!(
        "Recognition: {:?} mode, language {}, source {:?}",
        cfg.recognition.mode, cfg.speech.language, source
    );
    info!(
        "Synthesis voice {}, completion via {}",
        cfg.speech.voice,
        completion.name()
    );

    Ok(AppState::new(
        Arc::new(RecognitionGate::new(
            Arc::new(recognizer),
            cfg.recognition.mode,
        )),
        Arc::new(SynthesisGate::new(Arc::new(synthesizer))),
        completion,
        AssistantSettings {
            language: cfg.speech.language.clone(),
            voice: cfg.speech.voice.clone(),
            recognition_timeout: cfg.recognition_timeout(),
            synthesis_timeout: cfg.synthesis_timeout(),
        },
    ))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, shutting down");
    }
}
