pub mod audio;
pub mod completion;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod speech;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    EndpointingConfig, UtteranceSegmenter,
};
pub use completion::{AzureOpenAiCompletion, OpenAiCompletion, TextCompletion};
pub use config::{CompletionProvider, Config};
pub use error::{GateError, GateResult};
pub use http::{create_router, AppState, AssistantSettings};
pub use session::{
    CancellationDetails, CancellationReason, Outcome, RecognitionEvent, RecognitionGate,
    RecognitionSink, Session, SessionState, SessionStatus, SynthesisEvent, SynthesisGate,
    SynthesisOutcome, SynthesisSession, SynthesisSink,
};
pub use speech::{
    AzureSpeechRecognizer, AzureSpeechSynthesizer, ProviderHandle, RecognitionMode,
    SpeechRecognizer, SpeechSynthesizer,
};
