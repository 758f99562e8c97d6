pub mod backend;
pub mod file;
pub mod microphone;
pub mod segmenter;
pub mod wav;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use file::{AudioFile, FileBackend};
pub use microphone::MicrophoneBackend;
pub use segmenter::{EndpointingConfig, Utterance, UtteranceSegmenter};
pub use wav::encode_wav;
