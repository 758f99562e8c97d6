//! Recognition and synthesis sessions
//!
//! This module bridges event-driven speech providers with callers that wait
//! for exactly one result:
//! - `RecognitionGate` / `Session`: one recording-to-transcript cycle
//! - `SynthesisGate` / `SynthesisSession`: one text-to-audio request
//! - `Gate`: the one-shot barrier both of them release on their first terminal event

mod events;
mod gate;
mod recognition;
mod stats;
mod synthesis;

pub use events::{
    CancellationDetails, CancellationReason, Outcome, RecognitionEvent, SynthesisEvent,
    SynthesisOutcome,
};
pub use gate::Gate;
pub use recognition::{RecognitionGate, RecognitionSink, Session, SessionGuard};
pub use stats::{SessionState, SessionStatus};
pub use synthesis::{SynthesisGate, SynthesisGuard, SynthesisSession, SynthesisSink};
