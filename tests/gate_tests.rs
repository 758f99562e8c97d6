// Integration tests for the recognition and synthesis gates
//
// Providers are scripted in-process fakes; tests play the provider side by
// emitting events through the sink the gate handed out.

mod common;

use common::{FakeRecognizer, FakeSynthesizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use voice_assistant::speech::RecognitionMode;
use voice_assistant::{
    CancellationDetails, CancellationReason, GateError, Outcome, RecognitionEvent,
    RecognitionGate, SessionState, SynthesisEvent, SynthesisGate, SynthesisOutcome,
};

const WAIT: Duration = Duration::from_secs(2);

fn gate_with(recognizer: &Arc<FakeRecognizer>) -> RecognitionGate {
    RecognitionGate::new(recognizer.clone(), RecognitionMode::SingleShot)
}

// ============================================================================
// Recognition
// ============================================================================

#[tokio::test]
async fn test_interim_then_final_is_recognized() {
    let recognizer = FakeRecognizer::silent();
    let gate = gate_with(&recognizer);

    let session = gate.begin("en-US").await.unwrap();
    assert_eq!(session.state(), SessionState::Listening);

    let sink = recognizer.last_sink();
    sink.emit(RecognitionEvent::Interim("hel".to_string()));
    assert_eq!(session.interim_text(), "hel");
    assert!(session.outcome().is_none(), "Interim results never set the outcome");
    assert_eq!(session.gate_releases(), 0);

    sink.emit(RecognitionEvent::Recognized("hello world".to_string()));

    let first = session.await_result(WAIT).await.unwrap();
    assert_eq!(first, Outcome::Recognized("hello world".to_string()));
    assert_eq!(session.final_text().as_deref(), Some("hello world"));
    assert_eq!(session.state(), SessionState::Completed);

    // Cached: returns immediately even with a zero budget
    let second = session.await_result(Duration::ZERO).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(session.gate_releases(), 1);
}

#[tokio::test]
async fn test_event_before_await_is_not_lost() {
    let recognizer =
        FakeRecognizer::scripted(vec![RecognitionEvent::Recognized("turn on the lights".into())]);
    let gate = gate_with(&recognizer);

    let session = gate.begin("en-US").await.unwrap();

    assert_eq!(
        session.await_result(WAIT).await.unwrap(),
        Outcome::Recognized("turn on the lights".to_string())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_release_under_racing_terminal_events() {
    let recognizer = FakeRecognizer::silent();
    let gate = gate_with(&recognizer);
    let session = gate.begin("en-US").await.unwrap();
    let sink = recognizer.last_sink();

    let emitters = (0..32).map(|i| {
        let sink = sink.clone();
        tokio::spawn(async move {
            let event = match i % 3 {
                0 => RecognitionEvent::Recognized(format!("utterance {i}")),
                1 => RecognitionEvent::NoMatch,
                _ => RecognitionEvent::Canceled(CancellationDetails::error("1006", "socket closed")),
            };
            sink.emit(event);
        })
    });

    let waiter = session.await_result(WAIT);
    let (outcome, joined) = tokio::join!(waiter, futures::future::join_all(emitters));
    assert!(joined.iter().all(|r| r.is_ok()));

    let outcome = outcome.unwrap();
    assert_eq!(session.gate_releases(), 1);
    assert_eq!(session.outcome(), Some(outcome));
}

#[tokio::test]
async fn test_first_writer_wins() {
    let recognizer = FakeRecognizer::silent();
    let gate = gate_with(&recognizer);
    let session = gate.begin("en-US").await.unwrap();
    let sink = recognizer.last_sink();

    sink.emit(RecognitionEvent::Canceled(CancellationDetails::error(
        "AuthenticationFailure",
        "invalid subscription key",
    )));
    sink.emit(RecognitionEvent::Recognized("too late".to_string()));
    sink.emit(RecognitionEvent::SessionStopped);

    let outcome = session.await_result(WAIT).await.unwrap();
    match outcome {
        Outcome::Canceled(details) => {
            assert_eq!(details.reason, CancellationReason::Error);
            assert_eq!(details.error_code.as_deref(), Some("AuthenticationFailure"));
            assert_eq!(details.error_details.as_deref(), Some("invalid subscription key"));
        }
        other => panic!("expected cancellation, got {:?}", other),
    }

    assert_eq!(session.state(), SessionState::Canceled);
    assert!(session.final_text().is_none());
    assert_eq!(session.gate_releases(), 1);
}

#[tokio::test]
async fn test_session_stopped_without_result_is_no_match() {
    let recognizer = FakeRecognizer::scripted(vec![
        RecognitionEvent::Interim("uh".to_string()),
        RecognitionEvent::SessionStopped,
    ]);
    let gate = gate_with(&recognizer);
    let session = gate.begin("en-US").await.unwrap();

    assert_eq!(session.await_result(WAIT).await.unwrap(), Outcome::NoMatch);
    assert!(session.final_text().is_none());
}

#[tokio::test]
async fn test_empty_recognized_text_is_no_match() {
    let recognizer = FakeRecognizer::scripted(vec![RecognitionEvent::Recognized("  ".into())]);
    let gate = gate_with(&recognizer);
    let session = gate.begin("en-US").await.unwrap();

    assert_eq!(session.await_result(WAIT).await.unwrap(), Outcome::NoMatch);
}

#[tokio::test]
async fn test_timeout_stops_provider_and_freezes_session() {
    let recognizer = FakeRecognizer::silent();
    let gate = gate_with(&recognizer);
    let session = gate.begin("en-US").await.unwrap();
    let sink = recognizer.last_sink();

    let result = session.await_result(Duration::from_millis(20)).await;
    assert!(matches!(result, Err(GateError::Timeout(_))));
    assert!(session.is_ended());
    assert_eq!(recognizer.stops(), 1, "Timeout should stop the provider");

    // Late events change nothing
    sink.emit(RecognitionEvent::Recognized("late".to_string()));
    assert!(session.outcome().is_none());
    assert!(session.final_text().is_none());
    assert_eq!(session.gate_releases(), 0);

    // Waiting again reports the timeout without waiting
    let again = session.await_result(WAIT).await;
    assert!(matches!(again, Err(GateError::Timeout(_))));

    // Ending afterwards is a no-op
    gate.end(&session).await.unwrap();
    assert_eq!(recognizer.stops(), 1);
}

#[tokio::test]
async fn test_end_is_idempotent_and_ignores_late_events() {
    let recognizer = FakeRecognizer::scripted(vec![RecognitionEvent::Recognized("hi".into())]);
    let gate = gate_with(&recognizer);
    let session = gate.begin("en-US").await.unwrap();
    let sink = recognizer.last_sink();

    session.await_result(WAIT).await.unwrap();
    gate.end(&session).await.unwrap();
    gate.end(&session).await.unwrap();
    session.end().await.unwrap();
    assert_eq!(recognizer.stops(), 1);

    sink.emit(RecognitionEvent::Canceled(CancellationDetails::error("500", "late")));
    sink.emit(RecognitionEvent::Recognized("something else".to_string()));

    assert_eq!(session.final_text().as_deref(), Some("hi"));
    assert!(session.cancel_reason().is_none());
    assert_eq!(session.gate_releases(), 1);
}

#[tokio::test]
async fn test_end_releases_waiter_with_no_match() {
    let recognizer = FakeRecognizer::silent();
    let gate = Arc::new(gate_with(&recognizer));
    let session = gate.begin("en-US").await.unwrap();

    let waiter = {
        let session = session.clone();
        tokio::spawn(async move { session.await_result(WAIT).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.end(&session).await.unwrap();

    assert_eq!(waiter.await.unwrap().unwrap(), Outcome::NoMatch);
    assert_eq!(session.gate_releases(), 1);
    assert!(gate.active().await.is_none());
}

#[tokio::test]
async fn test_begin_conflicts_while_session_active() {
    let recognizer = FakeRecognizer::silent();
    let gate = gate_with(&recognizer);

    let first = gate.begin("en-US").await.unwrap();
    let second = gate.begin("en-US").await;
    assert!(matches!(second, Err(GateError::Conflict(_))));
    assert_eq!(recognizer.starts(), 1);

    gate.end(&first).await.unwrap();

    let third = gate.begin("en-US").await.unwrap();
    assert_ne!(third.id(), first.id(), "Each cycle gets a fresh session");
    assert_eq!(recognizer.starts(), 2);
}

#[tokio::test]
async fn test_begin_fails_when_provider_unavailable() {
    let recognizer = FakeRecognizer::failing();
    let gate = gate_with(&recognizer);

    let result = gate.begin("en-US").await;
    match result {
        Err(GateError::ProviderUnavailable(msg)) => assert!(msg.contains("speech key")),
        Err(other) => panic!("expected ProviderUnavailable, got {:?}", other),
        Ok(_) => panic!("expected ProviderUnavailable, got a session"),
    }
    assert!(gate.active().await.is_none());
}

/// Poll until the gate exposes an active session
async fn wait_for_active(gate: &RecognitionGate) -> Arc<voice_assistant::Session> {
    for _ in 0..200 {
        if let Some(session) = gate.active().await {
            return session;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no session became active");
}

#[tokio::test]
async fn test_slot_is_reserved_while_provider_starts() {
    let release = Arc::new(Notify::new());
    let recognizer = FakeRecognizer::held(release.clone());
    let gate = Arc::new(gate_with(&recognizer));

    let starting = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.begin("en-US").await.map(|s| s.id().to_string()) })
    };

    // Status reads do not wait for the provider
    let pending = wait_for_active(&gate).await;
    assert_eq!(pending.state(), SessionState::Idle);
    assert!(matches!(
        gate.begin("en-US").await,
        Err(GateError::Conflict(_))
    ));

    release.notify_one();

    let id = starting.await.unwrap().unwrap();
    assert_eq!(id, pending.id());
    assert_eq!(pending.state(), SessionState::Listening);
    assert_eq!(recognizer.starts(), 1);
}

#[tokio::test]
async fn test_session_ended_while_starting_stops_provider() {
    let release = Arc::new(Notify::new());
    let recognizer = FakeRecognizer::held(release.clone());
    let gate = Arc::new(gate_with(&recognizer));

    let starting = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.begin("en-US").await.map(|s| s.is_ended()) })
    };

    let pending = wait_for_active(&gate).await;
    let taken = gate.take_active().await.unwrap();
    assert_eq!(taken.id(), pending.id());
    taken.end().await.unwrap();

    release.notify_one();

    assert!(starting.await.unwrap().unwrap(), "Session should stay ended");
    assert_eq!(recognizer.stops(), 1, "Late handle should be stopped on attach");
    assert!(gate.active().await.is_none());
}

#[tokio::test]
async fn test_dropped_guard_ends_session() {
    let recognizer = FakeRecognizer::silent();
    let gate = gate_with(&recognizer);
    let session = gate.begin("en-US").await.unwrap();

    let waiting = {
        let session = session.clone();
        async move {
            let _guard = session.end_on_drop();
            session.await_result(WAIT).await
        }
    };
    assert!(tokio::time::timeout(Duration::from_millis(20), waiting)
        .await
        .is_err());

    for _ in 0..200 {
        if recognizer.stops() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(recognizer.stops(), 1);
    assert!(session.is_ended());
    assert!(gate.active().await.is_none());

    // The slot is free again
    gate.begin("en-US").await.unwrap();
    assert_eq!(recognizer.starts(), 2);
}

#[tokio::test]
async fn test_guard_is_noop_after_normal_end() {
    let recognizer = FakeRecognizer::scripted(vec![RecognitionEvent::Recognized("ok".into())]);
    let gate = gate_with(&recognizer);
    let session = gate.begin("en-US").await.unwrap();

    {
        let _guard = session.end_on_drop();
        session.await_result(WAIT).await.unwrap();
        gate.end(&session).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(recognizer.stops(), 1);
    assert_eq!(session.gate_releases(), 1);
}

#[tokio::test]
async fn test_status_reports_interim_text() {
    let recognizer = FakeRecognizer::silent();
    let gate = gate_with(&recognizer);
    let session = gate.begin("de-DE").await.unwrap();

    recognizer
        .last_sink()
        .emit(RecognitionEvent::Interim("guten".to_string()));

    let status = session.status();
    assert_eq!(status.session_id, session.id());
    assert_eq!(status.language, "de-DE");
    assert_eq!(status.state, SessionState::Listening);
    assert_eq!(status.interim_text, "guten");
    assert!(!status.ended);
}

// ============================================================================
// Synthesis
// ============================================================================

#[tokio::test]
async fn test_synthesize_empty_text_skips_provider() {
    let synthesizer = FakeSynthesizer::silent();
    let gate = SynthesisGate::new(synthesizer.clone());

    let outcome = gate.synthesize("", "en-US-DavisNeural", WAIT).await.unwrap();

    assert_eq!(outcome, SynthesisOutcome::AudioReady(Vec::new()));
    assert_eq!(synthesizer.starts(), 0);
}

#[tokio::test]
async fn test_synthesize_returns_audio_and_releases_provider() {
    let synthesizer = FakeSynthesizer::replying(SynthesisEvent::AudioReady(vec![1, 2, 3]));
    let gate = SynthesisGate::new(synthesizer.clone());

    let outcome = gate.synthesize("Hello", "en-US-DavisNeural", WAIT).await.unwrap();

    assert_eq!(outcome, SynthesisOutcome::AudioReady(vec![1, 2, 3]));
    assert_eq!(synthesizer.stops(), 1);
    assert!(gate.active().await.is_none());
}

#[tokio::test]
async fn test_synthesis_cancellation_passes_details_through() {
    let details = CancellationDetails::error("Forbidden", "quota exceeded");
    let synthesizer = FakeSynthesizer::replying(SynthesisEvent::Canceled(details.clone()));
    let gate = SynthesisGate::new(synthesizer);

    let outcome = gate.synthesize("Hello", "en-US-DavisNeural", WAIT).await.unwrap();

    assert_eq!(outcome, SynthesisOutcome::Canceled(details));
}

#[tokio::test]
async fn test_ending_synthesis_cancels_by_user() {
    let synthesizer = FakeSynthesizer::silent();
    let gate = Arc::new(SynthesisGate::new(synthesizer.clone()));

    let request = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.synthesize("A long answer", "en-US-DavisNeural", WAIT).await })
    };

    // Wait for the request to become active
    let session = loop {
        if let Some(session) = gate.active().await {
            break session;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    assert_eq!(session.text(), "A long answer");
    assert_eq!(session.voice(), "en-US-DavisNeural");

    let taken = gate.take_active().await.unwrap();
    assert_eq!(taken.id(), session.id());
    taken.end().await.unwrap();

    match request.await.unwrap().unwrap() {
        SynthesisOutcome::Canceled(details) => {
            assert_eq!(details.reason, CancellationReason::CancelledByUser)
        }
        other => panic!("expected cancellation, got {:?}", other),
    }

    // Audio arriving afterwards is ignored
    synthesizer
        .last_sink()
        .emit(SynthesisEvent::AudioReady(vec![9]));
    assert_eq!(session.gate_releases(), 1);
    assert_eq!(synthesizer.stops(), 1);
}

#[tokio::test]
async fn test_synthesis_timeout() {
    let synthesizer = FakeSynthesizer::silent();
    let gate = SynthesisGate::new(synthesizer.clone());

    let result = gate
        .synthesize("Hello", "en-US-DavisNeural", Duration::from_millis(20))
        .await;

    assert!(matches!(result, Err(GateError::Timeout(_))));
    assert_eq!(synthesizer.stops(), 1);
}
