//! Trial sessions driven end to end against the in-memory collaborators.

use std::time::Duration;

use recallkit_collaborators::mock::MockRig;
use recallkit_core::error::{CollaboratorError, SessionError};
use recallkit_core::model::{CycleKind, TrialId};
use recallkit_core::session::{SessionConfig, SessionEvent, TrialSession};
use recallkit_core::state::{CycleStage, TrialState};

const POOL: [&str; 6] = ["drum", "curtain", "bell", "coffee", "school", "parent"];

fn config(words: usize, learning_cycles: u8) -> SessionConfig {
    SessionConfig {
        words_per_list: words,
        learning_cycles,
        ..SessionConfig::default()
    }
}

fn session(rig: &MockRig, config: SessionConfig) -> TrialSession {
    TrialSession::new(TrialId::new("trial-1"), config, rig.collaborators())
}

async fn record_cycle(session: &mut TrialSession) -> TrialState {
    session.announce().await.unwrap();
    session.start_recording().await.unwrap();
    session.stop_recording().await.unwrap();
    session.finish_cycle().await.unwrap()
}

/// Intro through the last learning cycle and the interference cycle.
async fn run_to_interference_end(session: &mut TrialSession, learning_cycles: u8) -> TrialState {
    session.start().unwrap();
    session.generate_words().await.unwrap();
    for _ in 0..learning_cycles {
        record_cycle(session).await;
    }
    assert_eq!(session.state(), TrialState::AwaitingInterferenceGeneration);
    session.generate_words().await.unwrap();
    record_cycle(session).await
}

#[tokio::test]
async fn one_cycle_records_once() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));

    session.start().unwrap();
    let words = session.generate_words().await.unwrap().clone();
    assert_eq!(words.len(), 1);
    assert_eq!(
        session.state(),
        TrialState::cycle(CycleKind::Learning(1), CycleStage::Announce)
    );

    session.announce().await.unwrap();
    assert_eq!(
        session.state(),
        TrialState::cycle(CycleKind::Learning(1), CycleStage::RecordingIdle)
    );
    let request = rig.playback.last_request().unwrap();
    assert_eq!(request.words, words);
    assert_eq!(request.countdown_from, 3);

    session.start_recording().await.unwrap();
    assert!(session.is_capturing());
    session.stop_recording().await.unwrap();
    // A second stop is a no-op.
    session.stop_recording().await.unwrap();
    assert_eq!(rig.capture.stop_count(), 1);

    let next = session.finish_cycle().await.unwrap();
    assert_eq!(next, TrialState::AwaitingInterferenceGeneration);
    assert_eq!(session.cycle_counter(), 1);
    assert_eq!(session.recordings().len(), 1);
    assert_eq!(session.recordings()[0].cycle_index, 0);
    assert_eq!(rig.capture.open_captures(), 0);
}

#[tokio::test]
async fn full_trial_hands_off_once() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(2, 2));
    let mut events = session.subscribe();

    let end = run_to_interference_end(&mut session, 2).await;
    assert_eq!(end, TrialState::Complete);
    assert!(session.interference_words().iter().all(|w| !session.test_words().contains(w)));

    let report = session.completion_report().unwrap().clone();
    assert!(report.is_fully_persisted());
    assert_eq!(report.uploaded, [0, 1, 2]);

    let trial = session.trial_id().clone();
    let record = rig.store.record(&trial).unwrap();
    assert!(record.is_complete());
    assert_eq!(record.recording_count, 3);
    assert_eq!(&record.test_words, session.test_words());
    assert_eq!(&record.interference_words, session.interference_words());

    // Repeating the hand-off does not upload again.
    let again = session.hand_off().await.unwrap();
    assert_eq!(again, report);
    assert_eq!(rig.store.upload_calls(), 3);
    assert_eq!(rig.store.mark_complete_calls(), 1);

    let mut completed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::Completed(_)) {
            completed += 1;
        }
    }
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn transitions_are_recorded_in_order() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));
    run_to_interference_end(&mut session, 1).await;

    let history = session.history();
    assert_eq!(history.first().unwrap().0, TrialState::Intro);
    assert_eq!(history.last().unwrap().1, TrialState::Complete);
    for pair in history.windows(2) {
        assert_eq!(pair[0].1, pair[1].0);
    }
}

#[tokio::test(start_paused = true)]
async fn capture_stops_itself_at_the_limit() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));
    session.start().unwrap();
    session.generate_words().await.unwrap();
    session.announce().await.unwrap();

    let started = tokio::time::Instant::now();
    session.start_recording().await.unwrap();
    assert!(!session.check_capture_timeout().await.unwrap());

    assert!(session.wait_for_capture_timeout().await.unwrap());
    assert!(started.elapsed() >= Duration::from_secs(120));
    assert_eq!(
        session.state(),
        TrialState::cycle(CycleKind::Learning(1), CycleStage::Captured)
    );
    assert_eq!(rig.capture.stop_count(), 1);
    assert_eq!(rig.capture.open_captures(), 0);

    // Nothing left to time out, and a late manual stop changes nothing.
    assert!(!session.wait_for_capture_timeout().await.unwrap());
    session.stop_recording().await.unwrap();
    assert_eq!(rig.capture.stop_count(), 1);

    session.finish_cycle().await.unwrap();
    assert_eq!(session.recordings().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn time_limit_applies_without_driving_the_session() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));
    let mut events = session.subscribe();
    session.start().unwrap();
    session.generate_words().await.unwrap();
    session.announce().await.unwrap();
    session.start_recording().await.unwrap();

    // Only the clock moves; no session call until after the limit.
    tokio::time::sleep(Duration::from_secs(121)).await;
    assert_eq!(rig.capture.stop_count(), 1);
    assert_eq!(rig.capture.open_captures(), 0);
    assert!(!session.is_capturing());
    assert_eq!(
        session.state(),
        TrialState::cycle(CycleKind::Learning(1), CycleStage::Captured)
    );

    // A late stop is a no-op and the capture counts as timed out.
    session.stop_recording().await.unwrap();
    assert_eq!(rig.capture.stop_count(), 1);
    let mut timed_out = None;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::RecordingCaptured { timed_out: t, .. } = event {
            timed_out = Some(t);
        }
    }
    assert_eq!(timed_out, Some(true));

    session.finish_cycle().await.unwrap();
    assert_eq!(session.recordings().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn finish_picks_up_a_timed_out_capture() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));
    session.start().unwrap();
    session.generate_words().await.unwrap();
    session.announce().await.unwrap();
    session.start_recording().await.unwrap();

    tokio::time::sleep(Duration::from_secs(121)).await;
    let next = session.finish_cycle().await.unwrap();
    assert_eq!(next, TrialState::AwaitingInterferenceGeneration);
    assert_eq!(session.recordings().len(), 1);
    assert_eq!(rig.capture.open_captures(), 0);
}

#[tokio::test(start_paused = true)]
async fn abandoned_stop_can_still_be_cancelled() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));
    session.start().unwrap();
    session.generate_words().await.unwrap();
    session.announce().await.unwrap();
    session.start_recording().await.unwrap();

    rig.capture.set_stop_delay(Duration::from_secs(5));
    let stopped = tokio::time::timeout(Duration::from_secs(1), session.stop_recording()).await;
    assert!(stopped.is_err());
    assert!(session.is_capturing());
    assert_eq!(rig.capture.open_captures(), 1);

    session.cancel_recording().unwrap();
    assert_eq!(
        session.state(),
        TrialState::cycle(CycleKind::Learning(1), CycleStage::RecordingIdle)
    );
    assert_eq!(rig.capture.abort_count(), 1);
    assert_eq!(rig.capture.open_captures(), 0);

    // The time limit no longer applies to the cancelled capture.
    tokio::time::sleep(Duration::from_secs(200)).await;
    assert_eq!(rig.capture.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_stop_is_released_on_drop() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));
    session.start().unwrap();
    session.generate_words().await.unwrap();
    session.announce().await.unwrap();
    session.start_recording().await.unwrap();

    rig.capture.set_stop_delay(Duration::from_secs(5));
    let stopped = tokio::time::timeout(Duration::from_secs(1), session.stop_recording()).await;
    assert!(stopped.is_err());

    drop(session);
    assert_eq!(rig.capture.abort_count(), 1);
    assert_eq!(rig.capture.open_captures(), 0);
}

#[tokio::test]
async fn denied_microphone_stays_idle() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));
    session.start().unwrap();
    session.generate_words().await.unwrap();
    session.announce().await.unwrap();

    rig.capture.set_permission_denied(true);
    let err = session.start_recording().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Collaborator(CollaboratorError::PermissionDenied(_))
    ));
    assert_eq!(
        session.state(),
        TrialState::cycle(CycleKind::Learning(1), CycleStage::RecordingIdle)
    );

    rig.capture.set_permission_denied(false);
    session.start_recording().await.unwrap();
    assert!(session.is_capturing());
}

#[tokio::test]
async fn failed_stop_releases_the_device() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));
    session.start().unwrap();
    session.generate_words().await.unwrap();
    session.announce().await.unwrap();
    session.start_recording().await.unwrap();

    rig.capture.set_fail_stop(true);
    assert!(session.stop_recording().await.is_err());
    assert_eq!(
        session.state(),
        TrialState::cycle(CycleKind::Learning(1), CycleStage::RecordingIdle)
    );
    assert_eq!(rig.capture.abort_count(), 1);
    assert_eq!(rig.capture.open_captures(), 0);
    assert!(!session.is_capturing());
}

#[tokio::test]
async fn too_few_words_keeps_waiting() {
    let rig = MockRig::new(["drum"]);
    let mut session = session(&rig, config(2, 1));
    session.start().unwrap();

    let err = session.generate_words().await.unwrap_err();
    assert_eq!(
        err,
        SessionError::Collaborator(CollaboratorError::InsufficientWords {
            requested: 2,
            available: 1
        })
    );
    assert_eq!(session.state(), TrialState::AwaitingWordGeneration);
    assert!(session.test_words().is_empty());
}

#[tokio::test]
async fn interference_needs_enough_fresh_words() {
    let rig = MockRig::new(["drum", "bell", "moon"]);
    let mut session = session(&rig, config(2, 1));
    session.start().unwrap();
    session.generate_words().await.unwrap();
    record_cycle(&mut session).await;

    let err = session.generate_words().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Collaborator(CollaboratorError::InsufficientWords { .. })
    ));
    assert_eq!(session.state(), TrialState::AwaitingInterferenceGeneration);
}

#[tokio::test]
async fn interrupted_playback_can_be_replayed() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));
    session.start().unwrap();
    session.generate_words().await.unwrap();

    rig.playback.set_interrupt(true);
    let err = session.announce().await.unwrap_err();
    assert_eq!(
        err,
        SessionError::Collaborator(CollaboratorError::PlaybackInterrupted)
    );
    assert_eq!(
        session.state(),
        TrialState::cycle(CycleKind::Learning(1), CycleStage::Announce)
    );

    rig.playback.set_interrupt(false);
    session.announce().await.unwrap();
    assert_eq!(rig.playback.call_count(), 2);
}

#[tokio::test]
async fn failed_upload_is_reported_and_retried() {
    let rig = MockRig::new(POOL);
    rig.store.fail_uploads_for(1);
    let mut session = session(&rig, config(1, 2));
    let mut events = session.subscribe();

    run_to_interference_end(&mut session, 2).await;
    let report = session.completion_report().unwrap().clone();
    assert_eq!(report.uploaded, [0, 2]);
    assert_eq!(report.failed_uploads.len(), 1);
    assert_eq!(report.failed_uploads[0].cycle_index, 1);
    assert!(!report.marked_complete);
    assert!(report.lists_saved);

    let trial = session.trial_id().clone();
    assert!(!rig.store.record(&trial).unwrap().is_complete());

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::UploadFailed(failed) = event {
            assert_eq!(failed.cycle_index, 1);
            saw_failure = true;
        }
    }
    assert!(saw_failure);

    rig.store.clear_upload_failures();
    let retried = session.retry_failed_uploads().await.unwrap();
    assert!(retried.is_fully_persisted());
    assert_eq!(retried.uploaded, [0, 1, 2]);
    assert!(rig.store.uploaded(&trial, 1).is_some());
    assert!(rig.store.record(&trial).unwrap().is_complete());
}

#[tokio::test(start_paused = true)]
async fn delayed_recall_waits_out_the_delay() {
    let rig = MockRig::new(POOL);
    let config = SessionConfig {
        delayed_recall: Some(Duration::from_secs(600)),
        ..config(1, 1)
    };
    let mut session = session(&rig, config);

    let state = run_to_interference_end(&mut session, 1).await;
    assert_eq!(state, TrialState::DelayPeriod);
    assert!(session.completion_report().is_none());

    assert_eq!(
        session.continue_after_delay().unwrap_err(),
        SessionError::DelayNotElapsed {
            remaining_secs: 600
        }
    );
    tokio::time::advance(Duration::from_millis(599_500)).await;
    assert_eq!(
        session.continue_after_delay().unwrap_err(),
        SessionError::DelayNotElapsed { remaining_secs: 1 }
    );
    tokio::time::advance(Duration::from_secs(1)).await;
    session.continue_after_delay().unwrap();
    assert_eq!(
        session.state(),
        TrialState::cycle(CycleKind::DelayedRecall, CycleStage::RecordingIdle)
    );

    session.start_recording().await.unwrap();
    session.stop_recording().await.unwrap();
    assert_eq!(session.finish_cycle().await.unwrap(), TrialState::Complete);
    assert_eq!(session.recordings().len(), 3);
    assert_eq!(session.recordings()[2].kind, CycleKind::DelayedRecall);
    assert_eq!(session.recordings()[2].cycle_index, 2);
}

#[tokio::test]
async fn cancel_discards_the_capture() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));
    session.start().unwrap();
    session.generate_words().await.unwrap();
    session.announce().await.unwrap();
    session.start_recording().await.unwrap();

    session.cancel_recording().unwrap();
    assert_eq!(
        session.state(),
        TrialState::cycle(CycleKind::Learning(1), CycleStage::RecordingIdle)
    );
    assert_eq!(rig.capture.abort_count(), 1);
    assert_eq!(rig.capture.open_captures(), 0);
    assert!(session.recordings().is_empty());
}

#[tokio::test]
async fn dropping_a_capturing_session_aborts() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));
    session.start().unwrap();
    session.generate_words().await.unwrap();
    session.announce().await.unwrap();
    session.start_recording().await.unwrap();
    assert_eq!(rig.capture.open_captures(), 1);

    drop(session);
    assert_eq!(rig.capture.abort_count(), 1);
    assert_eq!(rig.capture.open_captures(), 0);
}

#[tokio::test]
async fn actions_out_of_order_are_rejected() {
    let rig = MockRig::new(POOL);
    let mut session = session(&rig, config(1, 1));

    assert!(matches!(
        session.stop_recording().await,
        Err(SessionError::InvalidAction { state: TrialState::Intro, .. })
    ));
    assert!(matches!(
        session.generate_words().await,
        Err(SessionError::InvalidAction { .. })
    ));
    assert!(matches!(
        session.hand_off().await,
        Err(SessionError::InvalidAction { .. })
    ));
    session.start().unwrap();
    assert!(session.start().is_err());
    assert_eq!(session.state(), TrialState::AwaitingWordGeneration);
    assert_eq!(rig.words.call_count(), 0);
}
