//! Trial session driver.
//!
//! One `TrialSession` per administered trial. Every public action checks the
//! current state, awaits at most one collaborator call, and moves through
//! the transition table in [`crate::state`]. Collaborator failures leave the
//! state where it was and are returned to the caller.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{CollaboratorError, SessionError};
use crate::model::{CycleKind, CycleLayout, TrialId, WordList};
use crate::state::{CycleStage, TrialState};
use crate::traits::{
    AnnounceRequest, AudioCapture, CaptureHandle, Playback, PlaybackEvent, RecordingBlob,
    RecordingStore, ResultSink, WordSource,
};

/// Session parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub words_per_list: usize,
    pub learning_cycles: u8,
    pub countdown_from: u32,
    pub inter_word_delay: Duration,
    /// Captures are stopped automatically after this long.
    pub max_recording: Duration,
    /// Wait before delayed recall. `None` skips the phase.
    pub delayed_recall: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            words_per_list: 10,
            learning_cycles: 4,
            countdown_from: 3,
            inter_word_delay: Duration::from_secs(1),
            max_recording: Duration::from_secs(120),
            delayed_recall: None,
        }
    }
}

/// The collaborators one session talks to.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub words: Arc<dyn WordSource>,
    pub playback: Arc<dyn Playback>,
    pub capture: Arc<dyn AudioCapture>,
    pub recordings: Arc<dyn RecordingStore>,
    pub results: Arc<dyn ResultSink>,
}

/// A finished cycle's audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRecording {
    pub cycle_index: u32,
    pub kind: CycleKind,
    pub blob: RecordingBlob,
}

/// A recording the store refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUpload {
    pub cycle_index: u32,
    pub message: String,
}

/// Outcome of handing a completed trial to persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub uploaded: Vec<u32>,
    pub failed_uploads: Vec<FailedUpload>,
    pub marked_complete: bool,
    pub lists_saved: bool,
    /// Failures of the completion record or the list save.
    pub errors: Vec<String>,
}

impl CompletionReport {
    /// Every recording uploaded, trial marked complete and lists saved.
    pub fn is_fully_persisted(&self) -> bool {
        self.failed_uploads.is_empty() && self.marked_complete && self.lists_saved
    }
}

/// Broadcast to subscribers as the session moves.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: TrialState,
        to: TrialState,
    },
    RecordingCaptured {
        cycle_index: u32,
        bytes: usize,
        timed_out: bool,
    },
    UploadFailed(FailedUpload),
    Completed(CompletionReport),
}

const UNCLAIMED: u8 = 0;
const BY_SESSION: u8 = 1;
const BY_TIMER: u8 = 2;

type StopOutcome = Result<RecordingBlob, CollaboratorError>;

/// A running capture and the task that stops it at the time limit.
///
/// Whoever claims the capture first (a session action or the timer) is the
/// one that stops or aborts it.
struct ActiveCapture {
    handle: CaptureHandle,
    deadline: Instant,
    owner: Arc<AtomicU8>,
    timer_outcome: Arc<Mutex<Option<StopOutcome>>>,
    timer: JoinHandle<()>,
}

impl ActiveCapture {
    fn spawn(
        trial: TrialId,
        handle: CaptureHandle,
        deadline: Instant,
        capture: Arc<dyn AudioCapture>,
    ) -> Self {
        let owner = Arc::new(AtomicU8::new(UNCLAIMED));
        let timer_outcome = Arc::new(Mutex::new(None));
        let timer = tokio::spawn({
            let owner = owner.clone();
            let timer_outcome = timer_outcome.clone();
            async move {
                tokio::time::sleep_until(deadline).await;
                if owner
                    .compare_exchange(UNCLAIMED, BY_TIMER, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return;
                }
                tracing::info!(%trial, "recording time limit reached");
                let outcome = capture.stop(handle).await;
                if let Err(e) = &outcome {
                    tracing::warn!(%trial, "capture stop failed: {e}");
                    capture.abort(handle);
                }
                if let Ok(mut slot) = timer_outcome.lock() {
                    *slot = Some(outcome);
                }
            }
        });
        Self {
            handle,
            deadline,
            owner,
            timer_outcome,
            timer,
        }
    }

    /// Take the capture over from the timer. False if the timer got there
    /// first.
    fn claim(&self) -> bool {
        match self.owner.compare_exchange(
            UNCLAIMED,
            BY_SESSION,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.timer.abort();
                true
            }
            Err(current) => current == BY_SESSION,
        }
    }

    fn claimed_by_timer(&self) -> bool {
        self.owner.load(Ordering::Acquire) == BY_TIMER
    }

    /// `Some(stopped_ok)` once the timer has finished stopping the capture.
    fn timer_result(&self) -> Option<bool> {
        if !self.claimed_by_timer() {
            return None;
        }
        let slot = self.timer_outcome.lock().ok()?;
        slot.as_ref().map(Result::is_ok)
    }

    fn take_timer_outcome(&self) -> Option<StopOutcome> {
        if !self.claimed_by_timer() {
            return None;
        }
        self.timer_outcome.lock().ok()?.take()
    }

    /// Wait for the timer task. Returns at once if it was aborted or has
    /// already finished.
    async fn join_timer(&mut self) {
        if self.timer.is_finished() {
            return;
        }
        if let Err(e) = (&mut self.timer).await {
            if !e.is_cancelled() {
                tracing::error!("capture timer failed: {e}");
            }
        }
    }

    /// Release the device unless the timer is already stopping it.
    fn release(&self, capture: &dyn AudioCapture) -> bool {
        if self.claim() {
            capture.abort(self.handle);
            true
        } else {
            false
        }
    }
}

/// Drives one trial from intro to completion.
pub struct TrialSession {
    trial_id: TrialId,
    config: SessionConfig,
    collab: SessionCollaborators,
    state: TrialState,
    history: Vec<(TrialState, TrialState)>,
    test_words: WordList,
    interference_words: WordList,
    recordings: Vec<CycleRecording>,
    cycle_counter: u32,
    capture: Option<ActiveCapture>,
    captured: Option<RecordingBlob>,
    delay_started: Option<Instant>,
    completion: Option<CompletionReport>,
    events: broadcast::Sender<SessionEvent>,
}

impl TrialSession {
    pub fn new(trial_id: TrialId, mut config: SessionConfig, collab: SessionCollaborators) -> Self {
        config.learning_cycles = config.learning_cycles.max(1);
        let (events, _) = broadcast::channel(64);
        Self {
            trial_id,
            config,
            collab,
            state: TrialState::Intro,
            history: Vec::new(),
            test_words: WordList::default(),
            interference_words: WordList::default(),
            recordings: Vec::new(),
            cycle_counter: 0,
            capture: None,
            captured: None,
            delay_started: None,
            completion: None,
            events,
        }
    }

    pub fn trial_id(&self) -> &TrialId {
        &self.trial_id
    }

    /// Current state. A capture the time limit has already stopped shows
    /// as `Recording(captured)` here; the transition itself is recorded by
    /// the next action.
    pub fn state(&self) -> TrialState {
        match (&self.capture, self.state) {
            (
                Some(active),
                TrialState::Cycle {
                    kind,
                    stage: CycleStage::Capturing,
                },
            ) => match active.timer_result() {
                Some(true) => TrialState::cycle(kind, CycleStage::Captured),
                Some(false) => TrialState::cycle(kind, CycleStage::RecordingIdle),
                None => self.state,
            },
            (_, state) => state,
        }
    }

    /// Every transition taken so far, oldest first.
    pub fn history(&self) -> &[(TrialState, TrialState)] {
        &self.history
    }

    pub fn test_words(&self) -> &WordList {
        &self.test_words
    }

    pub fn interference_words(&self) -> &WordList {
        &self.interference_words
    }

    /// Recordings of finished cycles, in cycle order.
    pub fn recordings(&self) -> &[CycleRecording] {
        &self.recordings
    }

    /// Number of finished cycles.
    pub fn cycle_counter(&self) -> u32 {
        self.cycle_counter
    }

    pub fn layout(&self) -> CycleLayout {
        CycleLayout::new(self.config.learning_cycles)
    }

    pub fn is_capturing(&self) -> bool {
        self.capture
            .as_ref()
            .is_some_and(|active| active.timer_result().is_none())
    }

    pub fn completion_report(&self) -> Option<&CompletionReport> {
        self.completion.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    pub fn start(&mut self) -> Result<(), SessionError> {
        self.require("start", |s| matches!(s, TrialState::Intro))?;
        self.transition_to(TrialState::AwaitingWordGeneration)
    }

    /// Generate the target list, or the interference list once the learning
    /// cycles are done. The interference list never repeats a target word.
    pub async fn generate_words(&mut self) -> Result<&WordList, SessionError> {
        self.require("generate words", |s| {
            matches!(
                s,
                TrialState::AwaitingWordGeneration | TrialState::AwaitingInterferenceGeneration
            )
        })?;
        let interference = self.state == TrialState::AwaitingInterferenceGeneration;
        let excluding = if interference {
            self.test_words.clone()
        } else {
            WordList::default()
        };

        let words = self
            .collab
            .words
            .generate(self.config.words_per_list, &excluding)
            .await
            .inspect_err(|e| {
                tracing::warn!(trial = %self.trial_id, source = self.collab.words.name(), "word generation failed: {e}");
            })?;
        if words.is_empty() {
            return Err(SessionError::EmptyWordList);
        }
        tracing::debug!(trial = %self.trial_id, count = words.len(), interference, "words generated");

        if interference {
            self.interference_words = words;
            self.transition_to(TrialState::cycle(CycleKind::Interference, CycleStage::Announce))?;
            Ok(&self.interference_words)
        } else {
            self.test_words = words;
            self.transition_to(TrialState::cycle(CycleKind::Learning(1), CycleStage::Announce))?;
            Ok(&self.test_words)
        }
    }

    /// Play the countdown and the cycle's words, ending in `Recording(idle)`.
    ///
    /// If playback stops before finishing, the cycle goes back to
    /// `Listening(announce)` and `PlaybackInterrupted` is returned.
    pub async fn announce(&mut self) -> Result<(), SessionError> {
        let kind = self.require_stage("announce", CycleStage::Announce)?;
        let words = match kind {
            CycleKind::Interference => self.interference_words.clone(),
            _ => self.test_words.clone(),
        };
        let request = AnnounceRequest {
            words,
            countdown_from: self.config.countdown_from,
            inter_word_delay: self.config.inter_word_delay,
        };

        let mut rx = self.collab.playback.announce(&request).await?;
        while let Some(event) = rx.recv().await {
            match event {
                PlaybackEvent::Started => {
                    if self.state.stage() == Some(CycleStage::Announce) {
                        self.transition_to(TrialState::cycle(kind, CycleStage::Playing))?;
                    }
                }
                PlaybackEvent::Finished => {
                    if self.state.stage() == Some(CycleStage::Announce) {
                        self.transition_to(TrialState::cycle(kind, CycleStage::Playing))?;
                    }
                    return self.transition_to(TrialState::cycle(kind, CycleStage::RecordingIdle));
                }
            }
        }

        tracing::warn!(trial = %self.trial_id, %kind, "playback ended early");
        if self.state.stage() == Some(CycleStage::Playing) {
            self.transition_to(TrialState::cycle(kind, CycleStage::Announce))?;
        }
        Err(CollaboratorError::PlaybackInterrupted.into())
    }

    /// Start capturing. On `PermissionDenied` or `DeviceUnavailable` the
    /// cycle stays in `Recording(idle)`.
    ///
    /// The capture is stopped by a background timer once `max_recording`
    /// has passed, whether or not the session is driven in the meantime.
    pub async fn start_recording(&mut self) -> Result<(), SessionError> {
        let kind = self.require_stage("start recording", CycleStage::RecordingIdle)?;
        let handle = self.collab.capture.start().await.inspect_err(|e| {
            tracing::warn!(trial = %self.trial_id, "capture did not start: {e}");
        })?;
        self.capture = Some(ActiveCapture::spawn(
            self.trial_id.clone(),
            handle,
            Instant::now() + self.config.max_recording,
            self.collab.capture.clone(),
        ));
        self.transition_to(TrialState::cycle(kind, CycleStage::Capturing))
    }

    /// Stop capturing. Stopping an already captured cycle does nothing.
    pub async fn stop_recording(&mut self) -> Result<(), SessionError> {
        self.check_capture_timeout().await?;
        if self.state.stage() == Some(CycleStage::Captured) {
            tracing::debug!(trial = %self.trial_id, "stop ignored, already captured");
            return Ok(());
        }
        self.finish_capture().await
    }

    /// Record a capture the time limit has stopped. Waits for the timer if
    /// the limit has passed but its stop is still in flight. Returns whether
    /// a timed-out capture was recorded.
    pub async fn check_capture_timeout(&mut self) -> Result<bool, SessionError> {
        if let Some(active) = self.capture.as_mut() {
            if Instant::now() >= active.deadline {
                active.join_timer().await;
            }
        }
        self.absorb_timed_out_capture()
    }

    /// Wait for the time limit to stop the capture and record it. Returns
    /// immediately with `false` when nothing is being captured or the
    /// capture is already being stopped by an action.
    pub async fn wait_for_capture_timeout(&mut self) -> Result<bool, SessionError> {
        match self.capture.as_mut() {
            Some(active) if active.owner.load(Ordering::Acquire) != BY_SESSION => {
                active.join_timer().await;
            }
            _ => return Ok(false),
        }
        self.absorb_timed_out_capture()
    }

    /// Discard the running capture and return to `Recording(idle)`.
    pub fn cancel_recording(&mut self) -> Result<(), SessionError> {
        self.absorb_timed_out_capture()?;
        let kind = self.require_stage("cancel recording", CycleStage::Capturing)?;
        if let Some(active) = self.capture.take() {
            active.release(self.collab.capture.as_ref());
        }
        self.transition_to(TrialState::cycle(kind, CycleStage::RecordingIdle))
    }

    /// Keep the captured audio and move on to the next phase. Entering
    /// `Complete` hands everything to persistence.
    pub async fn finish_cycle(&mut self) -> Result<TrialState, SessionError> {
        self.absorb_timed_out_capture()?;
        let kind = self.require_stage("finish cycle", CycleStage::Captured)?;
        let next = self.next_after(kind);
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        let Some(blob) = self.captured.take() else {
            return Err(SessionError::InvalidAction {
                action: "finish cycle",
                state: self.state,
            });
        };
        self.recordings.push(CycleRecording {
            cycle_index: self.cycle_counter,
            kind,
            blob,
        });
        self.cycle_counter += 1;
        self.transition_to(next)?;

        match next {
            TrialState::DelayPeriod => self.delay_started = Some(Instant::now()),
            TrialState::Complete => {
                self.hand_off().await?;
            }
            _ => {}
        }
        Ok(self.state)
    }

    /// Leave the delay period once it has elapsed.
    pub fn continue_after_delay(&mut self) -> Result<(), SessionError> {
        self.require("continue after delay", |s| matches!(s, TrialState::DelayPeriod))?;
        let delay = self.config.delayed_recall.unwrap_or_default();
        let elapsed = self
            .delay_started
            .map(|t| t.elapsed())
            .unwrap_or(Duration::MAX);
        if elapsed < delay {
            let remaining = delay - elapsed;
            return Err(SessionError::DelayNotElapsed {
                remaining_secs: remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0),
            });
        }
        self.transition_to(TrialState::cycle(
            CycleKind::DelayedRecall,
            CycleStage::RecordingIdle,
        ))
    }

    /// Hand the trial to persistence. Runs once; later calls return the
    /// first report.
    pub async fn hand_off(&mut self) -> Result<CompletionReport, SessionError> {
        self.require("hand off", |s| matches!(s, TrialState::Complete))?;
        if let Some(report) = &self.completion {
            return Ok(report.clone());
        }

        let mut report = CompletionReport::default();
        for recording in &self.recordings {
            match self
                .collab
                .recordings
                .upload_recording(&self.trial_id, recording.cycle_index, &recording.blob)
                .await
            {
                Ok(()) => report.uploaded.push(recording.cycle_index),
                Err(e) => {
                    let failed = FailedUpload {
                        cycle_index: recording.cycle_index,
                        message: e.to_string(),
                    };
                    tracing::error!(trial = %self.trial_id, cycle = recording.cycle_index, "upload failed: {e}");
                    // no subscribers is fine
                    let _ = self.events.send(SessionEvent::UploadFailed(failed.clone()));
                    report.failed_uploads.push(failed);
                }
            }
        }
        self.persist_records(&mut report).await;

        tracing::info!(
            trial = %self.trial_id,
            uploaded = report.uploaded.len(),
            failed = report.failed_uploads.len(),
            "trial handed off"
        );
        self.completion = Some(report.clone());
        let _ = self.events.send(SessionEvent::Completed(report.clone()));
        Ok(report)
    }

    /// Re-attempt the uploads that failed during hand-off, then whatever
    /// completion steps are still outstanding.
    pub async fn retry_failed_uploads(&mut self) -> Result<CompletionReport, SessionError> {
        self.require("retry uploads", |s| matches!(s, TrialState::Complete))?;
        let Some(mut report) = self.completion.take() else {
            return self.hand_off().await;
        };

        let mut still_failed = Vec::new();
        for failed in std::mem::take(&mut report.failed_uploads) {
            let Some(recording) = self
                .recordings
                .iter()
                .find(|r| r.cycle_index == failed.cycle_index)
            else {
                continue;
            };
            match self
                .collab
                .recordings
                .upload_recording(&self.trial_id, recording.cycle_index, &recording.blob)
                .await
            {
                Ok(()) => {
                    tracing::info!(trial = %self.trial_id, cycle = failed.cycle_index, "upload retried");
                    report.uploaded.push(failed.cycle_index);
                }
                Err(e) => still_failed.push(FailedUpload {
                    cycle_index: failed.cycle_index,
                    message: e.to_string(),
                }),
            }
        }
        report.uploaded.sort_unstable();
        report.failed_uploads = still_failed;
        report.errors.clear();
        self.persist_records(&mut report).await;

        self.completion = Some(report.clone());
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Marks the trial complete only once every recording is stored; the
    /// word lists are saved regardless so they are never lost.
    async fn persist_records(&self, report: &mut CompletionReport) {
        if report.failed_uploads.is_empty() && !report.marked_complete {
            match self.collab.recordings.mark_complete(&self.trial_id).await {
                Ok(()) => report.marked_complete = true,
                Err(e) => {
                    tracing::error!(trial = %self.trial_id, "mark complete failed: {e}");
                    report.errors.push(e.to_string());
                }
            }
        }
        if !report.lists_saved {
            match self
                .collab
                .results
                .save_trial_lists(&self.trial_id, &self.test_words, &self.interference_words)
                .await
            {
                Ok(()) => report.lists_saved = true,
                Err(e) => {
                    tracing::error!(trial = %self.trial_id, "saving word lists failed: {e}");
                    report.errors.push(e.to_string());
                }
            }
        }
    }

    /// Stop the capture from a user action. The handle stays with the
    /// session until `stop` resolves, so a dropped call can still be
    /// cancelled or aborted.
    async fn finish_capture(&mut self) -> Result<(), SessionError> {
        let kind = self.require_stage("stop recording", CycleStage::Capturing)?;
        let Some(active) = self.capture.as_mut() else {
            return Err(SessionError::InvalidAction {
                action: "stop recording",
                state: self.state,
            });
        };
        if !active.claim() {
            active.join_timer().await;
            self.absorb_timed_out_capture()?;
            return Ok(());
        }

        let handle = active.handle;
        let outcome = self.collab.capture.stop(handle).await;
        self.capture = None;
        if outcome.is_err() {
            // The device must not stay open even if stop failed.
            self.collab.capture.abort(handle);
        }
        self.record_stop(kind, outcome, false)
    }

    /// Fold a capture the timer has stopped into the session state.
    fn absorb_timed_out_capture(&mut self) -> Result<bool, SessionError> {
        let Some(outcome) = self
            .capture
            .as_ref()
            .and_then(ActiveCapture::take_timer_outcome)
        else {
            return Ok(false);
        };
        self.capture = None;
        let kind = self.require_stage("stop recording", CycleStage::Capturing)?;
        self.record_stop(kind, outcome, true).map(|()| true)
    }

    fn record_stop(
        &mut self,
        kind: CycleKind,
        outcome: StopOutcome,
        timed_out: bool,
    ) -> Result<(), SessionError> {
        match outcome {
            Ok(blob) => {
                let bytes = blob.len();
                self.captured = Some(blob);
                self.transition_to(TrialState::cycle(kind, CycleStage::Captured))?;
                let _ = self.events.send(SessionEvent::RecordingCaptured {
                    cycle_index: self.cycle_counter,
                    bytes,
                    timed_out,
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(trial = %self.trial_id, timed_out, "capture stop failed: {e}");
                self.transition_to(TrialState::cycle(kind, CycleStage::RecordingIdle))?;
                Err(e.into())
            }
        }
    }

    fn next_after(&self, kind: CycleKind) -> TrialState {
        match kind {
            CycleKind::Learning(n) if n < self.config.learning_cycles => {
                TrialState::cycle(CycleKind::Learning(n + 1), CycleStage::Announce)
            }
            CycleKind::Learning(_) => TrialState::AwaitingInterferenceGeneration,
            CycleKind::Interference if self.config.delayed_recall.is_some() => {
                TrialState::DelayPeriod
            }
            CycleKind::Interference | CycleKind::DelayedRecall => TrialState::Complete,
        }
    }

    fn require(
        &self,
        action: &'static str,
        allowed: impl Fn(&TrialState) -> bool,
    ) -> Result<(), SessionError> {
        if allowed(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidAction {
                action,
                state: self.state,
            })
        }
    }

    fn require_stage(
        &self,
        action: &'static str,
        stage: CycleStage,
    ) -> Result<CycleKind, SessionError> {
        match self.state {
            TrialState::Cycle { kind, stage: s } if s == stage => Ok(kind),
            state => Err(SessionError::InvalidAction { action, state }),
        }
    }

    fn transition_to(&mut self, target: TrialState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(target) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        let from = self.state;
        self.state = target;
        self.history.push((from, target));
        tracing::info!(trial = %self.trial_id, %from, to = %target, "state changed");
        let _ = self.events.send(SessionEvent::StateChanged { from, to: target });
        Ok(())
    }
}

impl Drop for TrialSession {
    fn drop(&mut self) {
        if let Some(active) = self.capture.take() {
            if active.release(self.collab.capture.as_ref()) {
                tracing::warn!(trial = %self.trial_id, "session dropped while capturing, aborted");
            }
        }
    }
}
