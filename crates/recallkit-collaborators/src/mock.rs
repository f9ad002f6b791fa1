//! In-memory collaborators for tests and dry runs.
//!
//! Every mock counts its calls and can be told to fail, so a trial session
//! or the scoring service can be driven end to end without devices or a
//! data directory.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use recallkit_core::audio::AudioSessionController;
use recallkit_core::error::CollaboratorError;
use recallkit_core::model::{TranscribedWord, TrialId, TrialRecord, TrialStatus, WordList};
use recallkit_core::report::TrialScore;
use recallkit_core::session::SessionCollaborators;
use recallkit_core::traits::{
    AnnounceRequest, AudioCapture, CaptureHandle, Playback, PlaybackEvent, RecordingBlob,
    RecordingStore, ResultSink, Transcriber, WordSource,
};

// ---------------------------------------------------------------------------
// Word source
// ---------------------------------------------------------------------------

/// Hands out words from a fixed pool in order, skipping excluded ones.
pub struct MockWordSource {
    pool: Vec<String>,
    call_count: AtomicU32,
}

impl MockWordSource {
    pub fn new<S: Into<String>>(pool: impl IntoIterator<Item = S>) -> Self {
        Self {
            pool: pool.into_iter().map(Into::into).collect(),
            call_count: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WordSource for MockWordSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        count: usize,
        excluding: &WordList,
    ) -> Result<WordList, CollaboratorError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        let eligible: Vec<&String> = self
            .pool
            .iter()
            .filter(|w| !excluding.contains(w))
            .collect();
        if eligible.len() < count {
            return Err(CollaboratorError::InsufficientWords {
                requested: count,
                available: eligible.len(),
            });
        }
        Ok(eligible.into_iter().take(count).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Reports `Started` then `Finished` immediately, or stops after `Started`
/// when interrupted.
#[derive(Default)]
pub struct MockPlayback {
    interrupt: AtomicBool,
    call_count: AtomicU32,
    audio: Option<AudioSessionController>,
    gains: Mutex<Vec<f32>>,
    last_request: Mutex<Option<AnnounceRequest>>,
}

impl MockPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the controller's effective gain at each announcement.
    pub fn with_audio(audio: AudioSessionController) -> Self {
        Self {
            audio: Some(audio),
            ..Self::default()
        }
    }

    /// Make subsequent announcements end before `Finished`.
    pub fn set_interrupt(&self, interrupt: bool) {
        self.interrupt.store(interrupt, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Gain applied to each announcement so far.
    pub fn gains(&self) -> Vec<f32> {
        self.gains.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<AnnounceRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Playback for MockPlayback {
    async fn announce(
        &self,
        request: &AnnounceRequest,
    ) -> Result<mpsc::Receiver<PlaybackEvent>, CollaboratorError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if let Some(audio) = &self.audio {
            let gain = audio.level().await.effective_gain();
            self.gains.lock().unwrap().push(gain);
        }

        let (tx, rx) = mpsc::channel(2);
        // Capacity covers both events, so these never fail.
        let _ = tx.try_send(PlaybackEvent::Started);
        if !self.interrupt.load(Ordering::Relaxed) {
            let _ = tx.try_send(PlaybackEvent::Finished);
        }
        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Audio capture
// ---------------------------------------------------------------------------

/// Fake microphone. Each stopped capture yields a small WAV-tagged blob.
#[derive(Default)]
pub struct MockCapture {
    deny: AtomicBool,
    fail_stop: AtomicBool,
    stop_delay_ms: AtomicU64,
    next_handle: AtomicU64,
    open: Mutex<HashSet<u64>>,
    starts: AtomicU32,
    stops: AtomicU32,
    aborts: AtomicU32,
}

impl MockCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse microphone access from now on.
    pub fn set_permission_denied(&self, deny: bool) {
        self.deny.store(deny, Ordering::Relaxed);
    }

    /// Make `stop` fail with `DeviceUnavailable`.
    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::Relaxed);
    }

    /// Make `stop` take this long before it releases the device.
    pub fn set_stop_delay(&self, delay: Duration) {
        self.stop_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::Relaxed)
    }

    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::Relaxed)
    }

    pub fn abort_count(&self) -> u32 {
        self.aborts.load(Ordering::Relaxed)
    }

    /// Captures started and neither stopped nor aborted.
    pub fn open_captures(&self) -> usize {
        self.open.lock().unwrap().len()
    }
}

#[async_trait]
impl AudioCapture for MockCapture {
    async fn start(&self) -> Result<CaptureHandle, CollaboratorError> {
        if self.deny.load(Ordering::Relaxed) {
            return Err(CollaboratorError::PermissionDenied(
                "microphone access refused".into(),
            ));
        }
        self.starts.fetch_add(1, Ordering::Relaxed);
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.open.lock().unwrap().insert(id);
        Ok(CaptureHandle(id))
    }

    async fn stop(&self, handle: CaptureHandle) -> Result<RecordingBlob, CollaboratorError> {
        self.stops.fetch_add(1, Ordering::Relaxed);
        let delay = self.stop_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_stop.load(Ordering::Relaxed) {
            return Err(CollaboratorError::DeviceUnavailable(
                "capture device lost".into(),
            ));
        }
        if !self.open.lock().unwrap().remove(&handle.0) {
            return Err(CollaboratorError::DeviceUnavailable(format!(
                "no capture with handle {}",
                handle.0
            )));
        }
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&handle.0.to_le_bytes());
        Ok(RecordingBlob::wav(bytes))
    }

    fn abort(&self, handle: CaptureHandle) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
        self.open.lock().unwrap().remove(&handle.0);
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory recording store, transcription source and result sink.
#[derive(Default)]
pub struct MockStore {
    records: Mutex<HashMap<TrialId, TrialRecord>>,
    uploads: Mutex<HashMap<(TrialId, u32), RecordingBlob>>,
    failing_cycles: Mutex<HashSet<u32>>,
    transcriptions: Mutex<HashMap<TrialId, Vec<TranscribedWord>>>,
    not_ready_polls: AtomicU32,
    scores: Mutex<HashMap<TrialId, TrialScore>>,
    upload_calls: AtomicU32,
    mark_complete_calls: AtomicU32,
    transcribe_calls: AtomicU32,
    score_saves: AtomicU32,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_trial(&self, record: TrialRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.trial_id.clone(), record);
    }

    pub fn set_transcription(&self, trial: &TrialId, words: Vec<TranscribedWord>) {
        self.transcriptions
            .lock()
            .unwrap()
            .insert(trial.clone(), words);
    }

    /// Uploads for `cycle_index` fail until cleared.
    pub fn fail_uploads_for(&self, cycle_index: u32) {
        self.failing_cycles.lock().unwrap().insert(cycle_index);
    }

    pub fn clear_upload_failures(&self) {
        self.failing_cycles.lock().unwrap().clear();
    }

    /// The next `polls` transcription requests answer `NotReady`.
    pub fn not_ready_for(&self, polls: u32) {
        self.not_ready_polls.store(polls, Ordering::Relaxed);
    }

    pub fn uploaded(&self, trial: &TrialId, cycle_index: u32) -> Option<RecordingBlob> {
        self.uploads
            .lock()
            .unwrap()
            .get(&(trial.clone(), cycle_index))
            .cloned()
    }

    pub fn record(&self, trial: &TrialId) -> Option<TrialRecord> {
        self.records.lock().unwrap().get(trial).cloned()
    }

    pub fn score(&self, trial: &TrialId) -> Option<TrialScore> {
        self.scores.lock().unwrap().get(trial).cloned()
    }

    pub fn upload_calls(&self) -> u32 {
        self.upload_calls.load(Ordering::Relaxed)
    }

    pub fn mark_complete_calls(&self) -> u32 {
        self.mark_complete_calls.load(Ordering::Relaxed)
    }

    pub fn transcribe_calls(&self) -> u32 {
        self.transcribe_calls.load(Ordering::Relaxed)
    }

    pub fn score_saves(&self) -> u32 {
        self.score_saves.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecordingStore for MockStore {
    async fn upload_recording(
        &self,
        trial: &TrialId,
        cycle_index: u32,
        blob: &RecordingBlob,
    ) -> Result<(), CollaboratorError> {
        self.upload_calls.fetch_add(1, Ordering::Relaxed);
        if self.failing_cycles.lock().unwrap().contains(&cycle_index) {
            return Err(CollaboratorError::UploadFailure {
                cycle_index,
                message: "store unavailable".into(),
            });
        }
        self.uploads
            .lock()
            .unwrap()
            .insert((trial.clone(), cycle_index), blob.clone());
        Ok(())
    }

    async fn mark_complete(&self, trial: &TrialId) -> Result<(), CollaboratorError> {
        self.mark_complete_calls.fetch_add(1, Ordering::Relaxed);
        let recording_count = self
            .uploads
            .lock()
            .unwrap()
            .keys()
            .filter(|(id, _)| id == trial)
            .count() as u32;
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(trial.clone())
            .or_insert_with(|| TrialRecord::new(trial.clone()));
        record.status = TrialStatus::Complete;
        record.completed_at = Some(chrono::Utc::now());
        record.recording_count = recording_count;
        Ok(())
    }
}

#[async_trait]
impl Transcriber for MockStore {
    async fn transcribe(&self, trial: &TrialId) -> Result<Vec<TranscribedWord>, CollaboratorError> {
        self.transcribe_calls.fetch_add(1, Ordering::Relaxed);
        let pending = self.not_ready_polls.load(Ordering::Relaxed);
        if pending > 0 {
            self.not_ready_polls.store(pending - 1, Ordering::Relaxed);
            return Err(CollaboratorError::NotReady(trial.to_string()));
        }
        self.transcriptions
            .lock()
            .unwrap()
            .get(trial)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotReady(trial.to_string()))
    }
}

#[async_trait]
impl ResultSink for MockStore {
    async fn save_trial_lists(
        &self,
        trial: &TrialId,
        test_words: &WordList,
        interference_words: &WordList,
    ) -> Result<(), CollaboratorError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(trial.clone())
            .or_insert_with(|| TrialRecord::new(trial.clone()));
        record.test_words = test_words.clone();
        record.interference_words = interference_words.clone();
        Ok(())
    }

    async fn get_trial_record(&self, trial: &TrialId) -> Result<TrialRecord, CollaboratorError> {
        self.record(trial)
            .ok_or_else(|| CollaboratorError::NotFound(trial.to_string()))
    }

    async fn list_trials(&self) -> Result<Vec<TrialId>, CollaboratorError> {
        let mut trials: Vec<TrialId> = self.records.lock().unwrap().keys().cloned().collect();
        trials.sort();
        Ok(trials)
    }

    async fn save_score_summary(
        &self,
        trial: &TrialId,
        score: &TrialScore,
    ) -> Result<(), CollaboratorError> {
        self.score_saves.fetch_add(1, Ordering::Relaxed);
        self.scores
            .lock()
            .unwrap()
            .insert(trial.clone(), score.clone());
        Ok(())
    }

    async fn get_score_summary(&self, trial: &TrialId) -> Result<TrialScore, CollaboratorError> {
        self.score(trial)
            .ok_or_else(|| CollaboratorError::NotFound(trial.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// One of each mock, shared with the session that uses them.
#[derive(Clone)]
pub struct MockRig {
    pub words: Arc<MockWordSource>,
    pub playback: Arc<MockPlayback>,
    pub capture: Arc<MockCapture>,
    pub store: Arc<MockStore>,
}

impl MockRig {
    pub fn new<S: Into<String>>(pool: impl IntoIterator<Item = S>) -> Self {
        Self::with_playback(pool, MockPlayback::new())
    }

    pub fn with_playback<S: Into<String>>(
        pool: impl IntoIterator<Item = S>,
        playback: MockPlayback,
    ) -> Self {
        Self {
            words: Arc::new(MockWordSource::new(pool)),
            playback: Arc::new(playback),
            capture: Arc::new(MockCapture::new()),
            store: Arc::new(MockStore::new()),
        }
    }

    pub fn collaborators(&self) -> SessionCollaborators {
        SessionCollaborators {
            words: self.words.clone(),
            playback: self.playback.clone(),
            capture: self.capture.clone(),
            recordings: self.store.clone(),
            results: self.store.clone(),
        }
    }
}
