//! Collaborator traits consumed by the trial session and the scoring service.
//!
//! Concrete implementations (word bank, filesystem store, in-memory mocks)
//! live in the `recallkit-collaborators` crate.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::CollaboratorError;
use crate::model::{TranscribedWord, TrialId, TrialRecord, WordList};
use crate::report::TrialScore;

// ---------------------------------------------------------------------------
// Word source
// ---------------------------------------------------------------------------

/// Supplies word lists for a trial.
#[async_trait]
pub trait WordSource: Send + Sync {
    /// Human-readable source name (e.g. "word-bank").
    fn name(&self) -> &str;

    /// Pick `count` words, none of which appear in `excluding`.
    ///
    /// Fails with [`CollaboratorError::InsufficientWords`] when fewer than
    /// `count` eligible words remain.
    async fn generate(&self, count: usize, excluding: &WordList)
        -> Result<WordList, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Request to read a word list aloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnounceRequest {
    pub words: WordList,
    /// Countdown spoken before the first word ("3, 2, 1").
    pub countdown_from: u32,
    /// Pause between consecutive words.
    pub inter_word_delay: Duration,
}

/// Progress of one announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The words started to be audible.
    Started,
    /// The last word finished playing.
    Finished,
}

/// Text-to-speech playback.
#[async_trait]
pub trait Playback: Send + Sync {
    /// Begin the announcement. Progress is reported on the returned channel;
    /// a channel closed before `Finished` means playback was interrupted.
    async fn announce(
        &self,
        request: &AnnounceRequest,
    ) -> Result<mpsc::Receiver<PlaybackEvent>, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Audio capture
// ---------------------------------------------------------------------------

/// Opaque handle to an in-progress capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureHandle(pub u64);

/// Raw audio produced by one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl RecordingBlob {
    pub fn wav(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: "audio/wav".into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Microphone capture.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Start capturing. Fails with `PermissionDenied` or `DeviceUnavailable`.
    async fn start(&self) -> Result<CaptureHandle, CollaboratorError>;

    /// Stop capturing and release the device, returning the audio.
    async fn stop(&self, handle: CaptureHandle) -> Result<RecordingBlob, CollaboratorError>;

    /// Release the device and discard the audio. Must not block; called
    /// from `Drop`.
    fn abort(&self, handle: CaptureHandle);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Blob storage for recordings.
#[async_trait]
pub trait RecordingStore: Send + Sync {
    async fn upload_recording(
        &self,
        trial: &TrialId,
        cycle_index: u32,
        blob: &RecordingBlob,
    ) -> Result<(), CollaboratorError>;

    /// Record that every recording of the trial has been handed over.
    async fn mark_complete(&self, trial: &TrialId) -> Result<(), CollaboratorError>;
}

/// Produces the scoring engine's input from a trial's recordings.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Fails with `NotReady` while transcription is still pending.
    async fn transcribe(&self, trial: &TrialId) -> Result<Vec<TranscribedWord>, CollaboratorError>;
}

/// Stores trial records and score results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn save_trial_lists(
        &self,
        trial: &TrialId,
        test_words: &WordList,
        interference_words: &WordList,
    ) -> Result<(), CollaboratorError>;

    async fn get_trial_record(&self, trial: &TrialId) -> Result<TrialRecord, CollaboratorError>;

    /// Every trial known to the sink.
    async fn list_trials(&self) -> Result<Vec<TrialId>, CollaboratorError>;

    /// Replaces any score saved earlier for the same trial.
    async fn save_score_summary(
        &self,
        trial: &TrialId,
        score: &TrialScore,
    ) -> Result<(), CollaboratorError>;

    /// Fails with `NotFound` when the trial was never scored.
    async fn get_score_summary(&self, trial: &TrialId) -> Result<TrialScore, CollaboratorError>;
}
