//! Error types for recall scoring and trial sessions.
//!
//! Collaborator failures are typed so the session driver and the scoring
//! service can classify them for retry decisions without string matching.

use thiserror::Error;

use crate::state::TrialState;

/// Errors reported by external collaborators (word source, capture hardware,
/// persistence, transcription, result sink).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The word source cannot supply enough eligible words.
    #[error("insufficient words: requested {requested}, only {available} eligible")]
    InsufficientWords { requested: usize, available: usize },

    /// Audio capture permission was denied.
    #[error("audio capture permission denied: {0}")]
    PermissionDenied(String),

    /// No usable capture device.
    #[error("audio capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Transcription has not been produced yet. Try again later.
    #[error("transcription not ready for trial {0}")]
    NotReady(String),

    /// Transcription came back empty or absent for a completed trial.
    #[error("missing transcription for trial {0}")]
    MissingTranscription(String),

    /// Persisting one recording failed.
    #[error("upload of recording {cycle_index} failed: {message}")]
    UploadFailure { cycle_index: u32, message: String },

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Playback ended before the word list finished.
    #[error("playback interrupted before the word list finished")]
    PlaybackInterrupted,

    /// Any other storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CollaboratorError {
    /// Returns `true` if the same call may succeed when repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollaboratorError::NotReady(_)
                | CollaboratorError::UploadFailure { .. }
                | CollaboratorError::PlaybackInterrupted
                | CollaboratorError::Storage(_)
        )
    }

    /// Returns `true` for failures of the capture hardware.
    pub fn is_capture_failure(&self) -> bool {
        matches!(
            self,
            CollaboratorError::PermissionDenied(_) | CollaboratorError::DeviceUnavailable(_)
        )
    }
}

/// Failure of a phonetic encoder. Never escapes the word matcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneticError {
    /// The word has nothing the encoder can sound out.
    #[error("cannot encode {0:?}")]
    Unencodable(String),

    /// The encoder backend failed.
    #[error("phonetic encoder failed: {0}")]
    Backend(String),
}

/// Errors from driving a trial session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// The transition table does not allow this move.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TrialState, to: TrialState },

    /// The action is not accepted in the current state.
    #[error("action '{action}' is not valid in state {state}")]
    InvalidAction {
        action: &'static str,
        state: TrialState,
    },

    /// The word source returned an empty list.
    #[error("word source returned an empty list")]
    EmptyWordList,

    /// The delayed-recall wait has not elapsed yet.
    #[error("delay not elapsed, {remaining_secs}s remaining")]
    DelayNotElapsed { remaining_secs: u64 },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}
