//! Filesystem-backed recording store, transcription input and result sink.
//!
//! Layout under the data directory, one folder per trial container:
//!
//! ```text
//! <data_dir>/<container>/
//!     <container>-<cycle>.wav
//!     trial.json
//!     transcription/<container>-<cycle>.wav.json
//!     score.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use recallkit_core::error::CollaboratorError;
use recallkit_core::model::{TranscribedWord, TrialId, TrialRecord, TrialStatus, WordList};
use recallkit_core::parser::load_transcription;
use recallkit_core::report::TrialScore;
use recallkit_core::traits::{RecordingBlob, RecordingStore, ResultSink, Transcriber};

const TRIAL_FILE: &str = "trial.json";
const SCORE_FILE: &str = "score.json";
const TRANSCRIPTION_DIR: &str = "transcription";

/// Stores everything as plain files under one root directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trial_dir(&self, trial: &TrialId) -> PathBuf {
        self.root.join(trial.container_name())
    }

    pub fn recording_path(&self, trial: &TrialId, cycle_index: u32) -> PathBuf {
        self.trial_dir(trial).join(trial.recording_name(cycle_index))
    }

    pub fn transcription_dir(&self, trial: &TrialId) -> PathBuf {
        self.trial_dir(trial).join(TRANSCRIPTION_DIR)
    }

    /// Write one cycle's words in recognizer output form, as the batch
    /// transcription job would.
    pub async fn write_recognition(
        &self,
        trial: &TrialId,
        cycle_index: u32,
        words: &[&str],
    ) -> Result<PathBuf, CollaboratorError> {
        let words: Vec<serde_json::Value> = words
            .iter()
            .map(|w| serde_json::json!({ "word": w }))
            .collect();
        let body = serde_json::json!({
            "source": trial.recording_name(cycle_index),
            "recognizedPhrases": [{ "nBest": [{ "words": words }] }],
        });
        let path = self
            .transcription_dir(trial)
            .join(format!("{}.json", trial.recording_name(cycle_index)));
        write_json(&path, &body).await?;
        Ok(path)
    }

    async fn load_record_or_new(&self, trial: &TrialId) -> Result<TrialRecord, CollaboratorError> {
        match self.get_trial_record(trial).await {
            Ok(record) => Ok(record),
            Err(CollaboratorError::NotFound(_)) => Ok(TrialRecord::new(trial.clone())),
            Err(e) => Err(e),
        }
    }

    async fn save_record(&self, record: &TrialRecord) -> Result<(), CollaboratorError> {
        write_json(&self.trial_dir(&record.trial_id).join(TRIAL_FILE), record).await
    }

    async fn count_recordings(&self, trial: &TrialId) -> u32 {
        let Ok(mut entries) = tokio::fs::read_dir(self.trial_dir(trial)).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().extension().is_some_and(|ext| ext == "wav") {
                count += 1;
            }
        }
        count
    }
}

fn storage_error(path: &Path, e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::Storage(format!("{}: {e}", path.display()))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CollaboratorError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| storage_error(path, e))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| storage_error(parent, e))?;
    }
    tokio::fs::write(path, json)
        .await
        .map_err(|e| storage_error(path, e))
}

/// `Ok(None)` when the file does not exist.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CollaboratorError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(storage_error(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| storage_error(path, e))
}

#[async_trait]
impl RecordingStore for FsStore {
    async fn upload_recording(
        &self,
        trial: &TrialId,
        cycle_index: u32,
        blob: &RecordingBlob,
    ) -> Result<(), CollaboratorError> {
        let path = self.recording_path(trial, cycle_index);
        let result = async {
            tokio::fs::create_dir_all(self.trial_dir(trial)).await?;
            tokio::fs::write(&path, &blob.bytes).await
        }
        .await;
        result.map_err(|e| CollaboratorError::UploadFailure {
            cycle_index,
            message: format!("{}: {e}", path.display()),
        })?;
        tracing::debug!(%trial, cycle_index, bytes = blob.len(), "recording stored");
        Ok(())
    }

    async fn mark_complete(&self, trial: &TrialId) -> Result<(), CollaboratorError> {
        let mut record = self.load_record_or_new(trial).await?;
        record.status = TrialStatus::Complete;
        record.completed_at = Some(chrono::Utc::now());
        record.recording_count = self.count_recordings(trial).await;
        self.save_record(&record).await
    }
}

#[async_trait]
impl Transcriber for FsStore {
    async fn transcribe(&self, trial: &TrialId) -> Result<Vec<TranscribedWord>, CollaboratorError> {
        let dir = self.transcription_dir(trial);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(CollaboratorError::NotReady(trial.to_string()));
        }
        let words = tokio::task::spawn_blocking(move || load_transcription(&dir))
            .await
            .map_err(|e| CollaboratorError::Storage(e.to_string()))?
            .map_err(|e| CollaboratorError::Storage(format!("{e:#}")))?;
        if words.is_empty() {
            return Err(CollaboratorError::MissingTranscription(trial.to_string()));
        }
        Ok(words)
    }
}

#[async_trait]
impl ResultSink for FsStore {
    async fn save_trial_lists(
        &self,
        trial: &TrialId,
        test_words: &WordList,
        interference_words: &WordList,
    ) -> Result<(), CollaboratorError> {
        let mut record = self.load_record_or_new(trial).await?;
        record.test_words = test_words.clone();
        record.interference_words = interference_words.clone();
        self.save_record(&record).await
    }

    async fn get_trial_record(&self, trial: &TrialId) -> Result<TrialRecord, CollaboratorError> {
        read_json(&self.trial_dir(trial).join(TRIAL_FILE))
            .await?
            .ok_or_else(|| CollaboratorError::NotFound(trial.to_string()))
    }

    async fn list_trials(&self) -> Result<Vec<TrialId>, CollaboratorError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error(&self.root, e)),
        };

        let mut trials = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_error(&self.root, e))?
        {
            let path = entry.path().join(TRIAL_FILE);
            match read_json::<TrialRecord>(&path).await {
                Ok(Some(record)) => trials.push(record.trial_id),
                Ok(None) => {}
                Err(e) => tracing::warn!("skipping {}: {e}", path.display()),
            }
        }
        trials.sort();
        Ok(trials)
    }

    async fn save_score_summary(
        &self,
        trial: &TrialId,
        score: &TrialScore,
    ) -> Result<(), CollaboratorError> {
        write_json(&self.trial_dir(trial).join(SCORE_FILE), score).await
    }

    async fn get_score_summary(&self, trial: &TrialId) -> Result<TrialScore, CollaboratorError> {
        read_json(&self.trial_dir(trial).join(SCORE_FILE))
            .await?
            .ok_or_else(|| CollaboratorError::NotFound(trial.to_string()))
    }
}
