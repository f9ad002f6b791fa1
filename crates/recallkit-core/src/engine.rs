//! Scoring service.
//!
//! Fetches a completed trial's word lists and transcription, scores it and
//! stores the result. Many trials can be scored concurrently with bounded
//! parallelism.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::aggregate::ScoreAggregator;
use crate::error::CollaboratorError;
use crate::model::{TranscribedWord, TrialId};
use crate::report::TrialScore;
use crate::traits::{ResultSink, Transcriber};

/// Configuration for the scoring service.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Maximum trials scored at once.
    pub parallelism: usize,
    /// Extra attempts while transcription is not ready.
    pub max_transcription_retries: u32,
    /// Delay before the first retry; doubles up to a minute.
    pub retry_delay: Duration,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            max_transcription_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// What happened to one trial.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored(TrialScore),
    /// Already scored and not forced.
    Skipped,
}

/// Per-trial outcomes of a batch, in trial id order.
#[derive(Debug)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub outcomes: Vec<(TrialId, Result<ScoreOutcome, CollaboratorError>)>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn scored(&self) -> usize {
        self.count(|r| matches!(r, Ok(ScoreOutcome::Scored(_))))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, Ok(ScoreOutcome::Skipped)))
    }

    /// Trials whose transcription is still pending. Worth another run later.
    pub fn not_ready(&self) -> usize {
        self.count(|r| matches!(r, Err(CollaboratorError::NotReady(_))))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, Err(e) if !matches!(e, CollaboratorError::NotReady(_))))
    }

    fn count(&self, pred: impl Fn(&Result<ScoreOutcome, CollaboratorError>) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, r)| pred(r)).count()
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_trial_start(&self, trial: &TrialId);
    fn on_trial_scored(&self, score: &TrialScore);
    fn on_trial_skipped(&self, trial: &TrialId);
    fn on_trial_error(&self, trial: &TrialId, error: &CollaboratorError);
    fn on_batch_complete(&self, total: usize, scored: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_trial_start(&self, _: &TrialId) {}
    fn on_trial_scored(&self, _: &TrialScore) {}
    fn on_trial_skipped(&self, _: &TrialId) {}
    fn on_trial_error(&self, _: &TrialId, _: &CollaboratorError) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// The scoring service.
pub struct ScoringEngine {
    aggregator: ScoreAggregator,
    transcriber: Arc<dyn Transcriber>,
    sink: Arc<dyn ResultSink>,
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(
        aggregator: ScoreAggregator,
        transcriber: Arc<dyn Transcriber>,
        sink: Arc<dyn ResultSink>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            aggregator,
            transcriber,
            sink,
            config,
        }
    }

    /// Score one trial and save the result, replacing any earlier one.
    ///
    /// Errors: `NotFound` for an unknown trial, `NotReady` while the trial
    /// is incomplete or its transcription is still pending, and
    /// `MissingTranscription` when a complete trial transcribed to nothing.
    pub async fn score_trial(
        &self,
        trial: &TrialId,
        force: bool,
    ) -> Result<ScoreOutcome, CollaboratorError> {
        let record = self.sink.get_trial_record(trial).await?;
        if !record.is_complete() {
            return Err(CollaboratorError::NotReady(trial.to_string()));
        }

        let existing = match self.sink.get_score_summary(trial).await {
            Ok(score) => Some(score),
            Err(CollaboratorError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        if !ScoreAggregator::needs_scoring(existing.as_ref(), force) {
            tracing::debug!(%trial, "already scored, skipping");
            return Ok(ScoreOutcome::Skipped);
        }

        let transcribed = self.fetch_transcription(trial).await?;
        if transcribed.is_empty() {
            return Err(CollaboratorError::MissingTranscription(trial.to_string()));
        }

        let score = self.aggregator.summarize_trial(&record, &transcribed);
        self.sink.save_score_summary(trial, &score).await?;
        tracing::info!(
            %trial,
            recalled = score.summary.total_recall_score,
            similarity = score.summary.similarity_index,
            "trial scored"
        );
        Ok(ScoreOutcome::Scored(score))
    }

    /// Retry on `NotReady` with exponential backoff.
    async fn fetch_transcription(
        &self,
        trial: &TrialId,
    ) -> Result<Vec<TranscribedWord>, CollaboratorError> {
        let mut retry_delay = self.config.retry_delay;
        let mut last_error = None;
        for retry in 0..=self.config.max_transcription_retries {
            if retry > 0 {
                tracing::debug!(%trial, retry, delay_ms = retry_delay.as_millis() as u64, "transcription not ready, retrying");
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(Duration::from_secs(60));
            }
            match self.transcriber.transcribe(trial).await {
                Ok(words) => return Ok(words),
                Err(e @ CollaboratorError::NotReady(_)) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| CollaboratorError::NotReady(trial.to_string())))
    }

    /// Score several trials concurrently.
    pub async fn score_many(
        &self,
        trials: &[TrialId],
        force: bool,
        progress: &dyn ProgressReporter,
    ) -> BatchReport {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        tracing::info!(%run_id, trials = trials.len(), "scoring batch");

        let mut futures = FuturesUnordered::new();
        for trial in trials {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        progress.on_trial_start(trial);
                        self.score_trial(trial, force).await
                    }
                    Err(_) => Err(CollaboratorError::Storage("semaphore closed".into())),
                };
                (trial.clone(), result)
            });
        }

        let mut outcomes = Vec::with_capacity(trials.len());
        while let Some((trial, result)) = futures.next().await {
            match &result {
                Ok(ScoreOutcome::Scored(score)) => progress.on_trial_scored(score),
                Ok(ScoreOutcome::Skipped) => progress.on_trial_skipped(&trial),
                Err(e) => {
                    if matches!(e, CollaboratorError::NotReady(_)) {
                        tracing::info!(%trial, "not ready, try again later");
                    } else {
                        tracing::error!(%trial, "scoring failed: {e}");
                    }
                    progress.on_trial_error(&trial, e);
                }
            }
            outcomes.push((trial, result));
        }
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        let elapsed = start.elapsed();
        let report = BatchReport {
            run_id,
            outcomes,
            duration_ms: elapsed.as_millis() as u64,
        };
        progress.on_batch_complete(trials.len(), report.scored(), report.failed(), elapsed);
        report
    }
}
