//! Score aggregation: exact recall counts, the similarity index, and the
//! per-cycle breakdown persisted for a trial.

use std::collections::{BTreeMap, HashSet};

use crate::model::{
    CycleKind, CycleLayout, MatchResult, ScoreSummary, TranscribedWord, TrialRecord, WordList,
};
use crate::report::{CycleRecall, TrialScore};
use crate::scoring::RecallScoringEngine;

/// Similarity contribution of one match: `1 / (1 + distance)`, and `0` when
/// nothing was matched. Bounded in `[0, 1]` and decreasing in distance.
pub fn similarity(result: &MatchResult) -> f64 {
    if result.matched_word.is_none() {
        return 0.0;
    }
    1.0 / (1.0 + result.distance as f64)
}

/// Number of targets literally present (case-sensitive) among the
/// transcribed words.
pub fn exact_recall_count(targets: &WordList, transcribed: &[TranscribedWord]) -> usize {
    let spoken: HashSet<&str> = transcribed.iter().map(|r| r.word.as_str()).collect();
    targets
        .iter()
        .filter(|t| spoken.contains(t.as_str()))
        .count()
}

/// Turns scoring engine output into the persisted result shape.
#[derive(Clone)]
pub struct ScoreAggregator {
    engine: RecallScoringEngine,
    layout: CycleLayout,
}

impl ScoreAggregator {
    pub fn new(engine: RecallScoringEngine) -> Self {
        Self {
            engine,
            layout: CycleLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: CycleLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn engine(&self) -> &RecallScoringEngine {
        &self.engine
    }

    /// Pure and idempotent: the same inputs always give the same summary.
    pub fn summarize(&self, targets: &WordList, transcribed: &[TranscribedWord]) -> ScoreSummary {
        let per_word_matches = self.engine.score(targets, transcribed);
        let similarity_index = per_word_matches.iter().map(similarity).sum();
        ScoreSummary {
            total_recall_score: exact_recall_count(targets, transcribed),
            similarity_index,
            per_word_matches,
        }
    }

    /// Full trial score: the target list against every transcribed word, the
    /// interference list against the interference recording, and exact
    /// recall per cycle.
    pub fn summarize_trial(
        &self,
        record: &TrialRecord,
        transcribed: &[TranscribedWord],
    ) -> TrialScore {
        let summary = self.summarize(&record.test_words, transcribed);

        let interference_index = self.layout.index_of(CycleKind::Interference);
        let interference_words: Vec<TranscribedWord> = transcribed
            .iter()
            .filter(|r| r.cycle_index == interference_index)
            .cloned()
            .collect();
        let interference = if record.interference_words.is_empty() || interference_words.is_empty()
        {
            None
        } else {
            Some(self.summarize(&record.interference_words, &interference_words))
        };

        TrialScore {
            trial_id: record.trial_id.clone(),
            strategy: self.engine.strategy(),
            encoder: self.engine.matcher().encoder_name().to_string(),
            summary,
            interference,
            per_cycle: self.per_cycle(record, transcribed),
            primacy_recency_index: None,
        }
    }

    fn per_cycle(&self, record: &TrialRecord, transcribed: &[TranscribedWord]) -> Vec<CycleRecall> {
        let mut by_cycle: BTreeMap<u32, Vec<TranscribedWord>> = BTreeMap::new();
        for word in transcribed {
            by_cycle
                .entry(word.cycle_index)
                .or_default()
                .push(word.clone());
        }

        by_cycle
            .into_iter()
            .filter_map(|(cycle_index, words)| {
                let Some(kind) = self.layout.kind_of(cycle_index) else {
                    tracing::warn!(
                        trial = %record.trial_id,
                        cycle_index,
                        "transcribed words from an unknown cycle ignored in breakdown"
                    );
                    return None;
                };
                let list = match kind {
                    CycleKind::Interference => &record.interference_words,
                    _ => &record.test_words,
                };
                Some(CycleRecall {
                    cycle_index,
                    kind,
                    words_spoken: words.len(),
                    recalled: exact_recall_count(list, &words),
                })
            })
            .collect()
    }

    /// Whether a trial should be (re)scored: never scored before, or the
    /// caller forces a recomputation.
    pub fn needs_scoring(existing: Option<&TrialScore>, force: bool) -> bool {
        force || existing.is_none()
    }
}
