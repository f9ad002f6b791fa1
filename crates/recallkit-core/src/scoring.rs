//! Recall scoring: the best transcribed candidate for every target word.

use std::collections::HashSet;

use crate::matcher::{Distances, EncodedWord, WordMatcher};
use crate::model::{MatchResult, MatchingStrategy, TranscribedWord, WordList, WordMatches};

/// Matches target words against transcribed words.
#[derive(Clone)]
pub struct RecallScoringEngine {
    matcher: WordMatcher,
    strategy: MatchingStrategy,
}

impl RecallScoringEngine {
    pub fn new(matcher: WordMatcher) -> Self {
        Self {
            matcher,
            strategy: MatchingStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: MatchingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> MatchingStrategy {
        self.strategy
    }

    pub fn matcher(&self) -> &WordMatcher {
        &self.matcher
    }

    /// One `MatchResult` per target, in target order.
    ///
    /// Cycle indices are carried for provenance but never affect distance.
    /// With no transcribed words every target is unmatched.
    pub fn score(&self, targets: &WordList, transcribed: &[TranscribedWord]) -> WordMatches {
        if transcribed.is_empty() {
            return WordMatches::new(targets.iter().map(|t| MatchResult::unmatched(t)).collect());
        }

        let encoded_targets: Vec<EncodedWord> =
            targets.iter().map(|t| self.matcher.encode(t)).collect();
        let encoded_candidates: Vec<EncodedWord> = transcribed
            .iter()
            .map(|r| self.matcher.encode(&r.word))
            .collect();

        // distances[t][c]
        let distances: Vec<Vec<Distances>> = encoded_targets
            .iter()
            .map(|t| {
                encoded_candidates
                    .iter()
                    .map(|c| self.matcher.compare(t, c))
                    .collect()
            })
            .collect();

        let matches = match self.strategy {
            MatchingStrategy::Independent => independent(targets, transcribed, &distances),
            MatchingStrategy::Exclusive => exclusive(targets, transcribed, &distances),
        };
        WordMatches::new(matches)
    }
}

fn matched(target: &str, candidate: &TranscribedWord, d: Distances) -> MatchResult {
    MatchResult {
        target_word: target.to_string(),
        distance: d.combined,
        matched_word: Some(candidate.word.clone()),
        cycle_index: Some(candidate.cycle_index),
        orthographic_distance: Some(d.orthographic),
        phonetic_distance: d.phonetic,
    }
}

/// Per-target minimum; the first candidate wins ties.
fn independent(
    targets: &WordList,
    transcribed: &[TranscribedWord],
    distances: &[Vec<Distances>],
) -> Vec<MatchResult> {
    targets
        .iter()
        .zip(distances)
        .map(|(target, row)| {
            let best = row
                .iter()
                .enumerate()
                .fold(None::<(usize, Distances)>, |best, (ci, d)| match best {
                    Some((_, b)) if b.combined <= d.combined => best,
                    _ => Some((ci, *d)),
                });
            match best {
                Some((ci, d)) => matched(target, &transcribed[ci], d),
                None => MatchResult::unmatched(target),
            }
        })
        .collect()
}

/// Greedy one-to-one assignment by ascending distance. Each target and each
/// distinct candidate word is used at most once.
fn exclusive(
    targets: &WordList,
    transcribed: &[TranscribedWord],
    distances: &[Vec<Distances>],
) -> Vec<MatchResult> {
    let mut pairs: Vec<(usize, usize, Distances)> = distances
        .iter()
        .enumerate()
        .flat_map(|(ti, row)| row.iter().enumerate().map(move |(ci, d)| (ti, ci, *d)))
        .collect();
    // Stable: ties keep target order, then transcription order.
    pairs.sort_by_key(|(_, _, d)| d.combined);

    let mut results: Vec<Option<MatchResult>> = vec![None; targets.len()];
    let mut used_words: HashSet<&str> = HashSet::new();

    for (ti, ci, d) in pairs {
        if results[ti].is_some() {
            continue;
        }
        let candidate = &transcribed[ci];
        if used_words.contains(candidate.word.as_str()) {
            continue;
        }
        used_words.insert(candidate.word.as_str());
        results[ti] = Some(matched(&targets.words()[ti], candidate, d));
    }

    results
        .into_iter()
        .zip(targets.iter())
        .map(|(r, t)| r.unwrap_or_else(|| MatchResult::unmatched(t)))
        .collect()
}
