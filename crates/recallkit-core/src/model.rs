//! Core data model types for recallkit.
//!
//! These are the fundamental types the scoring engine and the trial session
//! share: word lists, transcribed words, match results and score summaries.

use std::fmt;
use std::str::FromStr;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A case-sensitive word token. Exact-recall checks use literal equality.
pub type Word = String;

/// An ordered list of words as generated for a cycle.
///
/// Built once and then only read, so scoring is always reproducible against
/// the exact list that was played.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordList(Vec<Word>);

impl WordList {
    pub fn new(words: Vec<Word>) -> Self {
        Self(words)
    }

    pub fn words(&self) -> &[Word] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Word> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Literal, case-sensitive membership.
    pub fn contains(&self, word: &str) -> bool {
        self.0.iter().any(|w| w == word)
    }
}

impl<S: Into<Word>> FromIterator<S> for WordList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a WordList {
    type Item = &'a Word;
    type IntoIter = std::slice::Iter<'a, Word>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Identifier of one administered trial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialId(String);

impl TrialId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `prefix` followed by 10 random lowercase alphanumerics.
    pub fn generate(prefix: &str) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self(format!("{prefix}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage container name: lowercase, every char outside `[a-z0-9-]`
    /// replaced by `-`.
    pub fn container_name(&self) -> String {
        self.0
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    }

    /// Blob name of the recording captured in `cycle_index`.
    pub fn recording_name(&self, cycle_index: u32) -> String {
        format!("{}-{cycle_index}.wav", self.container_name())
    }
}

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A word recognized from a recall recording, tagged with the recording
/// (cycle) that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribedWord {
    pub word: Word,
    pub cycle_index: u32,
    /// Offset into the recording, when the recognizer reports it.
    #[serde(default)]
    pub offset_ms: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl TranscribedWord {
    pub fn new(word: impl Into<Word>, cycle_index: u32) -> Self {
        Self {
            word: word.into(),
            cycle_index,
            offset_ms: None,
            duration_ms: None,
            confidence: None,
        }
    }
}

/// Primary and secondary phonetic codes of a word. An empty code means
/// "no encoding" and never counts as close to anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneticCode {
    pub primary: String,
    #[serde(default)]
    pub secondary: String,
}

impl PhoneticCode {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }
}

/// Best match found for one target word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub target_word: Word,
    /// Combined dissimilarity; the sentinel `chars(target) + 1` when there
    /// was no candidate at all.
    pub distance: usize,
    pub matched_word: Option<Word>,
    /// Cycle that produced the matched word.
    #[serde(default)]
    pub cycle_index: Option<u32>,
    #[serde(default)]
    pub orthographic_distance: Option<usize>,
    #[serde(default)]
    pub phonetic_distance: Option<usize>,
}

impl MatchResult {
    /// Result for a target that had no candidate to compare with.
    pub fn unmatched(target: &str) -> Self {
        Self {
            target_word: target.to_string(),
            distance: unmatched_distance(target),
            matched_word: None,
            cycle_index: None,
            orthographic_distance: None,
            phonetic_distance: None,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.matched_word.as_deref() == Some(self.target_word.as_str())
    }
}

/// Sentinel distance for a target with no candidates.
pub fn unmatched_distance(target: &str) -> usize {
    target.chars().count() + 1
}

/// Per-target matches in target-list order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordMatches(Vec<MatchResult>);

impl WordMatches {
    pub fn new(matches: Vec<MatchResult>) -> Self {
        Self(matches)
    }

    /// First match recorded for `target`.
    pub fn get(&self, target: &str) -> Option<&MatchResult> {
        self.0.iter().find(|m| m.target_word == target)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchResult> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[MatchResult] {
        &self.0
    }
}

/// Scoring of one target list against a set of transcribed words.
/// Recomputed wholesale on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    /// Targets literally present among the transcribed words.
    pub total_recall_score: usize,
    /// Sum of per-target similarity contributions.
    pub similarity_index: f64,
    pub per_word_matches: WordMatches,
}

/// How transcribed words may be assigned to target words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    /// Each target takes its own best candidate; a candidate may serve many.
    #[default]
    Independent,
    /// Greedy one-to-one assignment by ascending distance.
    Exclusive,
}

impl fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchingStrategy::Independent => write!(f, "independent"),
            MatchingStrategy::Exclusive => write!(f, "exclusive"),
        }
    }
}

impl FromStr for MatchingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "independent" => Ok(MatchingStrategy::Independent),
            "exclusive" | "greedy" => Ok(MatchingStrategy::Exclusive),
            other => Err(format!("unknown matching strategy: {other}")),
        }
    }
}

/// What a recording in a given cycle was recalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    /// Learning trial `n` (1-based) against the target list.
    Learning(u8),
    /// The single trial against the interference list.
    Interference,
    /// Recall of the target list after the delay, with no replay.
    DelayedRecall,
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleKind::Learning(n) => write!(f, "learning {n}"),
            CycleKind::Interference => write!(f, "interference"),
            CycleKind::DelayedRecall => write!(f, "delayed recall"),
        }
    }
}

/// Maps recording order (cycle index) to cycle kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleLayout {
    pub learning_cycles: u8,
}

impl Default for CycleLayout {
    fn default() -> Self {
        Self { learning_cycles: 4 }
    }
}

impl CycleLayout {
    pub fn new(learning_cycles: u8) -> Self {
        Self { learning_cycles }
    }

    pub fn kind_of(&self, cycle_index: u32) -> Option<CycleKind> {
        let learning = u32::from(self.learning_cycles);
        if cycle_index < learning {
            // cycle_index < learning_cycles <= u8::MAX
            Some(CycleKind::Learning(cycle_index as u8 + 1))
        } else if cycle_index == learning {
            Some(CycleKind::Interference)
        } else if cycle_index == learning + 1 {
            Some(CycleKind::DelayedRecall)
        } else {
            None
        }
    }

    pub fn index_of(&self, kind: CycleKind) -> u32 {
        let learning = u32::from(self.learning_cycles);
        match kind {
            CycleKind::Learning(n) => u32::from(n.saturating_sub(1)),
            CycleKind::Interference => learning,
            CycleKind::DelayedRecall => learning + 1,
        }
    }
}

/// Lifecycle of a stored trial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    #[default]
    InProgress,
    Complete,
}

/// The stored trial: the lists that were played and where the trial stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_id: TrialId,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub status: TrialStatus,
    #[serde(default)]
    pub test_words: WordList,
    #[serde(default)]
    pub interference_words: WordList,
    #[serde(default)]
    pub recording_count: u32,
    #[serde(default)]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TrialRecord {
    pub fn new(trial_id: TrialId) -> Self {
        Self {
            trial_id,
            patient_id: None,
            status: TrialStatus::InProgress,
            test_words: WordList::default(),
            interference_words: WordList::default(),
            recording_count: 0,
            completed_at: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == TrialStatus::Complete
    }
}
