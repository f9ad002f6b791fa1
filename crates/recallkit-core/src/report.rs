//! Persisted trial score with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{CycleKind, MatchingStrategy, ScoreSummary, TrialId};

/// Everything computed for one trial. A later scoring run replaces it
/// wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialScore {
    pub trial_id: TrialId,
    /// Matching strategy the summary was computed with.
    pub strategy: MatchingStrategy,
    /// Name of the phonetic encoder used.
    pub encoder: String,
    /// Target list against every transcribed word.
    pub summary: ScoreSummary,
    /// Interference list against the interference recording.
    #[serde(default)]
    pub interference: Option<ScoreSummary>,
    #[serde(default)]
    pub per_cycle: Vec<CycleRecall>,
    /// Reserved. Not computed.
    #[serde(default)]
    pub primacy_recency_index: Option<f64>,
}

/// Exact recall within one recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecall {
    pub cycle_index: u32,
    pub kind: CycleKind,
    pub words_spoken: usize,
    pub recalled: usize,
}

impl TrialScore {
    /// Save the score as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize score")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write score to {}", path.display()))?;
        Ok(())
    }

    /// Load a score from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read score from {}", path.display()))?;
        let score: TrialScore =
            serde_json::from_str(&content).context("failed to parse score JSON")?;
        Ok(score)
    }

    /// Recall count of the best learning cycle, if any learning cycle was
    /// transcribed.
    pub fn best_learning_recall(&self) -> Option<usize> {
        self.per_cycle
            .iter()
            .filter(|c| matches!(c.kind, CycleKind::Learning(_)))
            .map(|c| c.recalled)
            .max()
    }

    /// Render as a short markdown block.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str(&format!(
            "**Trial {}:** {} recalled, similarity {:.2} ({}, {})\n\n",
            self.trial_id,
            self.summary.total_recall_score,
            self.summary.similarity_index,
            self.strategy,
            self.encoder
        ));

        if !self.per_cycle.is_empty() {
            md.push_str("| Cycle | Kind | Spoken | Recalled |\n");
            md.push_str("|-------|------|--------|----------|\n");
            for c in &self.per_cycle {
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    c.cycle_index, c.kind, c.words_spoken, c.recalled
                ));
            }
        }

        md
    }
}
