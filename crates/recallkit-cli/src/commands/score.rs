//! The `recallkit score` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};

use recallkit_collaborators::config::load_config_from;
use recallkit_collaborators::DoubleMetaphoneEncoder;
use recallkit_core::aggregate::{similarity, ScoreAggregator};
use recallkit_core::matcher::WordMatcher;
use recallkit_core::model::{
    CycleLayout, MatchingStrategy, ScoreSummary, TrialId, TrialRecord, TrialStatus, WordList,
};
use recallkit_core::parser;
use recallkit_core::report::TrialScore;
use recallkit_core::scoring::RecallScoringEngine;

/// Build the aggregator the CLI scores with: Double Metaphone, the chosen
/// strategy and the configured cycle layout.
pub fn aggregator(strategy: MatchingStrategy, learning_cycles: u8) -> ScoreAggregator {
    let matcher = WordMatcher::new(Arc::new(DoubleMetaphoneEncoder::new()));
    ScoreAggregator::new(RecallScoringEngine::new(matcher).with_strategy(strategy))
        .with_layout(CycleLayout::new(learning_cycles))
}

pub fn execute(
    targets_path: PathBuf,
    transcription_path: PathBuf,
    interference_path: Option<PathBuf>,
    strategy: Option<String>,
    format: String,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let strategy = match strategy {
        Some(s) => s.parse::<MatchingStrategy>().map_err(anyhow::Error::msg)?,
        None => config.scoring.strategy,
    };

    let test_words = parser::load_word_list(&targets_path)?;
    anyhow::ensure!(
        !test_words.is_empty(),
        "target list is empty: {}",
        targets_path.display()
    );
    let interference_words = match &interference_path {
        Some(path) => parser::load_word_list(path)?,
        None => WordList::default(),
    };
    let transcribed = parser::load_transcription(&transcription_path)?;
    if transcribed.is_empty() {
        eprintln!("Warning: transcription has no words, every target is unmatched.");
    }

    let mut record = TrialRecord::new(trial_id_for(&targets_path));
    record.status = TrialStatus::Complete;
    record.test_words = test_words;
    record.interference_words = interference_words;

    let score = aggregator(strategy, config.session.learning_cycles)
        .summarize_trial(&record, &transcribed);

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&score)?),
        "markdown" | "md" => println!("{}", score.to_markdown()),
        "table" => print_score(&score),
        other => anyhow::bail!("unknown format: {other} (expected table, json or markdown)"),
    }

    if let Some(path) = output {
        score.save_json(&path)?;
        eprintln!("Score saved to: {}", path.display());
    }

    Ok(())
}

fn trial_id_for(targets_path: &Path) -> TrialId {
    let stem = targets_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "offline".to_string());
    TrialId::new(stem)
}

fn matches_table(summary: &ScoreSummary) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Target", "Matched", "Cycle", "Distance", "Similarity"]);
    for m in summary.per_word_matches.iter() {
        let cycle = m
            .cycle_index
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&m.target_word),
            Cell::new(m.matched_word.as_deref().unwrap_or("-")),
            Cell::new(cycle),
            Cell::new(m.distance),
            Cell::new(format!("{:.3}", similarity(m))),
        ]);
    }
    table
}

fn print_score(score: &TrialScore) {
    let summary = &score.summary;
    println!("{}", matches_table(summary));
    println!(
        "Recalled: {}/{}  Similarity index: {:.3}  ({}, {})",
        summary.total_recall_score,
        summary.per_word_matches.len(),
        summary.similarity_index,
        score.strategy,
        score.encoder
    );

    if let Some(interference) = &score.interference {
        println!("\nInterference list:");
        println!("{}", matches_table(interference));
        println!(
            "Recalled: {}/{}  Similarity index: {:.3}",
            interference.total_recall_score,
            interference.per_word_matches.len(),
            interference.similarity_index
        );
    }

    if !score.per_cycle.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Cycle", "Kind", "Spoken", "Recalled"]);
        for c in &score.per_cycle {
            table.add_row(vec![
                Cell::new(c.cycle_index),
                Cell::new(c.kind),
                Cell::new(c.words_spoken),
                Cell::new(c.recalled),
            ]);
        }
        println!("\n{table}");
    }
}
