//! The `recallkit batch` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Table};

use recallkit_collaborators::config::load_config_from;
use recallkit_collaborators::FsStore;
use recallkit_core::engine::{BatchReport, ProgressReporter, ScoreOutcome, ScoringEngine};
use recallkit_core::error::CollaboratorError;
use recallkit_core::model::TrialId;
use recallkit_core::report::TrialScore;
use recallkit_core::traits::ResultSink;

use super::score::aggregator;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_trial_start(&self, trial: &TrialId) {
        eprintln!("  Scoring: {trial}");
    }

    fn on_trial_scored(&self, score: &TrialScore) {
        eprintln!(
            "  Done: {} recalled {}/{} similarity {:.3}",
            score.trial_id,
            score.summary.total_recall_score,
            score.summary.per_word_matches.len(),
            score.summary.similarity_index
        );
    }

    fn on_trial_skipped(&self, trial: &TrialId) {
        eprintln!("  Skipped: {trial} (already scored, use --force to rescore)");
    }

    fn on_trial_error(&self, trial: &TrialId, error: &CollaboratorError) {
        match error {
            CollaboratorError::NotReady(_) => eprintln!("  Not ready: {trial}"),
            e => eprintln!("  ERROR: {trial}: {e}"),
        }
    }

    fn on_batch_complete(&self, total: usize, scored: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {scored}/{total} scored, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    data_dir: Option<PathBuf>,
    force: bool,
    parallelism: Option<usize>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let mut scoring_config = config.scoring.to_scoring_config();
    if let Some(p) = parallelism {
        anyhow::ensure!(p >= 1, "parallelism must be at least 1");
        scoring_config.parallelism = p;
    }

    let data_dir = data_dir.unwrap_or(config.data_dir);
    anyhow::ensure!(
        data_dir.is_dir(),
        "data directory not found: {}",
        data_dir.display()
    );
    let store = Arc::new(FsStore::new(&data_dir));

    let trials = store.list_trials().await?;
    if trials.is_empty() {
        println!("No trials found in {}.", data_dir.display());
        return Ok(());
    }
    eprintln!(
        "recallkit: scoring {} trial(s) in {} ({})",
        trials.len(),
        data_dir.display(),
        config.scoring.strategy
    );

    let engine = ScoringEngine::new(
        aggregator(config.scoring.strategy, config.session.learning_cycles),
        store.clone(),
        store,
        scoring_config,
    );
    let report = engine.score_many(&trials, force, &ConsoleReporter).await;
    print_summary(&report);

    if report.not_ready() > 0 {
        println!(
            "{} trial(s) not ready yet, run again later.",
            report.not_ready()
        );
    }
    anyhow::ensure!(
        report.failed() == 0,
        "{} trial(s) could not be scored",
        report.failed()
    );
    Ok(())
}

fn print_summary(report: &BatchReport) {
    let mut table = Table::new();
    table.set_header(vec!["Trial", "Status", "Recalled", "Similarity", "Best learning"]);

    for (trial, outcome) in &report.outcomes {
        let row = match outcome {
            Ok(ScoreOutcome::Scored(score)) => vec![
                Cell::new(trial),
                Cell::new("scored"),
                Cell::new(format!(
                    "{}/{}",
                    score.summary.total_recall_score,
                    score.summary.per_word_matches.len()
                )),
                Cell::new(format!("{:.3}", score.summary.similarity_index)),
                Cell::new(
                    score
                        .best_learning_recall()
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
            ],
            Ok(ScoreOutcome::Skipped) => status_row(trial, "skipped"),
            Err(CollaboratorError::NotReady(_)) => status_row(trial, "not ready"),
            Err(e) => status_row(trial, &format!("error: {e}")),
        };
        table.add_row(row);
    }

    println!("{table}");
}

fn status_row(trial: &TrialId, status: &str) -> Vec<Cell> {
    vec![
        Cell::new(trial),
        Cell::new(status),
        Cell::new("-"),
        Cell::new("-"),
        Cell::new("-"),
    ]
}
