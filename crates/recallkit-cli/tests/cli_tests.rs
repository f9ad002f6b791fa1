//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn recallkit(dir: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("recallkit").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("RECALLKIT_DATA_DIR")
        .env_remove("RECALLKIT_WORD_BANK");
    cmd
}

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

const TRANSCRIPTION: &str = r#"[
    {"word": "drum", "cycle_index": 0},
    {"word": "curtin", "cycle_index": 0},
    {"word": "bell", "cycle_index": 1},
    {"word": "desk", "cycle_index": 4}
]"#;

fn recognition(words: &[&str]) -> String {
    let words: Vec<String> = words
        .iter()
        .map(|w| format!(r#"{{"word": "{w}", "confidence": 0.9}}"#))
        .collect();
    format!(
        r#"{{"recognizedPhrases": [{{"nBest": [{{"words": [{}]}}]}}]}}"#,
        words.join(", ")
    )
}

fn trial_record(id: &str, status: &str) -> String {
    format!(
        r#"{{"trial_id": "{id}", "status": "{status}", "test_words": ["drum", "curtain", "bell"], "interference_words": ["desk"]}}"#
    )
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    recallkit(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created recallkit.toml"))
        .stdout(predicate::str::contains("Created ./words.txt"));

    let config = std::fs::read_to_string(dir.path().join("recallkit.toml")).unwrap();
    assert!(config.contains("[session]"));
    assert!(config.contains("[scoring]"));

    recallkit(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists, skipping"));
}

#[test]
fn generate_after_init() {
    let dir = TempDir::new().unwrap();
    recallkit(dir.path()).arg("init").assert().success();

    let output = recallkit(dir.path())
        .args(["generate", "--count", "15", "--exclude", "drum,bell", "--seed", "3"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let words: Vec<&str> = stdout.lines().collect();
    assert_eq!(words.len(), 15);
    assert!(!words.contains(&"drum"));
    assert!(!words.contains(&"bell"));

    // Same seed, same list.
    recallkit(dir.path())
        .args(["generate", "--count", "15", "--exclude", "drum,bell", "--seed", "3"])
        .assert()
        .success()
        .stdout(stdout);
}

#[test]
fn generate_with_too_small_bank() {
    let dir = TempDir::new().unwrap();
    let bank = write(dir.path(), "small.txt", "drum\nbell\n");

    recallkit(dir.path())
        .args(["generate", "--count", "3", "--word-bank"])
        .arg(&bank)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"))
        .stderr(predicate::str::contains("insufficient words"));
}

#[test]
fn validate_word_list_warnings() {
    let dir = TempDir::new().unwrap();
    let list = write(dir.path(), "list.txt", "drum\nbell\ndrum\nDrum\nice-cream\n");

    recallkit(dir.path())
        .arg("validate")
        .arg("--word-list")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("5 words"))
        .stdout(predicate::str::contains("duplicate word: drum"))
        .stdout(predicate::str::contains("non-alphabetic"))
        .stdout(predicate::str::contains("only in case"));
}

#[test]
fn validate_clean_word_list() {
    let dir = TempDir::new().unwrap();
    let list = write(dir.path(), "list.txt", "drum\nbell\nmoon\n");

    recallkit(dir.path())
        .arg("validate")
        .arg("--word-list")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("No problems found"));
}

#[test]
fn validate_transcription_reports_missing_cycles() {
    let dir = TempDir::new().unwrap();
    let transcription = write(dir.path(), "spoken.json", TRANSCRIPTION);

    recallkit(dir.path())
        .arg("validate")
        .arg("--transcription")
        .arg(&transcription)
        .assert()
        .success()
        .stdout(predicate::str::contains("4 words, 4 learning cycles"))
        .stdout(predicate::str::contains("learning cycle 3"))
        .stdout(predicate::str::contains("learning cycle 4"));
}

#[test]
fn validate_requires_an_input() {
    let dir = TempDir::new().unwrap();
    recallkit(dir.path()).arg("validate").assert().failure();
}

#[test]
fn validate_nonexistent_file() {
    let dir = TempDir::new().unwrap();
    recallkit(dir.path())
        .args(["validate", "--word-list", "nonexistent.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn score_prints_table() {
    let dir = TempDir::new().unwrap();
    let targets = write(dir.path(), "targets.txt", "drum\ncurtain\nbell\n");
    let transcription = write(dir.path(), "spoken.json", TRANSCRIPTION);

    recallkit(dir.path())
        .arg("score")
        .arg("--targets")
        .arg(&targets)
        .arg("--transcription")
        .arg(&transcription)
        .assert()
        .success()
        .stdout(predicate::str::contains("curtin"))
        .stdout(predicate::str::contains("Recalled: 2/3"))
        .stdout(predicate::str::contains("independent, double-metaphone"));
}

#[test]
fn score_json_with_interference() {
    let dir = TempDir::new().unwrap();
    let targets = write(dir.path(), "targets.txt", "drum\ncurtain\nbell\n");
    let interference = write(dir.path(), "interference.txt", "desk\nranger\n");
    let transcription = write(dir.path(), "spoken.json", TRANSCRIPTION);
    let saved = dir.path().join("out/score.json");

    let output = recallkit(dir.path())
        .arg("score")
        .arg("--targets")
        .arg(&targets)
        .arg("--transcription")
        .arg(&transcription)
        .arg("--interference")
        .arg(&interference)
        .args(["--strategy", "exclusive", "--format", "json", "--output"])
        .arg(&saved)
        .output()
        .unwrap();
    assert!(output.status.success());

    let score: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(score["trial_id"], "targets");
    assert_eq!(score["strategy"], "exclusive");
    assert_eq!(score["summary"]["total_recall_score"], 2);
    assert_eq!(score["interference"]["total_recall_score"], 1);
    assert!(score["primacy_recency_index"].is_null());
    assert!(saved.exists());
}

#[test]
fn score_rejects_unknown_strategy() {
    let dir = TempDir::new().unwrap();
    let targets = write(dir.path(), "targets.txt", "drum\n");
    let transcription = write(dir.path(), "spoken.json", TRANSCRIPTION);

    recallkit(dir.path())
        .arg("score")
        .arg("--targets")
        .arg(&targets)
        .arg("--transcription")
        .arg(&transcription)
        .args(["--strategy", "hungarian"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown matching strategy"));
}

#[test]
fn batch_scores_completed_trials_once() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    write(&data, "trial-a/trial.json", &trial_record("trial-a", "complete"));
    write(
        &data,
        "trial-a/transcription/trial-a-0.wav.json",
        &recognition(&["drum", "curtin"]),
    );
    write(
        &data,
        "trial-a/transcription/trial-a-1.wav.json",
        &recognition(&["drum", "bell"]),
    );
    write(&data, "trial-b/trial.json", &trial_record("trial-b", "in_progress"));

    recallkit(dir.path())
        .arg("batch")
        .arg("--data-dir")
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("trial-a"))
        .stdout(predicate::str::contains("scored"))
        .stdout(predicate::str::contains("not ready"));

    let score: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(data.join("trial-a/score.json")).unwrap())
            .unwrap();
    assert_eq!(score["summary"]["total_recall_score"], 2);
    assert_eq!(score["per_cycle"].as_array().unwrap().len(), 2);
    assert!(!data.join("trial-b/score.json").exists());

    recallkit(dir.path())
        .arg("batch")
        .arg("--data-dir")
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped"));

    recallkit(dir.path())
        .arg("batch")
        .arg("--data-dir")
        .arg(&data)
        .arg("--force")
        .assert()
        .success()
        .stdout(predicate::str::contains("scored"));
}

#[test]
fn batch_with_missing_data_dir() {
    let dir = TempDir::new().unwrap();
    recallkit(dir.path())
        .args(["batch", "--data-dir", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("data directory not found"));
}
