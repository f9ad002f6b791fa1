//! Word-list and transcription file loading, and validation of both.
//!
//! Transcriptions come either as a directory of batch recognizer output
//! (one `<name>-<cycle>.wav.json` file per recording) or as a plain JSON
//! array of `{ "word", "cycle_index" }` objects.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{CycleKind, CycleLayout, TranscribedWord, WordList};

/// Parse a newline-separated word list. Lines are trimmed; blank lines and
/// `#` comments are skipped. Order and duplicates are kept.
pub fn parse_word_list_str(content: &str) -> WordList {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect()
}

/// Load a word list file.
pub fn load_word_list(path: &Path) -> Result<WordList> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read word list: {}", path.display()))?;
    Ok(parse_word_list_str(&content))
}

// ---------------------------------------------------------------------------
// Recognizer output
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionFile {
    #[serde(default)]
    recognized_phrases: Vec<RecognizedPhrase>,
}

#[derive(Debug, Deserialize)]
struct RecognizedPhrase {
    #[serde(default, rename = "nBest")]
    n_best: Vec<Hypothesis>,
}

#[derive(Debug, Deserialize)]
struct Hypothesis {
    #[serde(default)]
    words: Vec<RecognizedWord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognizedWord {
    word: String,
    #[serde(default)]
    offset_milliseconds: Option<u64>,
    #[serde(default)]
    duration_milliseconds: Option<u64>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Cycle index encoded in a recognizer output file name, e.g.
/// `ravlt-abc-3.wav.json` → `3`.
pub fn cycle_index_from_file_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(".wav.json")?;
    let (_, digits) = stem.rsplit_once('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Words of the top hypothesis of every recognized phrase, in order.
pub fn parse_recognition_str(content: &str, cycle_index: u32) -> Result<Vec<TranscribedWord>> {
    let parsed: RecognitionFile =
        serde_json::from_str(content).context("failed to parse recognizer output")?;
    Ok(parsed
        .recognized_phrases
        .into_iter()
        .filter_map(|p| p.n_best.into_iter().next())
        .flat_map(|top| top.words)
        .map(|w| TranscribedWord {
            word: w.word,
            cycle_index,
            offset_ms: w.offset_milliseconds,
            duration_ms: w.duration_milliseconds,
            confidence: w.confidence,
        })
        .collect())
}

/// Parse a plain JSON array of transcribed words.
pub fn parse_transcription_str(content: &str) -> Result<Vec<TranscribedWord>> {
    serde_json::from_str(content).context("failed to parse transcription JSON")
}

/// Load transcribed words from a recognizer output directory or a single
/// JSON file.
///
/// Directory files are read in cycle order; files whose name carries no
/// cycle index are skipped with a warning.
pub fn load_transcription(path: &Path) -> Result<Vec<TranscribedWord>> {
    if path.is_dir() {
        return load_recognition_directory(path);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read transcription: {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match cycle_index_from_file_name(&file_name) {
        Some(cycle) => parse_recognition_str(&content, cycle)
            .with_context(|| format!("in {}", path.display())),
        None => parse_transcription_str(&content).with_context(|| format!("in {}", path.display())),
    }
}

fn load_recognition_directory(dir: &Path) -> Result<Vec<TranscribedWord>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if !path.is_file() || !path.extension().is_some_and(|ext| ext == "json") {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match cycle_index_from_file_name(&name) {
            Some(cycle) => files.push((cycle, name, path)),
            None => tracing::warn!("skipping {}: no cycle index in file name", path.display()),
        }
    }
    files.sort();

    let mut words = Vec::new();
    for (cycle, _, path) in files {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        words.extend(
            parse_recognition_str(&content, cycle)
                .with_context(|| format!("in {}", path.display()))?,
        );
    }
    Ok(words)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A warning from word-list or transcription validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The offending word (if applicable).
    pub word: Option<String>,
    pub message: String,
}

impl ValidationWarning {
    fn about(word: &str, message: impl Into<String>) -> Self {
        Self {
            word: Some(word.to_string()),
            message: message.into(),
        }
    }

    fn general(message: impl Into<String>) -> Self {
        Self {
            word: None,
            message: message.into(),
        }
    }
}

/// Check a word list for common issues.
pub fn validate_word_list(list: &WordList) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if list.is_empty() {
        warnings.push(ValidationWarning::general("word list is empty"));
    }

    let mut seen = HashSet::new();
    for word in list {
        if !seen.insert(word.as_str()) {
            warnings.push(ValidationWarning::about(word, format!("duplicate word: {word}")));
        }
    }

    for word in list {
        if word.trim().is_empty() {
            warnings.push(ValidationWarning::about(word, "word is blank"));
        } else if !word.chars().all(char::is_alphabetic) {
            warnings.push(ValidationWarning::about(
                word,
                format!("word contains non-alphabetic characters: {word:?}"),
            ));
        }
    }

    // Exact recall is case-sensitive.
    let mut first_spelling: HashMap<String, &str> = HashMap::new();
    for word in list {
        let first = *first_spelling
            .entry(word.to_lowercase())
            .or_insert(word.as_str());
        if first != word.as_str() {
            warnings.push(ValidationWarning::about(
                word,
                format!("{word:?} differs from {first:?} only in case"),
            ));
        }
    }

    warnings
}

/// Check transcribed words against the cycle layout.
pub fn validate_transcription(
    words: &[TranscribedWord],
    layout: CycleLayout,
) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if words.is_empty() {
        warnings.push(ValidationWarning::general("transcription has no words"));
        return warnings;
    }

    for w in words {
        if w.word.trim().is_empty() {
            warnings.push(ValidationWarning::general(format!(
                "blank word in cycle {}",
                w.cycle_index
            )));
        }
        if layout.kind_of(w.cycle_index).is_none() {
            warnings.push(ValidationWarning::about(
                &w.word,
                format!("cycle index {} is outside the trial layout", w.cycle_index),
            ));
        }
    }

    let present: HashSet<u32> = words.iter().map(|w| w.cycle_index).collect();
    for n in 1..=layout.learning_cycles {
        let index = layout.index_of(CycleKind::Learning(n));
        if !present.contains(&index) {
            warnings.push(ValidationWarning::general(format!(
                "no words transcribed for learning cycle {n} (index {index})"
            )));
        }
    }
    let interference = layout.index_of(CycleKind::Interference);
    if !present.contains(&interference) {
        warnings.push(ValidationWarning::general(format!(
            "no words transcribed for the interference cycle (index {interference})"
        )));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECOGNITION_JSON: &str = r#"{
        "source": "ravlt-abc-1.wav",
        "combinedRecognizedPhrases": [{"display": "Drum, curtain."}],
        "recognizedPhrases": [
            {
                "nBest": [
                    {
                        "display": "Drum, curtain.",
                        "words": [
                            {"word": "drum", "offsetMilliseconds": 400, "durationMilliseconds": 320, "confidence": 0.93},
                            {"word": "curtain", "offsetMilliseconds": 900, "durationMilliseconds": 410, "confidence": 0.88}
                        ]
                    },
                    {"display": "Drum, certain.", "words": [{"word": "certain"}]}
                ]
            },
            {"nBest": []},
            {"nBest": [{"words": [{"word": "bell"}]}]}
        ]
    }"#;

    #[test]
    fn word_list_skips_blanks_and_comments() {
        let list = parse_word_list_str("# list A\ndrum\n\n  curtain \nbell\n");
        assert_eq!(list.words(), ["drum", "curtain", "bell"]);
    }

    #[test]
    fn cycle_index_from_names() {
        assert_eq!(cycle_index_from_file_name("ravlt-abc-3.wav.json"), Some(3));
        assert_eq!(cycle_index_from_file_name("x-12.wav.json"), Some(12));
        assert_eq!(cycle_index_from_file_name("report.json"), None);
        assert_eq!(cycle_index_from_file_name("abc-.wav.json"), None);
        assert_eq!(cycle_index_from_file_name("abc-1a.wav.json"), None);
    }

    #[test]
    fn recognition_takes_top_hypothesis() {
        let words = parse_recognition_str(RECOGNITION_JSON, 1).unwrap();
        let text: Vec<&str> = words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(text, ["drum", "curtain", "bell"]);
        assert!(words.iter().all(|w| w.cycle_index == 1));
        assert_eq!(words[0].offset_ms, Some(400));
        assert_eq!(words[1].confidence, Some(0.88));
        assert_eq!(words[2].duration_ms, None);
    }

    #[test]
    fn plain_array_transcription() {
        let words =
            parse_transcription_str(r#"[{"word":"appel","cycle_index":0},{"word":"chair","cycle_index":1}]"#)
                .unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[1], TranscribedWord::new("chair", 1));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_transcription_str("{not json").is_err());
        assert!(parse_recognition_str("[1,2]", 0).is_err());
    }

    #[test]
    fn load_directory_in_cycle_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("t-2.wav.json"),
            r#"{"recognizedPhrases":[{"nBest":[{"words":[{"word":"second"}]}]}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("t-0.wav.json"), RECOGNITION_JSON).unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let words = load_transcription(dir.path()).unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(words[0].cycle_index, 0);
        assert_eq!(words[3].word, "second");
        assert_eq!(words[3].cycle_index, 2);
    }

    #[test]
    fn load_single_files() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("words.json");
        std::fs::write(&plain, r#"[{"word":"cat","cycle_index":4}]"#).unwrap();
        assert_eq!(load_transcription(&plain).unwrap()[0].cycle_index, 4);

        let recognized = dir.path().join("trial-5.wav.json");
        std::fs::write(&recognized, RECOGNITION_JSON).unwrap();
        assert!(load_transcription(&recognized)
            .unwrap()
            .iter()
            .all(|w| w.cycle_index == 5));
    }

    #[test]
    fn validate_word_list_issues() {
        let list: WordList = ["drum", "drum", "ice-cream", "Bell", "bell"].into_iter().collect();
        let warnings = validate_word_list(&list);
        assert!(warnings.iter().any(|w| w.message.contains("duplicate word: drum")));
        assert!(warnings.iter().any(|w| w.message.contains("non-alphabetic")));
        assert!(warnings.iter().any(|w| w.message.contains("only in case")));
        assert!(validate_word_list(&WordList::default())
            .iter()
            .any(|w| w.message.contains("empty")));
    }

    #[test]
    fn clean_word_list_has_no_warnings() {
        let list: WordList = ["drum", "curtain", "bell"].into_iter().collect();
        assert!(validate_word_list(&list).is_empty());
    }

    #[test]
    fn validate_transcription_reports_gaps() {
        let words = vec![
            TranscribedWord::new("drum", 0),
            TranscribedWord::new("bell", 9),
        ];
        let warnings = validate_transcription(&words, CycleLayout::default());
        assert!(warnings.iter().any(|w| w.message.contains("outside the trial layout")));
        assert!(warnings.iter().any(|w| w.message.contains("learning cycle 2")));
        assert!(warnings.iter().any(|w| w.message.contains("interference")));
        assert!(!warnings.iter().any(|w| w.message.contains("learning cycle 1 ")));
    }
}
