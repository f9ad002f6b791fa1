//! The `recallkit validate` command.

use std::path::PathBuf;

use anyhow::Result;

use recallkit_collaborators::config::load_config_from;
use recallkit_core::model::CycleLayout;
use recallkit_core::parser::{self, ValidationWarning};

pub fn execute(
    word_list: Option<PathBuf>,
    transcription: Option<PathBuf>,
    learning_cycles: Option<u8>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut total_warnings = 0;

    if let Some(path) = word_list {
        let list = parser::load_word_list(&path)?;
        println!("Word list: {} ({} words)", path.display(), list.len());
        total_warnings += print_warnings(&parser::validate_word_list(&list));
    }

    if let Some(path) = transcription {
        let cycles = match learning_cycles {
            Some(n) => n,
            None => load_config_from(config_path.as_deref())?.session.learning_cycles,
        };
        anyhow::ensure!(cycles >= 1, "learning cycles must be at least 1");

        let words = parser::load_transcription(&path)?;
        println!(
            "Transcription: {} ({} words, {} learning cycles)",
            path.display(),
            words.len(),
            cycles
        );
        total_warnings +=
            print_warnings(&parser::validate_transcription(&words, CycleLayout::new(cycles)));
    }

    if total_warnings == 0 {
        println!("No problems found.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}

fn print_warnings(warnings: &[ValidationWarning]) -> usize {
    for w in warnings {
        let prefix = w
            .word
            .as_ref()
            .map(|word| format!("  [{word}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }
    warnings.len()
}
