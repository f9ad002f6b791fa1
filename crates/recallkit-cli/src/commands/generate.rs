//! The `recallkit generate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use recallkit_collaborators::config::load_config_from;
use recallkit_collaborators::WordBank;
use recallkit_core::model::WordList;

pub fn execute(
    count: usize,
    exclude: Option<String>,
    word_bank: Option<PathBuf>,
    seed: Option<u64>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(count >= 1, "count must be at least 1");

    let config = load_config_from(config_path.as_deref())?;
    let path = word_bank.unwrap_or(config.word_bank);

    let mut bank = WordBank::from_file(&path)
        .with_context(|| format!("failed to load word bank: {}", path.display()))?;
    if let Some(seed) = seed {
        bank = WordBank::seeded(bank.words().iter().cloned(), seed);
    }

    let excluding: WordList = exclude
        .as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let list = bank.draw(count, &excluding)?;
    for word in &list {
        println!("{word}");
    }

    Ok(())
}
