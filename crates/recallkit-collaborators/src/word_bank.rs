//! Word source backed by a fixed pool of words.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use recallkit_core::error::CollaboratorError;
use recallkit_core::model::{Word, WordList};
use recallkit_core::parser::load_word_list;
use recallkit_core::traits::WordSource;

/// Draws lists from a pool of distinct words, without replacement.
pub struct WordBank {
    words: Vec<Word>,
    rng: Mutex<StdRng>,
}

impl WordBank {
    /// Blank entries and repeats are dropped; first occurrence wins.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Word>,
    {
        Self::with_rng(words, StdRng::from_entropy())
    }

    /// Reproducible draws.
    pub fn seeded<I, S>(words: I, seed: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Word>,
    {
        Self::with_rng(words, StdRng::seed_from_u64(seed))
    }

    fn with_rng<I, S>(words: I, rng: StdRng) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Word>,
    {
        let mut seen = HashSet::new();
        let words = words
            .into_iter()
            .map(|w| w.into().trim().to_string())
            .filter(|w| !w.is_empty() && seen.insert(w.clone()))
            .collect();
        Self {
            words,
            rng: Mutex::new(rng),
        }
    }

    /// Load a newline-separated word file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let list = load_word_list(path)?;
        let bank = Self::new(list.iter().cloned());
        tracing::debug!(words = bank.len(), "loaded word bank from {}", path.display());
        Ok(bank)
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Pick `count` distinct words not in `excluding`.
    pub fn draw(&self, count: usize, excluding: &WordList) -> Result<WordList, CollaboratorError> {
        let eligible: Vec<&Word> = self
            .words
            .iter()
            .filter(|w| !excluding.contains(w))
            .collect();
        if eligible.len() < count {
            return Err(CollaboratorError::InsufficientWords {
                requested: count,
                available: eligible.len(),
            });
        }

        let mut rng = self
            .rng
            .lock()
            .map_err(|_| CollaboratorError::Storage("word bank rng poisoned".into()))?;
        Ok(eligible
            .choose_multiple(&mut *rng, count)
            .map(|w| (*w).clone())
            .collect())
    }
}

#[async_trait]
impl WordSource for WordBank {
    fn name(&self) -> &str {
        "word-bank"
    }

    async fn generate(
        &self,
        count: usize,
        excluding: &WordList,
    ) -> Result<WordList, CollaboratorError> {
        self.draw(count, excluding)
    }
}
