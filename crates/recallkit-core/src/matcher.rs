//! Combined orthographic + phonetic dissimilarity between two words.
//!
//! A transcription error may corrupt spelling or may be a mis-hearing that
//! keeps the sound. The matcher takes the smaller of the two channels, and
//! on the phonetic side the smallest of the four primary/secondary pairings.

use std::sync::Arc;

use crate::distance::edit_distance;
use crate::model::{PhoneticCode, Word};
use crate::phonetic::{encode_or_empty, PhoneticEncoder};

/// A word together with its phonetic code, so each word is encoded once per
/// scoring run rather than once per comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedWord {
    pub word: Word,
    pub code: PhoneticCode,
}

/// Both channels of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distances {
    pub orthographic: usize,
    /// `None` when no pairing had two non-empty codes.
    pub phonetic: Option<usize>,
    pub combined: usize,
}

/// Compares target and candidate words.
#[derive(Clone)]
pub struct WordMatcher {
    encoder: Arc<dyn PhoneticEncoder>,
}

impl WordMatcher {
    pub fn new(encoder: Arc<dyn PhoneticEncoder>) -> Self {
        Self { encoder }
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    pub fn encode(&self, word: &str) -> EncodedWord {
        EncodedWord {
            word: word.to_string(),
            code: encode_or_empty(self.encoder.as_ref(), word),
        }
    }

    /// `min(orthographic, phonetic)` for a single pair of words.
    pub fn combined_distance(&self, target: &str, candidate: &str) -> usize {
        self.compare(&self.encode(target), &self.encode(candidate))
            .combined
    }

    pub fn compare(&self, target: &EncodedWord, candidate: &EncodedWord) -> Distances {
        let orthographic = edit_distance(&target.word, &candidate.word);
        let phonetic = phonetic_distance(&target.code, &candidate.code);
        let combined = phonetic.map_or(orthographic, |p| p.min(orthographic));
        Distances {
            orthographic,
            phonetic,
            combined,
        }
    }
}

/// Smallest edit distance over the pairings (p1,p2), (s1,s2), (p1,s2),
/// (s1,p2). A pairing with an empty side is maximally distant and skipped.
pub fn phonetic_distance(a: &PhoneticCode, b: &PhoneticCode) -> Option<usize> {
    [
        (&a.primary, &b.primary),
        (&a.secondary, &b.secondary),
        (&a.primary, &b.secondary),
        (&a.secondary, &b.primary),
    ]
    .into_iter()
    .filter(|(x, y)| !x.is_empty() && !y.is_empty())
    .map(|(x, y)| edit_distance(x, y))
    .min()
}
