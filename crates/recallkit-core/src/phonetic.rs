//! Phonetic encoding capability consumed by the word matcher.
//!
//! The algorithm that derives codes is pluggable; the matcher only needs a
//! deterministic `encode` and treats any failure as an empty code.

use crate::error::PhoneticError;
use crate::model::PhoneticCode;

/// Turns a word into primary and secondary phonetic codes.
pub trait PhoneticEncoder: Send + Sync {
    /// Human-readable encoder name (e.g. "double-metaphone").
    fn name(&self) -> &str;

    /// Encode a word. Must be deterministic.
    fn encode(&self, word: &str) -> Result<PhoneticCode, PhoneticError>;
}

/// Total version of [`PhoneticEncoder::encode`]: on failure both codes are
/// empty, so the phonetic channel degrades to "maximally dissimilar".
pub fn encode_or_empty(encoder: &dyn PhoneticEncoder, word: &str) -> PhoneticCode {
    match encoder.encode(word) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(encoder = encoder.name(), "falling back to empty code: {e}");
            PhoneticCode::empty()
        }
    }
}
