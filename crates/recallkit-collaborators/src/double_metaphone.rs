//! Double Metaphone phonetic codes via `rphonetic`.

use rphonetic::{DoubleMetaphone, Encoder};

use recallkit_core::error::PhoneticError;
use recallkit_core::model::PhoneticCode;
use recallkit_core::phonetic::PhoneticEncoder;

/// Primary and alternate Double Metaphone codes (4 characters).
#[derive(Default)]
pub struct DoubleMetaphoneEncoder {
    inner: DoubleMetaphone,
}

impl DoubleMetaphoneEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PhoneticEncoder for DoubleMetaphoneEncoder {
    fn name(&self) -> &str {
        "double-metaphone"
    }

    fn encode(&self, word: &str) -> Result<PhoneticCode, PhoneticError> {
        let letters: String = word.chars().filter(char::is_ascii_alphabetic).collect();
        if letters.is_empty() {
            return Err(PhoneticError::Unencodable(word.to_string()));
        }
        let primary = self.inner.encode(&letters);
        if primary.is_empty() {
            return Err(PhoneticError::Unencodable(word.to_string()));
        }
        Ok(PhoneticCode::new(
            primary,
            self.inner.encode_alternate(&letters),
        ))
    }
}
