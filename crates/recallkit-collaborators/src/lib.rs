//! recallkit-collaborators: concrete collaborators for recallkit.
//!
//! A random word bank, the Double Metaphone phonetic encoder, the
//! filesystem store used by the CLI, and in-memory mocks for tests and
//! dry runs.

pub mod config;
pub mod double_metaphone;
pub mod fs_store;
pub mod mock;
pub mod word_bank;

pub use config::{load_config, load_config_from, RecallkitConfig};
pub use double_metaphone::DoubleMetaphoneEncoder;
pub use fs_store::FsStore;
pub use word_bank::WordBank;
