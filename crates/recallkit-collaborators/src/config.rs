//! recallkit configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use recallkit_core::engine::ScoringConfig;
use recallkit_core::model::MatchingStrategy;
use recallkit_core::session::SessionConfig;

/// File name searched for in the current directory.
pub const CONFIG_FILE_NAME: &str = "recallkit.toml";

/// Top-level recallkit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallkitConfig {
    /// Root of the filesystem store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Newline-separated word file the word bank draws from.
    #[serde(default = "default_word_bank")]
    pub word_bank: PathBuf,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
}

/// `[session]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_words_per_list")]
    pub words_per_list: usize,
    #[serde(default = "default_learning_cycles")]
    pub learning_cycles: u8,
    #[serde(default = "default_countdown")]
    pub countdown_from: u32,
    #[serde(default = "default_inter_word_delay")]
    pub inter_word_delay_secs: f64,
    #[serde(default = "default_max_recording")]
    pub max_recording_secs: u64,
    /// Enables the delayed-recall phase.
    #[serde(default)]
    pub delayed_recall_secs: Option<u64>,
}

/// `[scoring]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub strategy: MatchingStrategy,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_retries")]
    pub max_transcription_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./recallkit-data")
}
fn default_word_bank() -> PathBuf {
    PathBuf::from("./words.txt")
}
fn default_words_per_list() -> usize {
    10
}
fn default_learning_cycles() -> u8 {
    4
}
fn default_countdown() -> u32 {
    3
}
fn default_inter_word_delay() -> f64 {
    1.0
}
fn default_max_recording() -> u64 {
    120
}
fn default_parallelism() -> usize {
    4
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}

impl Default for RecallkitConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            word_bank: default_word_bank(),
            session: SessionSettings::default(),
            scoring: ScoringSettings::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            words_per_list: default_words_per_list(),
            learning_cycles: default_learning_cycles(),
            countdown_from: default_countdown(),
            inter_word_delay_secs: default_inter_word_delay(),
            max_recording_secs: default_max_recording(),
            delayed_recall_secs: None,
        }
    }
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            strategy: MatchingStrategy::default(),
            parallelism: default_parallelism(),
            max_transcription_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl SessionSettings {
    pub fn to_session_config(&self) -> Result<SessionConfig> {
        if self.words_per_list == 0 {
            anyhow::bail!("session.words_per_list must be at least 1");
        }
        if self.learning_cycles == 0 {
            anyhow::bail!("session.learning_cycles must be at least 1");
        }
        let inter_word_delay = Duration::try_from_secs_f64(self.inter_word_delay_secs)
            .with_context(|| {
                format!(
                    "session.inter_word_delay_secs is not a valid duration: {}",
                    self.inter_word_delay_secs
                )
            })?;
        Ok(SessionConfig {
            words_per_list: self.words_per_list,
            learning_cycles: self.learning_cycles,
            countdown_from: self.countdown_from,
            inter_word_delay,
            max_recording: Duration::from_secs(self.max_recording_secs),
            delayed_recall: self.delayed_recall_secs.map(Duration::from_secs),
        })
    }
}

impl ScoringSettings {
    pub fn to_scoring_config(&self) -> ScoringConfig {
        ScoringConfig {
            parallelism: self.parallelism.max(1),
            max_transcription_retries: self.max_transcription_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl RecallkitConfig {
    /// Render as TOML, as written by `recallkit init`.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    /// Directory holding one trial's files.
    pub fn trial_dir(&self, container: &str) -> PathBuf {
        self.data_dir.join(container)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

fn resolve_path(path: &Path) -> PathBuf {
    PathBuf::from(resolve_env_vars(&path.to_string_lossy()))
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `recallkit.toml` in the current directory
/// 2. `~/.config/recallkit/config.toml`
///
/// Environment variable overrides: `RECALLKIT_DATA_DIR`, `RECALLKIT_WORD_BANK`.
pub fn load_config() -> Result<RecallkitConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<RecallkitConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            parse_config(&path)?
        }
        None => RecallkitConfig::default(),
    };

    // Apply env var overrides
    if let Ok(dir) = std::env::var("RECALLKIT_DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Ok(bank) = std::env::var("RECALLKIT_WORD_BANK") {
        config.word_bank = PathBuf::from(bank);
    }

    config.data_dir = resolve_path(&config.data_dir);
    config.word_bank = resolve_path(&config.word_bank);

    config.session.to_session_config()?;
    Ok(config)
}

fn parse_config(path: &Path) -> Result<RecallkitConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<RecallkitConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("recallkit"))
}
