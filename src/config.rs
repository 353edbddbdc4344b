use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_REVEAL_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_MAX_ANSWER_LEN: usize = 40;

#[derive(Debug, Error)]
#[error("{key} must be a non-negative integer, got {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub reveal_delay: Duration,
    pub max_answer_len: usize,
    /// JSON array of quizzes the driver seeds its store with.
    pub seed_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reveal_delay: DEFAULT_REVEAL_DELAY,
            max_answer_len: DEFAULT_MAX_ANSWER_LEN,
            seed_file: None,
        }
    }
}

impl EngineConfig {
    /// Reads `QUIZ_*` variables, loading a `.env` file first if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenv::dotenv() {
            log::debug!("no .env file loaded: {err}");
        }

        let mut config = Self::default();
        if let Some(ms) = read_u64("QUIZ_REVEAL_DELAY_MS")? {
            config.reveal_delay = Duration::from_millis(ms);
        }
        if let Some(len) = read_u64("QUIZ_MAX_ANSWER_LEN")? {
            config.max_answer_len = len as usize;
        }
        config.seed_file = std::env::var_os("QUIZ_SEED_FILE").map(PathBuf::from);
        Ok(config)
    }

    pub fn with_reveal_delay(mut self, reveal_delay: Duration) -> Self {
        self.reveal_delay = reveal_delay;
        self
    }
}

fn read_u64(key: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError { key, value }),
        },
        Err(_) => Ok(None),
    }
}
