use crate::debounce::DEFAULT_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;

/// Storage configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one metadata document per owner
    pub meta_dir: PathBuf,
    /// Quiet interval before a scheduled save is written
    pub debounce: Duration,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `GREETING_META_DIR`: Metadata directory (supports ~ for home directory)
    ///
    /// Optional:
    /// - `GREETING_META_DEBOUNCE_MS`: Save debounce in milliseconds (default 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(
            std::env::var("GREETING_META_DIR").ok(),
            std::env::var("GREETING_META_DEBOUNCE_MS").ok(),
        )
    }

    fn from_vars(dir: Option<String>, debounce_ms: Option<String>) -> Result<Self, ConfigError> {
        let dir = dir
            .filter(|d| !d.trim().is_empty())
            .ok_or(ConfigError::MissingMetaDir)?;

        let debounce = match debounce_ms {
            Some(raw) => {
                let ms: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidDebounce(raw.clone()))?;
                Duration::from_millis(ms)
            }
            None => DEFAULT_INTERVAL,
        };

        Ok(Self {
            meta_dir: expand_tilde(&dir),
            debounce,
        })
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("GREETING_META_DIR environment variable not set")]
    MissingMetaDir,

    #[error("GREETING_META_DEBOUNCE_MS is not a number of milliseconds: {0}")]
    InvalidDebounce(String),
}
