use classroom_core::sequencer::EngineTimings;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory holding `week{N}.json` lesson files.
    pub content_dir: PathBuf,
    /// Remote manifest root. Manifests are read from disk when unset.
    pub manifest_base_url: Option<String>,
    pub progress_path: PathBuf,
    pub log_level: Level,
    pub entry_delay: Duration,
    pub first_entry_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let content_dir = std::env::var("CONTENT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./content"));

        let manifest_base_url = match std::env::var("MANIFEST_BASE_URL") {
            Ok(url) if url.trim().is_empty() => None,
            Ok(url) => {
                let url = url.trim().trim_end_matches('/').to_string();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::InvalidValue(
                        "MANIFEST_BASE_URL".to_string(),
                        format!("'{}' is not an http(s) URL", url),
                    ));
                }
                Some(url)
            }
            Err(_) => None,
        };

        let progress_path = std::env::var("PROGRESS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./classroom-progress.json"));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let defaults = EngineTimings::default();
        let entry_delay = millis_var("ENTRY_DELAY_MS", defaults.entry_delay)?;
        let first_entry_delay = millis_var("FIRST_ENTRY_DELAY_MS", defaults.first_entry_delay)?;

        Ok(Self {
            content_dir,
            manifest_base_url,
            progress_path,
            log_level,
            entry_delay,
            first_entry_delay,
        })
    }

    pub fn timings(&self) -> EngineTimings {
        EngineTimings {
            entry_delay: self.entry_delay,
            first_entry_delay: self.first_entry_delay,
        }
    }

    /// Root of the on-disk audio manifests, `{content_dir}/audio`.
    pub fn audio_dir(&self) -> PathBuf {
        self.content_dir.join("audio")
    }
}

fn millis_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
