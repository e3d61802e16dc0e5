use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Custom user-agent string for title fetches
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upper bound for a single title fetch, in seconds
    #[serde(default = "default_title_fetch_timeout_secs")]
    pub title_fetch_timeout_secs: u64,

    /// Scheme prepended to urls entered without one
    #[serde(default = "default_scheme")]
    pub default_scheme: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            title_fetch_timeout_secs: default_title_fetch_timeout_secs(),
            default_scheme: default_scheme(),
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_title_fetch_timeout_secs() -> u64 {
    5
}

fn default_scheme() -> String {
    crate::utils::DEFAULT_SCHEME.to_string()
}

impl Config {
    /// Default location (~/.config/bukusync/config.yml)
    pub fn default_path() -> PathBuf {
        crate::utils::get_config_dir().join("config.yml")
    }

    pub fn title_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.title_fetch_timeout_secs)
    }

    /// Load configuration from a file path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        if config.default_scheme.trim().is_empty() {
            return Err(crate::error::BukusyncError::Config(
                "default_scheme must not be empty".to_string(),
            ));
        }
        Ok(config)
    }

    /// Load configuration from the default location.
    /// Falls back to default config if the file doesn't exist or can't be read.
    pub fn load() -> Self {
        let config_path = Self::default_path();

        if config_path.exists() {
            match Self::load_from_path(&config_path) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!(
                        "Failed to load config from {:?}: {}; using default configuration",
                        config_path,
                        e
                    );
                    Self::default()
                }
            }
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::default_path())
    }
}
