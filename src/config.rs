use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::ai::gemini::{DEFAULT_BASE_URL, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use crate::error::ChatError;
use crate::mode::Mode;

/// Environment variables checked for the API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub text_model: Option<String>,
    pub image_model: Option<String>,
    pub base_url: Option<String>,
    pub default_mode: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub download_dir: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the config file, falling back to defaults when it doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_default_mode(mode: Mode) -> Result<()> {
        Self::save_default_mode_to(&Self::get_config_path()?, mode)
    }

    /// Record `mode` in the file at `path`. A file that fails to parse is left alone.
    pub fn save_default_mode_to(path: &Path, mode: Mode) -> Result<()> {
        let mut config = Self::load_from(path)?;
        config.default_mode = Some(mode.as_str().to_string());
        config.save_to(path)
    }

    /// Apply `GEMINI_*` environment overrides on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("GEMINI_TEXT_MODEL") {
            self.text_model = Some(model);
        }
        if let Ok(model) = std::env::var("GEMINI_IMAGE_MODEL") {
            self.image_model = Some(model);
        }
        if let Ok(url) = std::env::var("GEMINI_BASE_URL") {
            self.base_url = Some(url);
        }
        self
    }

    pub fn text_model(&self) -> &str {
        self.text_model.as_deref().unwrap_or(DEFAULT_TEXT_MODEL)
    }

    pub fn image_model(&self) -> &str {
        self.image_model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn mode(&self) -> Mode {
        self.default_mode
            .as_deref()
            .and_then(Mode::from_str)
            .unwrap_or_default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Where saved images go: configured dir, else the user's downloads, else `.`.
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("gemini-chat/", env!("CARGO_PKG_VERSION")))
            .timeout(self.request_timeout())
            .build()?;
        Ok(client)
    }

    /// The API key from the environment. Its absence is fatal.
    pub fn api_key() -> std::result::Result<String, ChatError> {
        api_key_from(|name| std::env::var(name).ok())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("gemini-chat").join("config.json"))
    }

    /// Directory for log files.
    pub fn get_log_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join("gemini-chat").join("logs"))
    }
}

fn api_key_from(lookup: impl Fn(&str) -> Option<String>) -> std::result::Result<String, ChatError> {
    API_KEY_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .find(|key| !key.trim().is_empty())
        .ok_or(ChatError::MissingCredential(API_KEY_VARS[0]))
}
