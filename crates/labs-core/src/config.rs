use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LabsConfig {
    pub base_url: String,
    /// Environment variable holding the API key. Read on every request.
    pub api_key_env: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub assistant_model: String,
    pub image_model: String,
    pub video_model: String,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: Option<u32>,
}

impl Default for LabsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            api_key: None,
            chat_model: "gemini-3-pro-preview".to_string(),
            assistant_model: "gemini-3-flash-preview".to_string(),
            image_model: "gemini-3-pro-image-preview".to_string(),
            video_model: "veo-3.1-fast-generate-preview".to_string(),
            poll_interval_ms: 10_000,
            max_poll_attempts: Some(90),
        }
    }
}

impl LabsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let config: LabsConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Invalid config {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("labs").join("config.json"))
    }

    /// Current API key: the environment first, then the stored key.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
    }

    pub fn require_api_key(&self) -> Result<String> {
        self.api_key().ok_or_else(|| {
            anyhow!(
                "No API key configured. Set {} or add api_key to the config file",
                self.api_key_env
            )
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
