use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::info;

use crate::config::LabsConfig;

/// Host-provided key selection, consulted before every image or video call.
#[async_trait]
pub trait CredentialCapability: Send + Sync {
    async fn has_selected_credential(&self) -> bool;

    /// Asks the user to pick a key. Returns once the selection flow ends;
    /// `Err` means nothing usable was selected.
    async fn prompt_credential_selection(&self) -> Result<()>;
}

/// Treats a key in the environment or config file as the selection.
///
/// There is no interactive flow to open, so prompting only re-checks and
/// reports where a key should go.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    config: LabsConfig,
}

impl EnvCredential {
    pub fn new(config: LabsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CredentialCapability for EnvCredential {
    async fn has_selected_credential(&self) -> bool {
        self.config.api_key().is_some()
    }

    async fn prompt_credential_selection(&self) -> Result<()> {
        if self.config.api_key().is_some() {
            info!("API key became available");
            return Ok(());
        }
        Err(anyhow!(
            "Select an API key by setting {} before generating images or video",
            self.config.api_key_env
        ))
    }
}
