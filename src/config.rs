//! # Configuration Module
//!
//! Loads and saves the credentials file (`.aitest_config.json` by default).
//! The file holds provider API keys, optional endpoint overrides and request
//! settings. Keys missing from the file fall back to `OPENAI_API_KEY` and
//! `ANTHROPIC_API_KEY`.

use crate::llm::Provider;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_FILE: &str = ".aitest_config.json";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_base_url: Option<String>,
    /// Completion budget used when a prompt does not set its own.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Extra attempts after the first one for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    1000
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_key: None,
            anthropic_key: None,
            openai_base_url: None,
            anthropic_base_url: None,
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Loads the configuration file and fills missing keys from the environment.
    ///
    /// A missing or malformed file is an error: the run must not start
    /// without an explicit configuration.
    pub fn load(config_file_path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(config_file_path).with_context(|| {
            format!(
                "Failed to read config file at: {} (run `aitest configure` to create it)",
                config_file_path.display()
            )
        })?;
        let config: Config = serde_json::from_str(&config_str).with_context(|| {
            format!("Failed to parse config file: {}", config_file_path.display())
        })?;
        debug!("Config file parsed: {}", config_file_path.display());

        Ok(config.with_env_lookup(|name| std::env::var(name).ok()))
    }

    /// Loads the file if it exists, otherwise starts from defaults.
    /// Used by `configure`, which is how a first config gets written.
    pub fn load_or_default(config_file_path: &Path) -> Result<Self> {
        if config_file_path.exists() {
            let config_str = fs::read_to_string(config_file_path).with_context(|| {
                format!("Failed to read config file at: {}", config_file_path.display())
            })?;
            serde_json::from_str(&config_str).with_context(|| {
                format!("Failed to parse config file: {}", config_file_path.display())
            })
        } else {
            Ok(Config::default())
        }
    }

    /// Fills keys absent from the file using `lookup` on the provider's env var.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for provider in Provider::ALL {
            let slot = self.key_slot(provider);
            if slot.as_deref().map_or(true, |k| k.trim().is_empty()) {
                if let Some(env_key) = lookup(provider.api_key_env_var()) {
                    debug!("Using {} from the environment.", provider.api_key_env_var());
                    *slot = Some(env_key);
                }
            }
        }
        self
    }

    fn key_slot(&mut self, provider: Provider) -> &mut Option<String> {
        match provider {
            Provider::OpenAI => &mut self.openai_key,
            Provider::Anthropic => &mut self.anthropic_key,
        }
    }

    pub fn api_key(&self, provider: Provider) -> Option<String> {
        let key = match provider {
            Provider::OpenAI => &self.openai_key,
            Provider::Anthropic => &self.anthropic_key,
        };
        key.as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    pub fn set_api_key(&mut self, provider: Provider, key: Option<String>) {
        *self.key_slot(provider) = key.filter(|k| !k.trim().is_empty());
    }

    pub fn base_url(&self, provider: Provider) -> Option<String> {
        match provider {
            Provider::OpenAI => self.openai_base_url.clone(),
            Provider::Anthropic => self.anthropic_base_url.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Writes the configuration as pretty JSON, readable only by the owner.
    pub fn save(&self, config_file_path: &Path) -> Result<()> {
        if let Some(parent) = config_file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_file_path, content).with_context(|| {
            format!("Failed to write config file: {}", config_file_path.display())
        })?;
        restrict_permissions(config_file_path)?;
        info!("API keys saved to {}", config_file_path.display());
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Shows the first and last few characters of a key.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
