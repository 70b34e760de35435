use serde::Deserialize;
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File read error")]
    FileError,

    #[error("Deserialization error:{0}")]
    DeserializationError(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub port: u16,
    pub log_level: String,
    pub autosave: AutoSaveConfig,
    pub deepsearch: DeepSearchConfig,
    pub email: EmailConfig,
    pub contractor: ContractorConfig,
    pub pdf: PdfConfig,
    #[serde(default = "default_client_cache_secs")]
    pub client_cache_secs: u64,
    /// Idle time before an open estimate session is evicted. Eviction drops
    /// the session's auto-save handle, which flushes any pending change.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AutoSaveConfig {
    /// Quiet period before a changed estimate is flushed to storage.
    pub debounce_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeepSearchConfig {
    pub system_prompt: String,
    pub model: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    pub service_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContractorConfig {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PdfConfig {
    pub letterhead: Option<String>,
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_client_cache_secs() -> u64 {
    300
}

fn default_session_idle_secs() -> u64 {
    3600
}

#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
}

impl Context {
    pub fn new(config_file: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            config: Config::new(config_file)?,
        })
    }
}

impl Config {
    pub fn new(config_file: &str) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(config_file).map_err(|_| ConfigError::FileError)?;
        let config: Config = serde_json::from_str(&config_str)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        Ok(config)
    }
}
