use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-platform bot credentials. Mirrors `original_source/utils/config.py`'s
/// `{appid, secret, sandbox}` shape, one block per supported platform.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlatformConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub appid: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub sandbox: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub qq: PlatformConfig,
    #[serde(default)]
    pub kook: PlatformConfig,
    #[serde(default)]
    pub heybox: PlatformConfig,
}

fn default_update_interval() -> u64 {
    90
}

fn default_player_ttl_multiplier() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonConfig {
    pub current: String,
    /// All configured season ids, historical ones first (deterministic
    /// init order per SM §4.6).
    pub seasons: Vec<String>,
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    /// Open question #1 resolved: kept parameterizable, default 2.
    #[serde(default = "default_player_ttl_multiplier")]
    pub player_ttl_multiplier: u32,
}

impl SeasonConfig {
    pub fn is_current(&self, season_id: &str) -> bool {
        season_id == self.current
    }
}

fn default_api_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub standard_base_url: String,
    #[serde(default)]
    pub backup_base_url: Option<String>,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub use_proxy: bool,
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: u8,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_redis_timeout")]
    pub timeout_secs: u64,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

impl KvConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(pw) if !pw.is_empty() => {
                format!("redis://:{}@{}:{}/{}", pw, self.host, self.port, self.db)
            }
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageSendMethod {
    #[default]
    Url,
    Base64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranslationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncementItem {
    pub id: String,
    pub message: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnnouncementsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub items: Vec<AnnouncementItem>,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_max_workers() -> usize {
    4
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_image_dir() -> String {
    "static/temp_images".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub platforms: PlatformsConfig,
    pub season: SeasonConfig,
    pub api: ApiConfig,
    pub kv: KvConfig,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub image_send_method: ImageSendMethod,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub announcements: AnnouncementsConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    /// Base URL this process is reachable at, used to build image-serving
    /// links when `image_send_method = "url"`. Falls back to base64
    /// inlining (§6.1) when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e))?;
        let cfg: Config = toml::from_str(&text).map_err(ConfigError::Parse)?;
        Ok(cfg)
    }

    /// Load from `CONFIG_PATH`, falling back to `config/config.toml`, the
    /// same override-by-env-var style as the teacher's `RateLimitConfig`.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.toml".into());
        Self::load(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let text = r#"
            [season]
            current = "s6"
            seasons = ["cb1", "s6"]

            [api]
            standard_base_url = "https://api.example.com/v1"

            [kv]
            host = "127.0.0.1"
        "#;
        let cfg: Config = toml::from_str(text).unwrap();
        assert_eq!(cfg.season.current, "s6");
        assert_eq!(cfg.season.player_ttl_multiplier, 2);
        assert_eq!(cfg.max_concurrent, 5);
        assert_eq!(cfg.kv.url(), "redis://127.0.0.1:6379/0");
    }
}
