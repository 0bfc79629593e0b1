//! Configuration management for Gemcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

pub const DEFAULT_CAPTION_MODELS: [&str; 2] = ["gemini-2.0-flash-exp", "gemini-1.5-flash"];
pub const DEFAULT_PROMPT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_URL: &str = "https://image.pollinations.ai/prompt";
pub const DEFAULT_PLATFORM: &str = "twitter";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    pub twitter: Option<TwitterConfig>,
    pub facebook: Option<FacebookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/gemcast/gemcast.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Falls back to `GEMINI_API_KEY`
    pub api_key: Option<String>,
    /// Caption models, tried in order
    #[serde(default = "default_caption_models")]
    pub models: Vec<String>,
    #[serde(default = "default_prompt_model")]
    pub prompt_model: String,
    #[serde(default = "default_gemini_url")]
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            models: default_caption_models(),
            prompt_model: default_prompt_model(),
            base_url: default_gemini_url(),
        }
    }
}

impl GeminiConfig {
    /// The configured key, or `GEMINI_API_KEY` from the environment
    pub fn resolve_api_key(&self) -> Result<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| env_value("GEMINI_API_KEY"))
            .ok_or_else(|| {
                ConfigError::MissingField("gemini.api_key (or GEMINI_API_KEY)".to_string()).into()
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_url")]
    pub base_url: String,
    #[serde(default = "default_true")]
    pub nologo: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_url: default_image_url(),
            nologo: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Directory that `/uploads/...` file URIs are resolved against
    pub root: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            root: "~/.local/share/gemcast/public".to_string(),
        }
    }
}

impl UploadsConfig {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.root).to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Seconds before the first cycle after startup
    #[serde(default = "default_initial_delay")]
    pub initial_delay: u64,
    #[serde(default = "default_true")]
    pub generate_images: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            initial_delay: default_initial_delay(),
            generate_images: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    pub platforms: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            platforms: vec![DEFAULT_PLATFORM.to_string()],
        }
    }
}

/// Twitter/X OAuth 1.0a user-context credentials
///
/// Each field falls back to its `TWITTER_*` environment variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwitterConfig {
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    pub access_token: Option<String>,
    pub access_secret: Option<String>,
}

impl TwitterConfig {
    /// Fill unset fields from the environment
    pub fn with_env_fallback(&self) -> Self {
        Self {
            app_key: self.app_key.clone().or_else(|| env_value("TWITTER_APP_KEY")),
            app_secret: self.app_secret.clone().or_else(|| env_value("TWITTER_APP_SECRET")),
            access_token: self
                .access_token
                .clone()
                .or_else(|| env_value("TWITTER_ACCESS_TOKEN")),
            access_secret: self
                .access_secret
                .clone()
                .or_else(|| env_value("TWITTER_ACCESS_SECRET")),
        }
    }
}

/// Facebook Page credentials
///
/// Fields fall back to `FACEBOOK_PAGE_ID` and `FACEBOOK_ACCESS_TOKEN`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacebookConfig {
    pub page_id: Option<String>,
    pub access_token: Option<String>,
}

impl FacebookConfig {
    pub fn with_env_fallback(&self) -> Self {
        Self {
            page_id: self.page_id.clone().or_else(|| env_value("FACEBOOK_PAGE_ID")),
            access_token: self
                .access_token
                .clone()
                .or_else(|| env_value("FACEBOOK_ACCESS_TOKEN")),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file yields the built-in defaults.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default_config());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.poll_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.poll_interval".to_string(),
                reason: "must be at least 1 second".to_string(),
            }
            .into());
        }
        if self.gemini.models.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "gemini.models".to_string(),
                reason: "at least one caption model is required".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Platforms targeted when a request names none
    pub fn default_platforms(&self) -> Vec<String> {
        if self.defaults.platforms.is_empty() {
            vec![DEFAULT_PLATFORM.to_string()]
        } else {
            self.defaults.platforms.clone()
        }
    }
}

/// Resolve the configuration file path under the XDG config directory
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("GEMCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("gemcast").join("config.toml"))
}

/// Resolve the database path: `GEMCAST_DB_PATH` wins over the config value
pub fn resolve_db_path(config_path: &str) -> String {
    std::env::var("GEMCAST_DB_PATH")
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| config_path.to_string())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn default_caption_models() -> Vec<String> {
    DEFAULT_CAPTION_MODELS.iter().map(|m| m.to_string()).collect()
}

fn default_prompt_model() -> String {
    DEFAULT_PROMPT_MODEL.to_string()
}

fn default_gemini_url() -> String {
    DEFAULT_GEMINI_URL.to_string()
}

fn default_image_url() -> String {
    DEFAULT_IMAGE_URL.to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_initial_delay() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.gemini.models, vec!["gemini-2.0-flash-exp", "gemini-1.5-flash"]);
        assert_eq!(config.scheduler.poll_interval, 60);
        assert_eq!(config.scheduler.initial_delay, 5);
        assert!(config.scheduler.generate_images);
        assert_eq!(config.default_platforms(), vec!["twitter"]);
        assert!(config.twitter.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(
            r#"
[database]
path = "/tmp/gems.db"

[gemini]
api_key = "abc"
models = ["gemini-1.5-pro"]

[scheduler]
poll_interval = 30
generate_images = false

[defaults]
platforms = ["twitter", "facebook"]

[facebook]
page_id = "42"
"#,
        )
        .unwrap();

        assert_eq!(config.database.path, "/tmp/gems.db");
        assert_eq!(config.gemini.resolve_api_key().unwrap(), "abc");
        assert_eq!(config.gemini.models, vec!["gemini-1.5-pro"]);
        assert_eq!(config.gemini.prompt_model, "gemini-2.0-flash-exp");
        assert_eq!(config.scheduler.poll_interval, 30);
        assert!(!config.scheduler.generate_images);
        assert_eq!(config.default_platforms(), vec!["twitter", "facebook"]);
        assert_eq!(config.facebook.unwrap().page_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = Config::from_toml("[scheduler]\npoll_interval = 0\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("poll_interval"));
    }

    #[test]
    fn test_empty_model_list_rejected() {
        assert!(Config::from_toml("[gemini]\nmodels = []\n").is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml("[database\npath = ");
        assert!(matches!(
            result,
            Err(crate::GemcastError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_api_key_env_fallback() {
        std::env::set_var("GEMINI_API_KEY", "from-env");
        let config = Config::default_config();
        assert_eq!(config.gemini.resolve_api_key().unwrap(), "from-env");

        std::env::remove_var("GEMINI_API_KEY");
        assert!(config.gemini.resolve_api_key().is_err());
    }

    #[test]
    #[serial]
    fn test_twitter_env_fallback_keeps_explicit_values() {
        std::env::set_var("TWITTER_APP_KEY", "env-key");
        std::env::set_var("TWITTER_ACCESS_TOKEN", "env-token");

        let config = TwitterConfig {
            app_key: Some("file-key".to_string()),
            ..Default::default()
        }
        .with_env_fallback();

        assert_eq!(config.app_key.as_deref(), Some("file-key"));
        assert_eq!(config.access_token.as_deref(), Some("env-token"));

        std::env::remove_var("TWITTER_APP_KEY");
        std::env::remove_var("TWITTER_ACCESS_TOKEN");
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_from_env() {
        std::env::set_var("GEMCAST_CONFIG", "/etc/gemcast.toml");
        assert_eq!(resolve_config_path().unwrap(), PathBuf::from("/etc/gemcast.toml"));
        std::env::remove_var("GEMCAST_CONFIG");
    }

    #[test]
    #[serial]
    fn test_resolve_db_path_env_override() {
        std::env::set_var("GEMCAST_DB_PATH", "/tmp/override.db");
        assert_eq!(resolve_db_path("~/x.db"), "/tmp/override.db");
        std::env::remove_var("GEMCAST_DB_PATH");
        assert_eq!(resolve_db_path("~/x.db"), "~/x.db");
    }
}
