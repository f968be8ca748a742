use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Environment variable consulted when no key is configured under `gemini.api_key`.
pub const API_KEY_ENV_FALLBACK: &str = "GOOGLE_API_KEY";

/// Service configuration, read once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_gemini")]
    pub gemini: GeminiConfig,

    #[serde(default = "default_prompts")]
    pub prompts: PromptsConfig,

    #[serde(default = "default_session")]
    pub session: SessionConfig,

    #[serde(default = "default_ui")]
    pub ui: UiConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Gemini API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// API key. Falls back to `GOOGLE_API_KEY` when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_gemini_url")]
    pub base_url: String,

    /// Model used for the guardrail, story and image-prompt calls
    #[serde(default = "default_text_model")]
    pub text_model: String,

    #[serde(default = "default_image_model")]
    pub image_model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl GeminiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Location of the system instruction templates
#[derive(Debug, Clone, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_prompts_dir")]
    pub dir: PathBuf,
}

/// Session lifetime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Sessions idle longer than this are dropped
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,

    /// Run cleanup every N seconds
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// User interface configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl AppConfig {
    /// Load configuration from the optional `config` file, `.env` and the environment.
    ///
    /// Fails when no Gemini API key can be resolved.
    pub fn load() -> ServiceResult<Self> {
        // A missing .env file is normal in production
        let _ = dotenvy::dotenv();

        let mut config: AppConfig = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("STORYTELLER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build config: {}", e),
            })?
            .try_deserialize()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to deserialize config: {}", e),
            })?;

        let fallback = std::env::var(API_KEY_ENV_FALLBACK).ok();
        let api_key = resolve_api_key(config.gemini.api_key.as_deref(), fallback.as_deref())?;
        config.gemini.api_key = Some(api_key);

        config.validate()?;
        Ok(config)
    }

    /// Reject durations the runtime cannot work with.
    pub fn validate(&self) -> ServiceResult<()> {
        let zero_durations = [
            ("gemini.request_timeout_secs", self.gemini.request_timeout_secs),
            ("session.cleanup_interval_secs", self.session.cleanup_interval_secs),
        ];

        match zero_durations.iter().find(|(_, secs)| *secs == 0) {
            Some((key, _)) => Err(ServiceError::Config {
                message: format!("{key} must be greater than zero"),
            }),
            None => Ok(()),
        }
    }
}

/// Pick the configured API key, or the fallback, rejecting blank values.
pub fn resolve_api_key(configured: Option<&str>, fallback: Option<&str>) -> ServiceResult<String> {
    [configured, fallback]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|key| !key.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::Config {
            message: format!(
                "Gemini API key is missing: set {} (or STORYTELLER__GEMINI__API_KEY) in the environment or .env",
                API_KEY_ENV_FALLBACK
            ),
        })
}

// ==================== Default Value Functions ====================

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_gemini() -> GeminiConfig {
    GeminiConfig {
        api_key: None,
        base_url: default_gemini_url(),
        text_model: default_text_model(),
        image_model: default_image_model(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

fn default_text_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_prompts() -> PromptsConfig {
    PromptsConfig {
        dir: default_prompts_dir(),
    }
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from("./prompts")
}

fn default_session() -> SessionConfig {
    SessionConfig {
        ttl_secs: default_session_ttl_secs(),
        cleanup_interval_secs: default_cleanup_interval_secs(),
    }
}

fn default_session_ttl_secs() -> u64 {
    // 2 hours
    7200
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn default_ui() -> UiConfig {
    UiConfig {
        locale: default_locale(),
    }
}

fn default_locale() -> String {
    "pt-BR".to_string()
}
