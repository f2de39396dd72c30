use cubby_core::inactivity::InactivityPolicy;
use gemini_live::Backend;
use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which Gemini endpoint hosts the live sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    Vertex,
    Gemini,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub project_id: Option<String>,
    pub location: String,
    pub access_token: Option<SecretString>,
    pub gemini_api_key: Option<SecretString>,
    pub model: String,
    pub voice_name: String,
    pub send_sample_rate: u32,
    pub receive_sample_rate: u32,
    pub inactivity: InactivityPolicy,
    pub log_level: Level,
    pub prompts_path: Option<PathBuf>,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var_or(name, default);
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{}': {}", raw, e)))
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_var::<SocketAddr>("BIND_ADDRESS", "0.0.0.0:8765")?;

        let provider_str = var_or("LIVE_PROVIDER", "vertex");
        let provider = match provider_str.to_lowercase().as_str() {
            "vertex" => Provider::Vertex,
            "gemini" => Provider::Gemini,
            other => {
                return Err(ConfigError::InvalidValue(
                    "LIVE_PROVIDER".to_string(),
                    format!("'{}' is not one of 'vertex', 'gemini'", other),
                ));
            }
        };

        let project_id = std::env::var("GOOGLE_CLOUD_PROJECT").ok();
        let location = var_or("GOOGLE_CLOUD_LOCATION", "us-central1");
        let access_token = std::env::var("GOOGLE_ACCESS_TOKEN")
            .ok()
            .map(SecretString::from);
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok().map(SecretString::from);

        let model = var_or("LIVE_MODEL", "gemini-2.0-flash-live-preview-04-09");
        let voice_name = var_or("VOICE_NAME", "Puck");

        let send_sample_rate = parse_var::<u32>("SEND_SAMPLE_RATE", "16000")?;
        let receive_sample_rate = parse_var::<u32>("RECEIVE_SAMPLE_RATE", "24000")?;

        let warn_secs = parse_var::<u64>("INACTIVITY_WARN_SECS", "30")?;
        let disconnect_secs = parse_var::<u64>("INACTIVITY_DISCONNECT_SECS", "60")?;
        let inactivity = InactivityPolicy::from_secs(warn_secs, disconnect_secs).map_err(|e| {
            ConfigError::InvalidValue("INACTIVITY_DISCONNECT_SECS".to_string(), e.to_string())
        })?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH").ok().map(PathBuf::from);

        match provider {
            Provider::Vertex => {
                if project_id.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GOOGLE_CLOUD_PROJECT must be set for 'vertex' provider".to_string(),
                    ));
                }
                if access_token.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GOOGLE_ACCESS_TOKEN must be set for 'vertex' provider".to_string(),
                    ));
                }
            }
            Provider::Gemini => {
                if gemini_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            bind_address,
            provider,
            project_id,
            location,
            access_token,
            gemini_api_key,
            model,
            voice_name,
            send_sample_rate,
            receive_sample_rate,
            inactivity,
            log_level,
            prompts_path,
        })
    }

    /// Upstream endpoint and credentials for the selected provider.
    pub fn backend(&self) -> Result<Backend, ConfigError> {
        match self.provider {
            Provider::Vertex => {
                let project = self
                    .project_id
                    .clone()
                    .ok_or_else(|| ConfigError::MissingVar("GOOGLE_CLOUD_PROJECT".to_string()))?;
                let token = self
                    .access_token
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingVar("GOOGLE_ACCESS_TOKEN".to_string()))?;
                Ok(Backend::Vertex {
                    project,
                    location: self.location.clone(),
                    access_token: SecretString::from(token.expose_secret().to_string()),
                })
            }
            Provider::Gemini => {
                let key = self
                    .gemini_api_key
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;
                Ok(Backend::DeveloperApi {
                    api_key: SecretString::from(key.expose_secret().to_string()),
                })
            }
        }
    }
}
