// ABOUTME: Configuration loading and validation for the resonator server.
// ABOUTME: Built once at startup from environment variables and passed explicitly to every component.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use resonator_audio::HfClient;
use resonator_audio::huggingface::DEFAULT_BASE_URL;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("RESONATOR_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("{var} is not a valid number: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("DEFAULT_DURATION ({default}) must be between 1 and MAX_DURATION ({max})")]
    InvalidDuration { default: u32, max: u32 },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ResonatorConfig {
    /// Holds the database file and every audio artifact.
    pub output_dir: PathBuf,
    pub bind: SocketAddr,
    pub public_base_url: String,
    pub model_name: String,
    pub cors_origins: Vec<String>,
    pub default_duration: u32,
    pub max_duration: u32,
    pub hf_api_token: Option<String>,
    pub hf_api_url: String,
    pub hf_api_timeout: Duration,
}

impl ResonatorConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - OUTPUT_DIR: database and audio directory (default: /app/output)
    /// - RESONATOR_BIND: socket address to bind (default: 127.0.0.1:8000)
    /// - PUBLIC_BASE_URL: base for audio URLs (default: http://<bind>)
    /// - MODEL_NAME: generation model (default: facebook/musicgen-stereo-large)
    /// - CORS_ORIGINS: comma-separated origins, `*` for any (default: *)
    /// - DEFAULT_DURATION / MAX_DURATION: seconds (default: 15 / 60)
    /// - HF_API_TOKEN: Hugging Face token (optional)
    /// - HF_API_URL: inference API base (default: the public endpoint)
    /// - HF_API_TIMEOUT: seconds per inference request (default: 300)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let output_dir = var("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/app/output"));

        let bind_str = var("RESONATOR_BIND").unwrap_or_else(|| "127.0.0.1:8000".to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let public_base_url = var("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{}", bind))
            .trim_end_matches('/')
            .to_string();

        let model_name =
            var("MODEL_NAME").unwrap_or_else(|| "facebook/musicgen-stereo-large".to_string());

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let default_duration = parse_number("DEFAULT_DURATION", var("DEFAULT_DURATION"), 15)?;
        let max_duration = parse_number("MAX_DURATION", var("MAX_DURATION"), 60)?;
        if default_duration == 0 || default_duration > max_duration {
            return Err(ConfigError::InvalidDuration {
                default: default_duration,
                max: max_duration,
            });
        }

        let hf_api_token = var("HF_API_TOKEN");
        let hf_api_url = var("HF_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let hf_api_timeout =
            Duration::from_secs(parse_number("HF_API_TIMEOUT", var("HF_API_TIMEOUT"), 300)?);

        Ok(Self {
            output_dir,
            bind,
            public_base_url,
            model_name,
            cors_origins,
            default_duration,
            max_duration,
            hf_api_token,
            hf_api_url,
            hf_api_timeout,
        })
    }

    /// Public URL under which an artifact in the output directory is served.
    pub fn output_url(&self, filename: &str) -> String {
        format!("{}/output/{}", self.public_base_url, filename)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|origin| origin == "*")
    }

    pub fn hf_client(&self) -> HfClient {
        HfClient::new(
            self.hf_api_url.clone(),
            self.hf_api_token.clone(),
            self.hf_api_timeout,
        )
    }
}

fn parse_number<T: FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
    }
}
