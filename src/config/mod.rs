//! Configuration module for the Voicebridge Gateway.
//!
//! Configuration is loaded from environment variables (after an optional
//! `.env` file) or from a YAML file. Priority: YAML > environment values >
//! defaults.
//!
//! # Example
//! ```rust,no_run
//! use voicebridge_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from a YAML file with environment variable fallbacks
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default live-session open timeout in milliseconds.
pub const DEFAULT_LIVE_OPEN_TIMEOUT_MS: u64 = 10_000;

/// Default capacity of the per-session outbound audio queue used while the
/// telephony stream SID is not yet known.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 16;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// TLS configuration for HTTPS and WSS.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration.
///
/// Contains everything needed to run the gateway:
/// - Server settings (host, port, TLS)
/// - Gemini Live API settings (key, model, voice, open timeout)
/// - Backing store settings (base URL, deploy key)
/// - Telephony settings (public WebSocket URL handed to Twilio via TwiML)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Gemini API key for the Live API WebSocket
    pub gemini_api_key: String,
    /// Gemini Live model id
    pub gemini_model: String,
    /// Prebuilt voice name for audio output
    pub gemini_voice: String,
    /// How long to wait for the live session setup to complete before the
    /// call is considered failed
    pub live_open_timeout_ms: u64,

    /// Base URL of the backing event store HTTP API
    pub store_url: String,
    /// Deploy key sent as a bearer token to the backing store
    pub store_deploy_key: Option<String>,

    /// Publicly reachable WebSocket URL for the media stream endpoint,
    /// embedded into TwiML responses (e.g. `wss://gw.example.com/media-stream`)
    pub public_stream_url: String,

    /// Capacity of the bounded outbound audio queue per session
    pub outbound_queue_capacity: usize,
}

/// YAML file representation. All fields optional; missing values fall back
/// to the environment and then to defaults.
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    host: Option<String>,
    port: Option<u16>,
    tls: Option<TlsConfig>,
    gemini_api_key: Option<String>,
    gemini_model: Option<String>,
    gemini_voice: Option<String>,
    live_open_timeout_ms: Option<u64>,
    store_url: Option<String>,
    store_deploy_key: Option<String>,
    public_stream_url: Option<String>,
    outbound_queue_capacity: Option<usize>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl ServerConfig {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::build(YamlConfig::default())
    }

    /// Load configuration from a YAML file, falling back to environment
    /// variables for missing values.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let yaml: YamlConfig = serde_yaml::from_str(&contents)?;
        Self::build(yaml)
    }

    fn build(yaml: YamlConfig) -> Result<Self, ConfigError> {
        let port = match yaml.port {
            Some(p) => p,
            None => match env_var("PORT") {
                Some(v) => v
                    .parse()
                    .map_err(|_| ConfigError::Invalid(format!("invalid PORT value: {v}")))?,
                None => 8080,
            },
        };

        let live_open_timeout_ms = match yaml.live_open_timeout_ms {
            Some(ms) => ms,
            None => match env_var("LIVE_OPEN_TIMEOUT_MS") {
                Some(v) => v.parse().map_err(|_| {
                    ConfigError::Invalid(format!("invalid LIVE_OPEN_TIMEOUT_MS value: {v}"))
                })?,
                None => DEFAULT_LIVE_OPEN_TIMEOUT_MS,
            },
        };

        let tls = match yaml.tls {
            Some(tls) => Some(tls),
            None => match (env_var("TLS_CERT_PATH"), env_var("TLS_KEY_PATH")) {
                (Some(cert), Some(key)) => Some(TlsConfig {
                    cert_path: PathBuf::from(cert),
                    key_path: PathBuf::from(key),
                }),
                (None, None) => None,
                _ => {
                    return Err(ConfigError::Invalid(
                        "TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string(),
                    ));
                }
            },
        };

        let config = Self {
            host: yaml
                .host
                .or_else(|| env_var("HOST"))
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            tls,
            gemini_api_key: yaml
                .gemini_api_key
                .or_else(|| env_var("GEMINI_API_KEY"))
                .unwrap_or_default(),
            gemini_model: yaml
                .gemini_model
                .or_else(|| env_var("GEMINI_MODEL_ID"))
                .unwrap_or_else(|| crate::core::live::gemini::DEFAULT_MODEL.to_string()),
            gemini_voice: yaml
                .gemini_voice
                .or_else(|| env_var("GEMINI_VOICE"))
                .unwrap_or_else(|| "Puck".to_string()),
            live_open_timeout_ms,
            store_url: yaml
                .store_url
                .or_else(|| env_var("STORE_URL"))
                .unwrap_or_default(),
            store_deploy_key: yaml.store_deploy_key.or_else(|| env_var("STORE_DEPLOY_KEY")),
            public_stream_url: yaml
                .public_stream_url
                .or_else(|| env_var("PUBLIC_STREAM_URL"))
                .unwrap_or_default(),
            outbound_queue_capacity: yaml
                .outbound_queue_capacity
                .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAPACITY),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, rejecting values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gemini_api_key.is_empty() {
            return Err(ConfigError::Invalid(
                "GEMINI_API_KEY is required".to_string(),
            ));
        }
        if self.store_url.is_empty() {
            return Err(ConfigError::Invalid("STORE_URL is required".to_string()));
        }
        if url::Url::parse(&self.store_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "STORE_URL is not a valid URL: {}",
                self.store_url
            )));
        }
        if self.public_stream_url.is_empty() {
            return Err(ConfigError::Invalid(
                "PUBLIC_STREAM_URL is required".to_string(),
            ));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "outbound_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The socket address string the server binds to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether TLS is enabled.
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml_full() -> YamlConfig {
        YamlConfig {
            host: Some("127.0.0.1".to_string()),
            port: Some(9090),
            tls: None,
            gemini_api_key: Some("test-key".to_string()),
            gemini_model: Some("gemini-test-model".to_string()),
            gemini_voice: Some("Kore".to_string()),
            live_open_timeout_ms: Some(5_000),
            store_url: Some("https://store.example.com".to_string()),
            store_deploy_key: Some("deploy-key".to_string()),
            public_stream_url: Some("wss://gw.example.com/media-stream".to_string()),
            outbound_queue_capacity: Some(8),
        }
    }

    #[test]
    fn test_build_from_yaml() {
        let config = ServerConfig::build(yaml_full()).unwrap();
        assert_eq!(config.address(), "127.0.0.1:9090");
        assert_eq!(config.gemini_model, "gemini-test-model");
        assert_eq!(config.gemini_voice, "Kore");
        assert_eq!(config.live_open_timeout_ms, 5_000);
        assert_eq!(config.outbound_queue_capacity, 8);
        assert!(!config.is_tls_enabled());
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let mut yaml = yaml_full();
        yaml.gemini_api_key = None;
        unsafe { std::env::remove_var("GEMINI_API_KEY") };
        let err = ServerConfig::build(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_invalid_store_url_rejected() {
        let mut yaml = yaml_full();
        yaml.store_url = Some("not a url".to_string());
        let err = ServerConfig::build(yaml).unwrap_err();
        assert!(err.to_string().contains("STORE_URL"));
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let mut yaml = yaml_full();
        yaml.outbound_queue_capacity = Some(0);
        assert!(ServerConfig::build(yaml).is_err());
    }

    #[test]
    fn test_yaml_parse() {
        let yaml: YamlConfig = serde_yaml::from_str(
            r#"
host: 10.0.0.1
port: 8443
gemini_api_key: k
store_url: https://store.example.com
public_stream_url: wss://gw.example.com/media-stream
"#,
        )
        .unwrap();
        assert_eq!(yaml.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(yaml.port, Some(8443));
        assert!(yaml.gemini_voice.is_none());
    }
}
