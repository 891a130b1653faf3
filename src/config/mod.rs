//! Configuration module for the call bridge server
//!
//! Handles server configuration from .env files, YAML files and environment
//! variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use waav_call_bridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod env;
mod merge;
mod validation;
mod yaml;

pub use validation::TEMPERATURE_RANGE;
pub use yaml::YamlConfig;

use crate::core::bridge::BridgeConfig;
use crate::core::realtime::openai::{OpenAIRealtimeAudioFormat, OpenAIRealtimeModel};
use crate::core::realtime::{
    DEFAULT_CLOSE_TIMEOUT_MS, InputTranscriptionConfig, RealtimeConfig, SessionOptions,
};

pub(crate) const DEFAULT_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_PORT: u16 = 3000;

const DEFAULT_INSTRUCTIONS: &str = "You are a helpful voice assistant answering a phone call. \
Keep your answers short and conversational, and let the caller interrupt you.";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// OpenAI Realtime session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSettings {
    pub model: String,
    /// WebSocket endpoint override
    pub endpoint: Option<String>,
    pub voice: String,
    pub temperature: f32,
    pub instructions: String,
    /// Audio encoding in both directions; must match the telephony stream
    pub audio_format: String,
    /// Enables caller-side transcripts when set
    pub input_transcription_model: Option<String>,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            model: OpenAIRealtimeModel::default().as_str().to_string(),
            endpoint: None,
            voice: "alloy".to_string(),
            temperature: 0.8,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            audio_format: OpenAIRealtimeAudioFormat::default().as_str().to_string(),
            input_transcription_model: None,
        }
    }
}

/// Call bridge behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Configure the AI session when the media stream starts rather than
    /// right after the AI connection opens
    pub defer_session_config: bool,
    /// Bound on each graceful-close acknowledgment wait
    pub close_timeout_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            defer_session_config: true,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
        }
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the call bridge:
/// - Server settings (host, port, public host name, TLS)
/// - OpenAI credentials and realtime session settings
/// - Bridge behavior
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Host name placed in the `<Stream>` URL handed to Twilio
    pub public_hostname: Option<String>,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// OpenAI API key for the Realtime API
    pub openai_api_key: Option<String>,

    pub realtime: RealtimeSettings,
    pub bridge: BridgeSettings,
}

/// Zeroize secret fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// `.env` values are expected to have been loaded already (see `main.rs`).
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if the YAML file cannot be read or is malformed, an
    /// environment variable has an invalid format, or validation fails.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Host used in the media stream URL, falling back to the bind address.
    pub fn public_host(&self) -> String {
        self.public_hostname
            .clone()
            .unwrap_or_else(|| self.address())
    }

    /// Connection template for the AI speech side. The API key is supplied per call.
    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            api_key: String::new(),
            provider: "openai".to_string(),
            model: self.realtime.model.clone(),
            endpoint: self.realtime.endpoint.clone(),
            close_timeout_ms: self.bridge.close_timeout_ms,
        }
    }

    /// The one-time `session.update` payload.
    pub fn session_options(&self) -> SessionOptions {
        let format = OpenAIRealtimeAudioFormat::parse(&self.realtime.audio_format)
            .unwrap_or_default()
            .as_str()
            .to_string();

        SessionOptions {
            instructions: Some(self.realtime.instructions.clone()),
            voice: Some(self.realtime.voice.to_lowercase()),
            temperature: Some(self.realtime.temperature),
            input_audio_format: Some(format.clone()),
            output_audio_format: Some(format),
            input_audio_transcription: self
                .realtime
                .input_transcription_model
                .clone()
                .map(|model| InputTranscriptionConfig { model }),
            ..SessionOptions::default()
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            realtime: self.realtime_config(),
            session: self.session_options(),
            defer_session_config: self.bridge.defer_session_config,
        }
    }
}
