//! Environment variable loading.

use std::env;
use std::path::PathBuf;

use super::{
    BridgeSettings, DEFAULT_HOST, DEFAULT_PORT, RealtimeSettings, ServerConfig, TlsConfig,
};

/// Read a variable, treating empty values as unset.
pub(super) fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub(super) fn parse_bool(name: &str, value: &str) -> Result<bool, Box<dyn std::error::Error>> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("Invalid boolean for {name}: {other}").into()),
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: {e}").into()),
        None => Ok(None),
    }
}

/// Build a configuration from environment variables and defaults.
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let host = var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = parse_var::<u16>("PORT")?.unwrap_or(DEFAULT_PORT);

    let tls_enabled = match var("TLS_ENABLED") {
        Some(raw) => parse_bool("TLS_ENABLED", &raw)?,
        None => false,
    };
    let tls = if tls_enabled {
        let cert_path = var("TLS_CERT_PATH").ok_or("TLS_CERT_PATH is required when TLS_ENABLED is true")?;
        let key_path = var("TLS_KEY_PATH").ok_or("TLS_KEY_PATH is required when TLS_ENABLED is true")?;
        Some(TlsConfig {
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
        })
    } else {
        None
    };

    let defaults = RealtimeSettings::default();
    let realtime = RealtimeSettings {
        model: var("OPENAI_REALTIME_MODEL").unwrap_or(defaults.model),
        endpoint: var("OPENAI_REALTIME_URL"),
        voice: var("OPENAI_VOICE").unwrap_or(defaults.voice),
        temperature: parse_var::<f32>("OPENAI_TEMPERATURE")?.unwrap_or(defaults.temperature),
        instructions: var("OPENAI_INSTRUCTIONS").unwrap_or(defaults.instructions),
        audio_format: var("OPENAI_AUDIO_FORMAT").unwrap_or(defaults.audio_format),
        input_transcription_model: var("OPENAI_TRANSCRIPTION_MODEL"),
    };

    let bridge_defaults = BridgeSettings::default();
    let bridge = BridgeSettings {
        defer_session_config: match var("DEFER_SESSION_CONFIG") {
            Some(raw) => parse_bool("DEFER_SESSION_CONFIG", &raw)?,
            None => bridge_defaults.defer_session_config,
        },
        close_timeout_ms: parse_var::<u64>("CLOSE_TIMEOUT_MS")?
            .unwrap_or(bridge_defaults.close_timeout_ms),
    };

    Ok(ServerConfig {
        host,
        port,
        public_hostname: var("HOSTNAME"),
        tls,
        openai_api_key: var("OPENAI_API_KEY"),
        realtime,
        bridge,
    })
}
