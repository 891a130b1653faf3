//! Configuration validation.

use crate::core::realtime::openai::{
    OpenAIRealtimeAudioFormat, OpenAIRealtimeModel, OpenAIRealtimeVoice,
};

use super::ServerConfig;

/// Temperature range accepted by the realtime API.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.6..=1.2;

pub(super) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.port == 0 {
        return Err("PORT must be greater than 0".into());
    }

    if let Some(tls) = &config.tls
        && (tls.cert_path.as_os_str().is_empty() || tls.key_path.as_os_str().is_empty())
    {
        return Err("TLS certificate and key paths must be set when TLS is enabled".into());
    }

    let realtime = &config.realtime;
    if !TEMPERATURE_RANGE.contains(&realtime.temperature) {
        return Err(format!(
            "OpenAI temperature must be between {} and {}, got {}",
            TEMPERATURE_RANGE.start(),
            TEMPERATURE_RANGE.end(),
            realtime.temperature
        )
        .into());
    }

    if OpenAIRealtimeModel::parse(&realtime.model).is_none() {
        return Err(format!("Unsupported OpenAI realtime model: {}", realtime.model).into());
    }

    if OpenAIRealtimeVoice::parse(&realtime.voice).is_none() {
        return Err(format!("Unsupported OpenAI voice: {}", realtime.voice).into());
    }

    if OpenAIRealtimeAudioFormat::parse(&realtime.audio_format).is_none() {
        return Err(format!("Unsupported audio format: {}", realtime.audio_format).into());
    }

    if let Some(endpoint) = &realtime.endpoint {
        let url = url::Url::parse(endpoint)
            .map_err(|e| format!("Invalid OPENAI_REALTIME_URL '{endpoint}': {e}"))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(format!(
                "OPENAI_REALTIME_URL must use ws:// or wss://, got '{endpoint}'"
            )
            .into());
        }
    }

    if config.bridge.close_timeout_ms == 0 {
        return Err("CLOSE_TIMEOUT_MS must be greater than 0".into());
    }

    Ok(())
}
