//! AI speech provider module.
//!
//! # Architecture
//!
//! - [`BaseRealtime`] trait for provider abstraction
//! - [`SessionSlot`] enforcing a single AI connection per process
//! - Factory functions so the bridge can build (or be handed) a provider
//! - Typed event subscription through [`RealtimeEventKind`]

mod base;
pub mod openai;
mod slot;

pub use base::{
    BaseRealtime, DEFAULT_CLOSE_TIMEOUT_MS, InputTranscriptionConfig, ProviderErrorInfo,
    RealtimeCallback, RealtimeConfig, RealtimeError, RealtimeEvent, RealtimeEventKind,
    RealtimeFactory, RealtimeResult, SessionOptions, SharedRealtime, TranscriptResult,
    TranscriptRole, TurnDetectionConfig,
};
pub use openai::{OPENAI_REALTIME_URL, OpenAIRealtime, OpenAIRealtimeModel, OpenAIRealtimeVoice};
pub use slot::{SessionSlot, SlotGuard};

use std::sync::Arc;

/// Supported realtime providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeProvider {
    /// OpenAI Realtime API
    OpenAI,
}

impl RealtimeProvider {
    /// Parse provider from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "" => Some(RealtimeProvider::OpenAI),
            _ => None,
        }
    }
}

impl std::fmt::Display for RealtimeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RealtimeProvider::OpenAI => write!(f, "openai"),
        }
    }
}

/// Create a realtime provider from `config.provider`.
pub fn create_realtime_provider(
    config: RealtimeConfig,
    slot: Arc<SessionSlot>,
) -> RealtimeResult<SharedRealtime> {
    match RealtimeProvider::parse(&config.provider) {
        Some(RealtimeProvider::OpenAI) => Ok(Arc::new(OpenAIRealtime::new(config, slot)?)),
        None => Err(RealtimeError::InvalidConfiguration(format!(
            "Unsupported realtime provider: {}. Supported providers: {}",
            config.provider,
            get_supported_realtime_providers().join(", ")
        ))),
    }
}

/// The factory the bridge uses unless a test injects its own.
pub fn default_realtime_factory() -> RealtimeFactory {
    Arc::new(create_realtime_provider)
}

/// Get list of supported realtime providers.
pub fn get_supported_realtime_providers() -> Vec<&'static str> {
    vec!["openai"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_realtime_provider() {
        let config = RealtimeConfig {
            api_key: "test_key".to_string(),
            ..Default::default()
        };
        let provider = create_realtime_provider(config, SessionSlot::new()).unwrap();
        assert_eq!(provider.provider_name(), "openai");
    }

    #[test]
    fn test_provider_parse_case_insensitive() {
        assert_eq!(
            RealtimeProvider::parse("OpenAI"),
            Some(RealtimeProvider::OpenAI)
        );
        assert_eq!(RealtimeProvider::parse("hume"), None);
        assert_eq!(RealtimeProvider::OpenAI.to_string(), "openai");
    }

    #[test]
    fn test_invalid_provider_error_message() {
        let config = RealtimeConfig {
            api_key: "test_key".to_string(),
            provider: "invalid_provider".to_string(),
            ..Default::default()
        };

        match create_realtime_provider(config, SessionSlot::new()) {
            Err(RealtimeError::InvalidConfiguration(msg)) => {
                assert!(msg.contains("openai"));
            }
            _ => panic!("Expected InvalidConfiguration error"),
        }
    }

    #[test]
    fn test_default_factory_does_not_touch_slot() {
        let slot = SessionSlot::new();
        let factory = default_realtime_factory();
        let config = RealtimeConfig {
            api_key: "test_key".to_string(),
            ..Default::default()
        };
        let _provider = factory(config, slot.clone()).unwrap();
        assert!(!slot.is_occupied());
    }
}
