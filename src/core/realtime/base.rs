//! Base traits and types for the AI speech side of the bridge.
//!
//! This module defines the contract the call bridge relies on for a realtime
//! speech provider: connection lifecycle, the one-time session configuration,
//! typed event subscription and fire-and-forget audio I/O.
//!
//! # Supported Providers
//!
//! - OpenAI Realtime API (gpt-4o-realtime-preview)
//!
//! # Audio Format
//!
//! Telephony calls carry G.711 u-law at 8kHz, so sessions are configured with
//! `g711_ulaw` in both directions and frames are relayed without transcoding.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::slot::SessionSlot;
use crate::core::audio::AudioFrame;
use crate::core::connection::ConnectionState;
use crate::core::dispatch::{EventCallback, Tagged};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Another AI speech connection already holds the slot
    #[error("An AI speech session is already active")]
    SessionActive,

    /// Session configuration was already sent on this connection
    #[error("Session already configured")]
    AlreadyConfigured,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Default graceful-close acknowledgment wait.
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 3000;

/// Connection-level configuration for a realtime provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// API key for authentication
    pub api_key: String,

    /// Provider name (e.g., "openai")
    #[serde(default)]
    pub provider: String,

    /// Model to use (e.g., "gpt-4o-realtime-preview-2024-10-01")
    #[serde(default)]
    pub model: String,

    /// WebSocket endpoint override (defaults to the provider's public URL)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// How long `close()` waits for the provider to acknowledge
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

fn default_close_timeout_ms() -> u64 {
    DEFAULT_CLOSE_TIMEOUT_MS
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            provider: "openai".to_string(),
            model: String::new(),
            endpoint: None,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
        }
    }
}

/// Options carried by the one-time session configuration message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Response modalities (text, audio, or both)
    #[serde(default)]
    pub modalities: Vec<String>,

    /// Behavioral instructions for the assistant
    #[serde(default)]
    pub instructions: Option<String>,

    /// Voice ID for speech output
    #[serde(default)]
    pub voice: Option<String>,

    /// Temperature for response generation
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Maximum response tokens
    #[serde(default)]
    pub max_response_output_tokens: Option<u32>,

    /// Input audio format
    #[serde(default)]
    pub input_audio_format: Option<String>,

    /// Output audio format
    #[serde(default)]
    pub output_audio_format: Option<String>,

    /// Enable caller speech transcription
    #[serde(default)]
    pub input_audio_transcription: Option<InputTranscriptionConfig>,

    /// Turn detection policy
    #[serde(default)]
    pub turn_detection: Option<TurnDetectionConfig>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: None,
            voice: None,
            temperature: None,
            max_response_output_tokens: None,
            input_audio_format: Some("g711_ulaw".to_string()),
            output_audio_format: Some("g711_ulaw".to_string()),
            input_audio_transcription: None,
            turn_detection: Some(TurnDetectionConfig::default()),
        }
    }
}

/// Configuration for input audio transcription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputTranscriptionConfig {
    /// Model to use for transcription (e.g., "whisper-1")
    pub model: String,
}

/// Configuration for turn detection (VAD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetectionConfig {
    /// Server-side VAD. Unset fields use the provider's defaults.
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold (0.0 to 1.0)
        #[serde(default)]
        threshold: Option<f32>,
        /// Amount of audio to include before voice detection (ms)
        #[serde(default)]
        prefix_padding_ms: Option<u32>,
        /// Silence duration before end of turn (ms)
        #[serde(default)]
        silence_duration_ms: Option<u32>,
    },
    /// No automatic turn detection
    #[serde(rename = "none")]
    None,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        TurnDetectionConfig::ServerVad {
            threshold: None,
            prefix_padding_ms: None,
            silence_duration_ms: None,
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Transcript result from the realtime session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// Transcript text (the increment for deltas, the whole utterance when final)
    pub text: String,
    /// Role of the speaker (user or assistant)
    pub role: TranscriptRole,
    /// Whether this is a final transcript
    pub is_final: bool,
    /// Item ID from the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

/// Role of the speaker in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// Caller speech transcript
    User,
    /// Assistant speech transcript
    Assistant,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Application-level error reported by the provider while connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderErrorInfo {
    pub error_type: String,
    pub code: Option<String>,
    pub message: String,
}

impl fmt::Display for ProviderErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({}): {}", self.error_type, code, self.message),
            None => write!(f, "{}: {}", self.error_type, self.message),
        }
    }
}

/// Events a realtime provider delivers to subscribers.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    SessionCreated {
        session_id: String,
    },
    SessionUpdated,
    ConversationItemCreated {
        item_id: Option<String>,
    },
    /// The provider detected the caller started talking
    SpeechStarted {
        audio_start_ms: u64,
        item_id: Option<String>,
    },
    SpeechStopped {
        audio_end_ms: u64,
        item_id: Option<String>,
    },
    /// A chunk of assistant audio
    AudioDelta {
        frame: AudioFrame,
        item_id: Option<String>,
        response_id: Option<String>,
    },
    TranscriptDelta(TranscriptResult),
    TranscriptDone(TranscriptResult),
    ResponseDone {
        response_id: String,
    },
    Error(ProviderErrorInfo),
    /// The connection reached a terminal state. `error` is set on transport failure.
    Disconnected {
        error: Option<String>,
    },
}

/// Subscription tags for [`RealtimeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealtimeEventKind {
    SessionCreated,
    SessionUpdated,
    ConversationItemCreated,
    SpeechStarted,
    SpeechStopped,
    AudioDelta,
    TranscriptDelta,
    TranscriptDone,
    ResponseDone,
    Error,
    Disconnected,
}

impl Tagged for RealtimeEvent {
    type Tag = RealtimeEventKind;

    fn tag(&self) -> RealtimeEventKind {
        match self {
            RealtimeEvent::SessionCreated { .. } => RealtimeEventKind::SessionCreated,
            RealtimeEvent::SessionUpdated => RealtimeEventKind::SessionUpdated,
            RealtimeEvent::ConversationItemCreated { .. } => {
                RealtimeEventKind::ConversationItemCreated
            }
            RealtimeEvent::SpeechStarted { .. } => RealtimeEventKind::SpeechStarted,
            RealtimeEvent::SpeechStopped { .. } => RealtimeEventKind::SpeechStopped,
            RealtimeEvent::AudioDelta { .. } => RealtimeEventKind::AudioDelta,
            RealtimeEvent::TranscriptDelta(_) => RealtimeEventKind::TranscriptDelta,
            RealtimeEvent::TranscriptDone(_) => RealtimeEventKind::TranscriptDone,
            RealtimeEvent::ResponseDone { .. } => RealtimeEventKind::ResponseDone,
            RealtimeEvent::Error(_) => RealtimeEventKind::Error,
            RealtimeEvent::Disconnected { .. } => RealtimeEventKind::Disconnected,
        }
    }
}

/// Callback type for realtime events.
pub type RealtimeCallback = EventCallback<RealtimeEvent>;

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for the AI speech connection.
///
/// Implementations hold one connection at a time and reserve the process-wide
/// [`SessionSlot`] for its lifetime. Audio and control sends are
/// fire-and-forget: they enqueue for the connection task and never wait on the
/// network.
///
/// # Example
///
/// ```rust,ignore
/// use waav_call_bridge::core::realtime::{BaseRealtime, OpenAIRealtime, SessionOptions, SessionSlot};
///
/// let slot = SessionSlot::new();
/// let realtime = OpenAIRealtime::new(config, slot)?;
/// realtime.connect().await?;
/// realtime.configure_session(&SessionOptions::default())?;
/// realtime.send_audio(&frame);
/// ```
#[async_trait]
pub trait BaseRealtime: Send + Sync {
    /// Reserve the slot and open the connection.
    ///
    /// Fails with [`RealtimeError::SessionActive`] before any network I/O when
    /// another connection holds the slot.
    async fn connect(&self) -> RealtimeResult<()>;

    /// Close the connection and wait for the provider to acknowledge.
    async fn close(&self) -> RealtimeResult<()>;

    /// Get the current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Send the one-time session configuration.
    ///
    /// Errors with [`RealtimeError::NotConnected`] before `Open` and with
    /// [`RealtimeError::AlreadyConfigured`] on a second call.
    fn configure_session(&self, options: &SessionOptions) -> RealtimeResult<()>;

    /// Whether `configure_session` has succeeded on this connection.
    fn is_configured(&self) -> bool;

    /// Register a callback for one event kind.
    fn on_message(&self, kind: RealtimeEventKind, callback: RealtimeCallback);

    /// Drop every registered callback.
    fn clear_subscriptions(&self);

    /// Append audio to the provider's input buffer.
    ///
    /// Returns whether the frame was queued. Dropped with a warning when the
    /// connection is not `Open`.
    fn send_audio(&self, frame: &AudioFrame) -> bool;

    /// Discard whatever input audio the provider has buffered.
    fn clear_audio(&self) -> bool;

    /// Provider name for logging.
    fn provider_name(&self) -> &'static str;
}

// =============================================================================
// Factory
// =============================================================================

/// Shared trait object for realtime providers.
pub type SharedRealtime = Arc<dyn BaseRealtime>;

/// Builds a realtime provider bound to a slot.
pub type RealtimeFactory =
    Arc<dyn Fn(RealtimeConfig, Arc<SessionSlot>) -> RealtimeResult<SharedRealtime> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::Side;

    #[test]
    fn test_transcript_role_display() {
        assert_eq!(TranscriptRole::User.to_string(), "user");
        assert_eq!(TranscriptRole::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_default_config() {
        let config = RealtimeConfig::default();
        assert!(config.api_key.is_empty());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.close_timeout_ms, DEFAULT_CLOSE_TIMEOUT_MS);
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_default_session_options() {
        let options = SessionOptions::default();
        assert_eq!(options.modalities, vec!["text", "audio"]);
        assert_eq!(options.input_audio_format.as_deref(), Some("g711_ulaw"));
        assert_eq!(options.output_audio_format.as_deref(), Some("g711_ulaw"));
        assert_eq!(options.turn_detection, Some(TurnDetectionConfig::default()));
    }

    #[test]
    fn test_turn_detection_serialization() {
        let json = serde_json::to_value(TurnDetectionConfig::default()).unwrap();
        assert_eq!(json["type"], "server_vad");

        let none = serde_json::to_value(TurnDetectionConfig::None).unwrap();
        assert_eq!(none["type"], "none");
    }

    #[test]
    fn test_error_display() {
        let err = RealtimeError::ConnectionFailed("test".to_string());
        assert!(err.to_string().contains("Connection failed"));

        assert_eq!(RealtimeError::NotConnected.to_string(), "Not connected");
        assert_eq!(
            RealtimeError::SessionActive.to_string(),
            "An AI speech session is already active"
        );
        assert_eq!(
            RealtimeError::AlreadyConfigured.to_string(),
            "Session already configured"
        );
    }

    #[test]
    fn test_provider_error_display() {
        let info = ProviderErrorInfo {
            error_type: "invalid_request_error".to_string(),
            code: Some("bad_audio".to_string()),
            message: "Invalid audio".to_string(),
        };
        assert_eq!(
            info.to_string(),
            "invalid_request_error (bad_audio): Invalid audio"
        );
    }

    #[test]
    fn test_event_tags() {
        let frame = AudioFrame::new(vec![1u8, 2, 3], Side::AiSpeech);
        let event = RealtimeEvent::AudioDelta {
            frame,
            item_id: None,
            response_id: None,
        };
        assert_eq!(event.tag(), RealtimeEventKind::AudioDelta);
        assert_eq!(
            RealtimeEvent::Disconnected { error: None }.tag(),
            RealtimeEventKind::Disconnected
        );
        assert_eq!(
            RealtimeEvent::SpeechStarted {
                audio_start_ms: 0,
                item_id: None
            }
            .tag(),
            RealtimeEventKind::SpeechStarted
        );
    }
}
