//! Outward notifications from a call session.

use std::fmt;

use crate::core::audio::Side;
use crate::core::realtime::{ProviderErrorInfo, TranscriptResult, TranscriptRole};

/// Session-level error surfaced to the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The AI service reported an application-level error. Non-fatal.
    Provider(ProviderErrorInfo),
    /// The deferred session configuration could not be sent.
    Configuration(String),
    /// A connection failed mid-call. The session ends after this is reported.
    Transport { side: Side, message: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Provider(info) => write!(f, "provider error: {info}"),
            SessionError::Configuration(msg) => write!(f, "session configuration failed: {msg}"),
            SessionError::Transport { side, message } => {
                write!(f, "{side} connection failed: {message}")
            }
        }
    }
}

/// Hooks for transcript and error notifications.
///
/// Called from the adapter's connection task while it dispatches, so
/// implementations must return quickly.
pub trait SessionObserver: Send + Sync {
    fn on_transcript_delta(&self, _transcript: &TranscriptResult) {}

    fn on_transcript_final(&self, _transcript: &TranscriptResult) {}

    fn on_error(&self, _error: &SessionError) {}
}

/// Logs every notification through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_transcript_delta(&self, transcript: &TranscriptResult) {
        tracing::debug!(role = %transcript.role, "transcript (delta): {}", transcript.text);
    }

    fn on_transcript_final(&self, transcript: &TranscriptResult) {
        match transcript.role {
            TranscriptRole::User => tracing::info!("caller transcript: {}", transcript.text),
            TranscriptRole::Assistant => tracing::info!("bot transcript (final): {}", transcript.text),
        }
    }

    fn on_error(&self, error: &SessionError) {
        tracing::error!("call session error: {}", error);
    }
}
