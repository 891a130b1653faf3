//! Base traits and types for the telephony side of the bridge.
//!
//! The telephony provider dials in to this service, so an adapter is built
//! around a connection that is already open. `start()` begins reading it once
//! the bridge has registered its callbacks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::audio::AudioFrame;
use crate::core::connection::ConnectionState;
use crate::core::dispatch::{EventCallback, Tagged};

/// Errors that can occur on the telephony connection.
#[derive(Debug, Error)]
pub enum TelephonyError {
    /// `start()` was called more than once
    #[error("Telephony stream already started")]
    AlreadyStarted,

    /// The underlying socket failed
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

pub type TelephonyResult<T> = Result<T, TelephonyError>;

/// Audio encoding announced by the provider when the stream starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Events a telephony adapter delivers to subscribers.
#[derive(Debug, Clone)]
pub enum TelephonyEvent {
    Connected {
        protocol: String,
        version: Option<String>,
    },
    /// The media stream started; carries the provider's stream identifier
    Start {
        stream_sid: String,
        call_sid: Option<String>,
        media_format: Option<MediaFormat>,
        custom_parameters: HashMap<String, String>,
    },
    /// One inbound audio frame from the caller
    Media {
        frame: AudioFrame,
        chunk: Option<u64>,
        timestamp_ms: Option<u64>,
    },
    /// Playback reached a mark previously sent by us
    Mark {
        name: String,
    },
    Dtmf {
        digit: String,
    },
    Stop {
        call_sid: Option<String>,
    },
    /// The connection reached a terminal state. `error` is set on transport failure.
    Disconnected {
        error: Option<String>,
    },
}

/// Subscription tags for [`TelephonyEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelephonyEventKind {
    Connected,
    Start,
    Media,
    Mark,
    Dtmf,
    Stop,
    Disconnected,
}

impl Tagged for TelephonyEvent {
    type Tag = TelephonyEventKind;

    fn tag(&self) -> TelephonyEventKind {
        match self {
            TelephonyEvent::Connected { .. } => TelephonyEventKind::Connected,
            TelephonyEvent::Start { .. } => TelephonyEventKind::Start,
            TelephonyEvent::Media { .. } => TelephonyEventKind::Media,
            TelephonyEvent::Mark { .. } => TelephonyEventKind::Mark,
            TelephonyEvent::Dtmf { .. } => TelephonyEventKind::Dtmf,
            TelephonyEvent::Stop { .. } => TelephonyEventKind::Stop,
            TelephonyEvent::Disconnected { .. } => TelephonyEventKind::Disconnected,
        }
    }
}

pub type TelephonyCallback = EventCallback<TelephonyEvent>;

/// Base trait for the telephony media connection.
///
/// Sends are fire-and-forget: playback is buffered downstream by the
/// provider, so the adapter only enqueues for its socket writer.
#[async_trait]
pub trait BaseTelephony: Send + Sync {
    /// Begin reading the inbound stream and dispatching events.
    fn start(&self) -> TelephonyResult<()>;

    /// Close the connection and wait for the socket to finish.
    async fn close(&self) -> TelephonyResult<()>;

    fn connection_state(&self) -> ConnectionState;

    /// Stream identifier, known once the start message arrived.
    fn stream_id(&self) -> Option<String>;

    /// Register a callback for one event kind.
    fn on_message(&self, kind: TelephonyEventKind, callback: TelephonyCallback);

    /// Drop every registered callback.
    fn clear_subscriptions(&self);

    /// Forward a frame to the caller. Returns whether it was queued.
    fn send_audio(&self, frame: &AudioFrame) -> bool;

    /// Flush audio already queued for playback to the caller.
    fn clear_audio(&self) -> bool;

    fn provider_name(&self) -> &'static str;
}

/// Shared trait object for telephony adapters.
pub type SharedTelephony = Arc<dyn BaseTelephony>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::Side;

    #[test]
    fn test_event_tags() {
        let media = TelephonyEvent::Media {
            frame: AudioFrame::new(vec![0xffu8; 4], Side::Telephony),
            chunk: Some(1),
            timestamp_ms: None,
        };
        assert_eq!(media.tag(), TelephonyEventKind::Media);
        assert_eq!(
            TelephonyEvent::Disconnected { error: None }.tag(),
            TelephonyEventKind::Disconnected
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            TelephonyError::AlreadyStarted.to_string(),
            "Telephony stream already started"
        );
        assert_eq!(
            TelephonyError::Transport("reset".into()).to_string(),
            "Transport error: reset"
        );
    }
}
