//! Audio frame envelope shared by both sides of the bridge.
//!
//! Frames are relayed opaquely: the payload is already in the codec the
//! receiving side expects (G.711 u-law on a phone call), so the bridge never
//! inspects or transcodes it.

use std::fmt;

use base64::prelude::*;
use bytes::Bytes;

/// The connection a frame was received on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The telephony provider's media stream
    Telephony,
    /// The AI speech service
    AiSpeech,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Telephony => write!(f, "telephony"),
            Side::AiSpeech => write!(f, "ai_speech"),
        }
    }
}

/// One hop of relayed audio.
///
/// Created by an adapter when a media message arrives and consumed by the
/// opposite adapter's `send_audio`. Cloning only bumps the `Bytes` refcount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    payload: Bytes,
    origin: Side,
}

impl AudioFrame {
    pub fn new(payload: impl Into<Bytes>, origin: Side) -> Self {
        Self {
            payload: payload.into(),
            origin,
        }
    }

    /// Decode a base64 payload as carried by both wire protocols.
    pub fn from_base64(encoded: &str, origin: Side) -> Result<Self, base64::DecodeError> {
        let raw = BASE64_STANDARD.decode(encoded)?;
        Ok(Self::new(raw, origin))
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn origin(&self) -> Side {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Base64 form for JSON framing on the outbound side.
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.payload)
    }
}
