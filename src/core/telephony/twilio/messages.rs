//! Twilio Media Streams message types.
//!
//! Twilio sends JSON text frames tagged by `event`. Numeric fields such as
//! `sequenceNumber` and `chunk` arrive as strings.
//!
//! # Message Flow
//!
//! ```text
//! Twilio                               Bridge
//!   |-- connected ------------------------>|
//!   |-- start (streamSid, callSid) ------->|
//!   |-- media (base64 mu-law) ------------>|
//!   |<--------------------------- media ---|
//!   |<--------------------------- clear ---|
//!   |-- stop ----------------------------->|
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Inbound
// =============================================================================

/// Messages received from Twilio.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TwilioInbound {
    Connected {
        #[serde(default)]
        protocol: String,
        #[serde(default)]
        version: Option<String>,
    },

    Start {
        #[serde(default)]
        sequence_number: Option<String>,
        #[serde(default)]
        stream_sid: Option<String>,
        start: StartMetadata,
    },

    Media {
        #[serde(default)]
        sequence_number: Option<String>,
        #[serde(default)]
        stream_sid: Option<String>,
        media: MediaPayload,
    },

    Mark {
        #[serde(default)]
        stream_sid: Option<String>,
        mark: MarkPayload,
    },

    Dtmf {
        #[serde(default)]
        stream_sid: Option<String>,
        dtmf: DtmfPayload,
    },

    Stop {
        #[serde(default)]
        sequence_number: Option<String>,
        #[serde(default)]
        stream_sid: Option<String>,
        #[serde(default)]
        stop: Option<StopMetadata>,
    },

    /// Any event this bridge does not consume
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    #[serde(default)]
    pub account_sid: Option<String>,
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
    #[serde(default)]
    pub media_format: Option<WireMediaFormat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DtmfPayload {
    #[serde(default)]
    pub track: Option<String>,
    pub digit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopMetadata {
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub call_sid: Option<String>,
}

// =============================================================================
// Outbound
// =============================================================================

/// Messages sent to Twilio.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TwilioOutbound {
    /// Queue audio for playback to the caller
    Media {
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Drop all audio queued for playback
    Clear { stream_sid: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia {
    /// Base64 mu-law audio
    pub payload: String,
}

impl TwilioOutbound {
    pub fn media(stream_sid: impl Into<String>, payload: String) -> Self {
        TwilioOutbound::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia { payload },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        TwilioOutbound::Clear {
            stream_sid: stream_sid.into(),
        }
    }
}
