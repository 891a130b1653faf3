//! OpenAI Realtime API module.
//!
//! Bidirectional speech with OpenAI's Realtime API for the AI side of a call.
//!
//! # Supported Models
//!
//! - `gpt-4o-realtime-preview-2024-10-01` - default
//! - `gpt-4o-realtime-preview` - floating alias
//! - `gpt-4o-realtime-preview-2024-12-17` - December 2024 version
//! - `gpt-4o-mini-realtime-preview` - Mini model for lower latency
//!
//! # Audio Format
//!
//! Calls are configured with G.711 u-law at 8kHz in both directions, matching
//! what the telephony side sends, so frames are relayed untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! use waav_call_bridge::core::realtime::{BaseRealtime, OpenAIRealtime, RealtimeConfig, SessionSlot};
//!
//! let config = RealtimeConfig {
//!     api_key: "sk-...".to_string(),
//!     ..Default::default()
//! };
//! let realtime = OpenAIRealtime::new(config, SessionSlot::new())?;
//! realtime.connect().await?;
//! ```

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtime;
pub use config::{
    OPENAI_BETA_HEADER, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat, OpenAIRealtimeModel,
    OpenAIRealtimeVoice,
};
pub use messages::{
    ApiError, ClientEvent, ConversationItem, MaxTokens, ServerEvent, SessionConfig, TurnDetection,
};
