//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `voice` - Twilio voice and status webhooks
//! - `media_stream` - Twilio media stream WebSocket

pub mod api;
pub mod media_stream;
pub mod voice;

pub use media_stream::media_stream_handler;
pub use voice::{call_status_update, incoming_call};
