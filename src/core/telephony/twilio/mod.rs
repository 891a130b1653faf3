//! Twilio Media Streams telephony adapter.
//!
//! Audio arrives as base64 G.711 u-law at 8kHz inside `media` messages and is
//! relayed without transcoding.

mod client;
pub mod messages;

pub use client::{InboundStream, MediaStreamFrame, TwilioMediaStream};
pub use messages::{TwilioInbound, TwilioOutbound};
