//! Telephony side of the bridge.

mod base;
pub mod twilio;

pub use base::{
    BaseTelephony, MediaFormat, SharedTelephony, TelephonyCallback, TelephonyError,
    TelephonyEvent, TelephonyEventKind, TelephonyResult,
};
pub use twilio::{InboundStream, MediaStreamFrame, TwilioMediaStream};
