use std::fmt;

use thiserror::Error;

use crate::core::connection::ConnectionState;
use crate::core::realtime::RealtimeError;
use crate::core::telephony::TelephonyError;

/// Errors returned by the call bridge entry points.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("AI speech error: {0}")]
    Realtime(#[from] RealtimeError),

    #[error("Telephony error: {0}")]
    Telephony(#[from] TelephonyError),

    /// `attach_telephony` without a preceding successful `begin_session`
    #[error("No active call session")]
    NoActiveSession,

    #[error("AI speech connection is not open (state: {0})")]
    AiNotReady(ConnectionState),

    #[error("A telephony stream is already attached to this session")]
    TelephonyAlreadyAttached,
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Why a call session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The call finished normally
    Completed,
    /// The call ended with an error status
    Failed,
    TelephonyClosed,
    AiClosed,
    Shutdown,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::Completed => "completed",
            EndReason::Failed => "failed",
            EndReason::TelephonyClosed => "telephony_closed",
            EndReason::AiClosed => "ai_closed",
            EndReason::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}
