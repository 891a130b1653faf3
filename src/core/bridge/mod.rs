//! Session coordination between the telephony stream and the AI speech
//! connection.

mod coordinator;
mod error;
mod observer;
mod session;

pub use coordinator::{BridgeConfig, CallBridge};
pub use error::{BridgeError, BridgeResult, EndReason};
pub use observer::{SessionError, SessionObserver, TracingObserver};
pub use session::{Session, SessionState};
