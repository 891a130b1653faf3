pub mod audio;
pub mod bridge;
pub mod connection;
pub mod dispatch;
pub mod realtime;
pub mod telephony;

// Re-export commonly used types for convenience
pub use audio::{AudioFrame, Side};
pub use bridge::{
    BridgeConfig, BridgeError, BridgeResult, CallBridge, EndReason, SessionObserver, SessionState,
    TracingObserver,
};
pub use connection::ConnectionState;
pub use dispatch::{EventCallback, EventDispatcher, Tagged};
pub use realtime::{
    BaseRealtime, OpenAIRealtime, RealtimeConfig, RealtimeError, RealtimeEvent, RealtimeEventKind,
    RealtimeResult, SessionOptions, SessionSlot, create_realtime_provider,
};
pub use telephony::{
    BaseTelephony, MediaStreamFrame, TelephonyError, TelephonyEvent, TelephonyEventKind,
    TwilioMediaStream,
};
