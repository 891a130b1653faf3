//! One bridged call: the AI speech connection, the telephony stream once it
//! attaches, and the relay state shared by their callbacks.

use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::realtime::{RealtimeResult, SessionOptions, SharedRealtime};
use crate::core::telephony::SharedTelephony;

/// Relay flags for a call.
///
/// `session_configured` becomes true at most once, and only after
/// `ai_connected`. Audio is relayed only while both sides are connected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub telephony_connected: bool,
    pub ai_connected: bool,
    pub stream_id: Option<String>,
    pub session_configured: bool,
}

impl SessionState {
    pub fn can_relay(&self) -> bool {
        self.telephony_connected && self.ai_connected
    }
}

pub struct Session {
    id: Uuid,
    ai: SharedRealtime,
    telephony: Mutex<Option<SharedTelephony>>,
    state: Mutex<SessionState>,
}

impl Session {
    pub(crate) fn new(ai: SharedRealtime) -> Self {
        Self {
            id: Uuid::new_v4(),
            ai,
            telephony: Mutex::new(None),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ai(&self) -> &SharedRealtime {
        &self.ai
    }

    pub fn telephony(&self) -> Option<SharedTelephony> {
        self.telephony.lock().clone()
    }

    /// Snapshot of the relay flags.
    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn can_relay(&self) -> bool {
        self.state.lock().can_relay()
    }

    pub(crate) fn mark_ai_connected(&self) {
        self.state.lock().ai_connected = true;
    }

    /// Attach the telephony stream. Returns `false` if one is already attached.
    pub(crate) fn attach_telephony(&self, telephony: SharedTelephony) -> bool {
        let mut slot = self.telephony.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(telephony);
        self.state.lock().telephony_connected = true;
        true
    }

    pub(crate) fn record_stream(&self, stream_id: String) {
        self.state.lock().stream_id = Some(stream_id);
    }

    /// Send the session configuration unless it was already sent.
    ///
    /// Returns `Ok(true)` when this call configured the session.
    pub(crate) fn configure(&self, options: &SessionOptions) -> RealtimeResult<bool> {
        let mut state = self.state.lock();
        if state.session_configured {
            return Ok(false);
        }
        if !state.ai_connected {
            return Err(crate::core::realtime::RealtimeError::NotConnected);
        }

        self.ai.configure_session(options)?;
        state.session_configured = true;
        Ok(true)
    }

    pub(crate) fn mark_disconnected(&self) {
        let mut state = self.state.lock();
        state.telephony_connected = false;
        state.ai_connected = false;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("ai", &self.ai.provider_name())
            .field("state", &*self.state.lock())
            .finish()
    }
}
