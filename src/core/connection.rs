//! Connection lifecycle shared by the telephony and AI speech adapters.

use std::fmt;

/// Connection state for a bridged connection.
///
/// `Connecting -> Open -> Closing -> Closed`, with `Error` reachable from any
/// non-terminal state on transport failure. Connections are never reused once
/// they reach a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Handshake in progress (or not yet started)
    #[default]
    Connecting,
    /// Ready for traffic
    Open,
    /// Close requested, waiting for the peer to acknowledge
    Closing,
    /// Closed gracefully
    Closed,
    /// Transport failed
    Error,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }

    /// `Closed` and `Error` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
            ConnectionState::Error => write!(f, "Error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "Open");
        assert_eq!(ConnectionState::Closing.to_string(), "Closing");
        assert_eq!(ConnectionState::Error.to_string(), "Error");
    }

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Closed.is_terminal());
        assert!(ConnectionState::Error.is_terminal());
        assert!(!ConnectionState::Open.is_terminal());
        assert!(!ConnectionState::Closing.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
    }

    #[test]
    fn test_default_is_connecting() {
        assert_eq!(ConnectionState::default(), ConnectionState::Connecting);
        assert!(!ConnectionState::default().is_open());
    }
}
