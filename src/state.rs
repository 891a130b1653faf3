use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::bridge::CallBridge;

/// Application state shared across all handlers
pub struct AppState {
    pub config: ServerConfig,
    /// The call bridge; at most one call is bridged at a time
    pub bridge: CallBridge,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let bridge = CallBridge::with_defaults(config.bridge_config());
        Self::with_bridge(config, bridge)
    }

    /// Build the state around an existing bridge (custom provider factory or observer).
    pub fn with_bridge(config: ServerConfig, bridge: CallBridge) -> Arc<Self> {
        Arc::new(Self { config, bridge })
    }
}
