//! Gateway application state.

use std::sync::Arc;

use agora_actor::Hub;
use agora_store::Store;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
pub struct GatewayState<S: Store + 'static> {
    /// Entry point to the organization actors.
    pub hub: Arc<Hub<S>>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<S: Store + 'static> GatewayState<S> {
    /// Create a new gateway state.
    #[must_use]
    pub fn new(hub: Arc<Hub<S>>, config: GatewayConfig) -> Self {
        Self { hub, config }
    }
}

impl<S: Store + 'static> Clone for GatewayState<S> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            config: self.config.clone(),
        }
    }
}
