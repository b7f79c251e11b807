//! Application state

use std::sync::Arc;

use billflow_billing::{ProviderGateway, SubscriptionService};

use crate::config::Config;

/// Shared application state
///
/// Built once in `main` and cloned into every handler; the gateway is
/// injected so tests run the real router against a double.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub gateway: Arc<dyn ProviderGateway>,
    pub subscriptions: SubscriptionService,
}

impl AppState {
    pub fn new(config: Config, gateway: Arc<dyn ProviderGateway>) -> Self {
        Self {
            subscriptions: SubscriptionService::new(gateway.clone()),
            config,
            gateway,
        }
    }
}
