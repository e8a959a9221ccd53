use std::sync::Arc;

use crate::bus::Bus;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::federation::FederationClient;
use crate::registry::IdentityRegistry;
use crate::storage::{DhtStorage, Stores};
use crate::tokens::CapabilityTokens;

/// Shared state handed to HTTP handlers and push channels
#[derive(Clone)]
pub struct PodContext {
    pub config: Arc<Config>,
    pub registry: IdentityRegistry,
    pub tokens: CapabilityTokens,
    pub bus: Bus,
    pub federation: FederationClient,
    pub dispatcher: Dispatcher,
    pub dht: Arc<dyn DhtStorage>,
}

impl PodContext {
    pub fn new(config: Config, stores: Stores) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let federation = FederationClient::new(&config.federation)?;
        let tokens = CapabilityTokens::new(stores.tokens.clone());
        let registry = IdentityRegistry::new(
            stores.identities.clone(),
            stores.envelopes.clone(),
            tokens.clone(),
        );
        let bus = Bus::new();
        let dispatcher = Dispatcher::new(
            config.public_address.clone(),
            registry.clone(),
            federation.clone(),
            bus.clone(),
            stores.envelopes.clone(),
        );

        Ok(Self {
            config,
            registry,
            tokens,
            bus,
            federation,
            dispatcher,
            dht: stores.dht,
        })
    }
}
