//! Controller implementations for watching and reconciling resources

pub mod cluster_controller;

use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::adapters::providers::ProviderRegistry;
use crate::adapters::store::{KubeResourceStore, ResourceStore};
use crate::config::OperatorConfig;

/// Shared context for controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Target of infrastructure patches
    pub store: Arc<dyn ResourceStore>,
    /// Supported infrastructure providers
    pub registry: ProviderRegistry,
    pub config: OperatorConfig,
    /// Cancelled when the operator shuts down; aborts in-flight patches
    pub shutdown: CancellationToken,
}

impl Context {
    /// Create a new context patching through the Kubernetes API
    pub fn new(client: Client, config: OperatorConfig, shutdown: CancellationToken) -> Arc<Self> {
        let store = Arc::new(KubeResourceStore::new(
            client.clone(),
            config.field_manager.clone(),
        ));
        Arc::new(Self {
            client,
            store,
            registry: ProviderRegistry::default(),
            config,
            shutdown,
        })
    }
}
