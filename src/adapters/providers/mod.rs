//! Infrastructure provider abstraction layer
//!
//! Each Cluster API infrastructure provider models the control plane endpoint
//! differently. A provider implements [`InfrastructureProvider`] to turn an
//! endpoint into the merge patches its schema needs, and is registered in a
//! [`ProviderRegistry`] under the `kind` of its infrastructure resource.
//!
//! # Supported Providers
//!
//! - [`KubevirtProvider`] - `KubevirtCluster`, nested endpoint plus status readiness
//! - [`OpenStackProvider`] - `OpenStackCluster`, flat fixed IP and port fields

mod kubevirt;
mod openstack;

pub use kubevirt::KubevirtProvider;
pub use openstack::OpenStackProvider;

use std::collections::BTreeMap;

use crate::adapters::address::ControlPlaneEndpoint;
use crate::adapters::patch::PatchDocument;
use crate::{Error, Result};

/// Builds the patches that point an infrastructure resource at a control plane endpoint
pub trait InfrastructureProvider: Send + Sync {
    /// The infrastructureRef `kind` this provider handles, compared case-sensitively
    fn kind(&self) -> &'static str;

    /// Patches to apply, in order. Spec patches come before status patches.
    fn build_patches(&self, endpoint: &ControlPlaneEndpoint) -> Vec<PatchDocument>;
}

/// Closed set of providers keyed by infrastructure kind
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Box<dyn InfrastructureProvider>>,
}

impl ProviderRegistry {
    /// A registry without any provider
    pub fn empty() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    /// Register a provider, replacing any provider with the same kind
    pub fn register(mut self, provider: impl InfrastructureProvider + 'static) -> Self {
        self.providers.insert(provider.kind(), Box::new(provider));
        self
    }

    /// Look up the provider for an infrastructureRef kind
    pub fn lookup(&self, kind: &str) -> Result<&dyn InfrastructureProvider> {
        self.providers
            .get(kind)
            .map(|p| p.as_ref())
            .ok_or_else(|| Error::UnsupportedProvider {
                kind: kind.to_string(),
            })
    }

    /// Registered kinds in sorted order
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.keys().copied()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::empty()
            .register(KubevirtProvider)
            .register(OpenStackProvider)
    }
}
