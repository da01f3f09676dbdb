//! OpenStack infrastructure provider (CAPO)

use crate::adapters::address::ControlPlaneEndpoint;
use crate::adapters::patch::{PatchDocument, PatchValue};

use super::InfrastructureProvider;

/// `OpenStackCluster` takes the endpoint as two flat spec fields. CAPO marks
/// the cluster ready itself once it observes the fixed IP, so no status is written.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenStackProvider;

impl InfrastructureProvider for OpenStackProvider {
    fn kind(&self) -> &'static str {
        "OpenStackCluster"
    }

    fn build_patches(&self, endpoint: &ControlPlaneEndpoint) -> Vec<PatchDocument> {
        vec![PatchDocument::spec(PatchValue::object().field(
            "spec",
            PatchValue::object()
                .field("apiServerFixedIP", endpoint.host.as_str())
                .field("apiServerPort", endpoint.port),
        ))]
    }
}
