//! KubeVirt infrastructure provider (CAPK)

use crate::adapters::address::ControlPlaneEndpoint;
use crate::adapters::patch::{PatchDocument, PatchValue};

use super::InfrastructureProvider;

/// `KubevirtCluster` keeps the endpoint as a nested `controlPlaneEndpoint`
/// object and exposes `status.ready`, which CAPK does not derive from the
/// endpoint on its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct KubevirtProvider;

impl InfrastructureProvider for KubevirtProvider {
    fn kind(&self) -> &'static str {
        "KubevirtCluster"
    }

    fn build_patches(&self, endpoint: &ControlPlaneEndpoint) -> Vec<PatchDocument> {
        let spec = PatchValue::object().field(
            "spec",
            PatchValue::object().field(
                "controlPlaneEndpoint",
                PatchValue::object()
                    .field("host", endpoint.host.as_str())
                    .field("port", endpoint.port),
            ),
        );

        let status =
            PatchValue::object().field("status", PatchValue::object().field("ready", true));

        vec![PatchDocument::spec(spec), PatchDocument::status(status)]
    }
}
