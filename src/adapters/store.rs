//! Access to infrastructure resources through the Kubernetes API
//!
//! Infrastructure resources are addressed dynamically from a Cluster's
//! `infrastructureRef`, so patches go through `Api<DynamicObject>`. The
//! [`ResourceStore`] trait lets tests replace the API server.

use std::fmt;

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::adapters::patch::SubResource;
use crate::crd::{Cluster, InfrastructureReference};
use crate::{Error, Result};

/// Addressable identity of the infrastructure resource to patch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetResource {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl TargetResource {
    /// Resolve the target of a Cluster's infrastructureRef.
    ///
    /// A reference without a namespace points into the Cluster's namespace.
    pub fn from_reference(cluster: &Cluster, reference: &InfrastructureReference) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidInfrastructureReference {
            cluster: cluster_key(cluster),
            message: message.to_string(),
        };

        let api_version = reference
            .api_version
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid("apiVersion is empty"))?;
        let name = reference
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| invalid("name is empty"))?;
        let namespace = reference
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .or_else(|| cluster.metadata.namespace.clone())
            .ok_or_else(|| invalid("namespace is empty"))?;

        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), api_version.to_string()),
        };

        Ok(Self {
            group,
            version,
            kind: reference.kind.clone().unwrap_or_default(),
            name: name.to_string(),
            namespace,
        })
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk(&self.gvk())
    }
}

impl fmt::Display for TargetResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// `namespace/name` of a Cluster, used in error messages
pub fn cluster_key(cluster: &Cluster) -> String {
    format!(
        "{}/{}",
        cluster.metadata.namespace.as_deref().unwrap_or_default(),
        cluster.metadata.name.as_deref().unwrap_or_default()
    )
}

/// Merge patch access to arbitrary namespaced resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Apply a JSON merge patch to the spec or status sub-resource of `target`
    async fn patch(
        &self,
        target: &TargetResource,
        sub_resource: SubResource,
        patch: &serde_json::Value,
    ) -> std::result::Result<(), kube::Error>;
}

/// [`ResourceStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
    field_manager: String,
}

impl KubeResourceStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, target: &TargetResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &target.namespace, &target.api_resource())
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn patch(
        &self,
        target: &TargetResource,
        sub_resource: SubResource,
        patch: &serde_json::Value,
    ) -> std::result::Result<(), kube::Error> {
        let api = self.api(target);
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };

        match sub_resource {
            SubResource::Spec => api.patch(&target.name, &params, &Patch::Merge(patch)).await?,
            SubResource::Status => {
                api.patch_status(&target.name, &params, &Patch::Merge(patch))
                    .await?
            }
        };

        debug!(
            kind = %target.kind,
            target = %target,
            sub_resource = %sub_resource,
            "Applied merge patch"
        );

        Ok(())
    }
}
