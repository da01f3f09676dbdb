//! Control plane endpoint propagation into infrastructure resources
//!
//! A propagation attempt runs `parse -> dispatch -> patch spec -> [patch status]`
//! and stops at the first failure. Patches are merge patches, so re-running an
//! attempt with the same endpoint is a no-op on a converged resource. There is
//! no rollback: if the spec lands and the status patch fails, the error says so
//! and the next reconcile re-drives both.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::adapters::address::{parse_host_port, ControlPlaneEndpoint};
use crate::adapters::patch::{PatchDocument, SubResource};
use crate::adapters::providers::ProviderRegistry;
use crate::adapters::store::{cluster_key, ResourceStore, TargetResource};
use crate::crd::Cluster;
use crate::metrics::prometheus::{PATCHES, PROPAGATIONS, PROPAGATION_ERRORS};
use crate::{Error, Result};

/// What a successful propagation did
#[derive(Clone, Debug, PartialEq)]
pub struct PropagationOutcome {
    pub provider: &'static str,
    pub target: TargetResource,
    pub endpoint: ControlPlaneEndpoint,
    /// Sub-resources patched, in the order they were written
    pub patched: Vec<SubResource>,
}

/// Propagate `endpoint` (`host:port`) into the infrastructure resource
/// referenced by `cluster.spec.infrastructureRef`.
#[instrument(skip_all, fields(cluster = %cluster_key(cluster), endpoint = %endpoint))]
pub async fn propagate_endpoint(
    store: &dyn ResourceStore,
    registry: &ProviderRegistry,
    cluster: &Cluster,
    endpoint: &str,
    cancel: &CancellationToken,
) -> Result<PropagationOutcome> {
    let result = propagate(store, registry, cluster, endpoint, cancel).await;

    match &result {
        Ok(outcome) => {
            PROPAGATIONS.with_label_values(&[outcome.provider]).inc();
            info!(
                provider = outcome.provider,
                target = %outcome.target,
                "Propagated control plane endpoint"
            );
        }
        Err(e) => PROPAGATION_ERRORS.with_label_values(&[e.reason()]).inc(),
    }

    result
}

async fn propagate(
    store: &dyn ResourceStore,
    registry: &ProviderRegistry,
    cluster: &Cluster,
    endpoint: &str,
    cancel: &CancellationToken,
) -> Result<PropagationOutcome> {
    let reference = cluster.spec.infrastructure_ref.as_ref().ok_or_else(|| {
        Error::MissingInfrastructureReference {
            cluster: cluster_key(cluster),
        }
    })?;

    let endpoint = parse_host_port(endpoint)?;

    let kind = reference.kind.as_deref().unwrap_or_default();
    let provider = registry.lookup(kind)?;
    let target = TargetResource::from_reference(cluster, reference)?;

    let patches = provider.build_patches(&endpoint);
    let mut patched = Vec::with_capacity(patches.len());

    for document in &patches {
        apply_patch(store, provider.kind(), &target, document, patched.len(), cancel).await?;
        patched.push(document.sub_resource);
    }

    Ok(PropagationOutcome {
        provider: provider.kind(),
        target,
        endpoint,
        patched,
    })
}

/// Encode `document` and send it to the store as a merge patch.
///
/// `applied` is the number of documents of the same attempt already written,
/// carried into the error so partial application is visible to the caller.
pub async fn apply_patch(
    store: &dyn ResourceStore,
    provider: &str,
    target: &TargetResource,
    document: &PatchDocument,
    applied: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    let sub_resource = document.sub_resource;

    let body = document.body.to_json().map_err(|source| Error::PatchEncoding {
        provider: provider.to_string(),
        sub_resource,
        source,
    })?;

    let cancelled = || Error::Cancelled {
        provider: provider.to_string(),
        sub_resource,
        applied,
    };

    if cancel.is_cancelled() {
        return Err(cancelled());
    }

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled()),
        res = store.patch(target, sub_resource, &body) => res.map_err(|source| Error::PatchApply {
            provider: provider.to_string(),
            sub_resource,
            target: target.to_string(),
            applied,
            source,
        }),
    };
    result?;

    let sub_resource = sub_resource.to_string();
    PATCHES
        .with_label_values(&[provider, sub_resource.as_str()])
        .inc();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::patch::PatchValue;
    use crate::adapters::store::MockResourceStore;
    use crate::crd::{ClusterSpec, InfrastructureReference};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use mockall::predicate::{always, eq};
    use mockall::Sequence;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn cluster_with_kind(kind: &str) -> Cluster {
        Cluster {
            metadata: ObjectMeta {
                name: Some("tenant-a".to_string()),
                namespace: Some("tenants".to_string()),
                ..Default::default()
            },
            spec: ClusterSpec {
                infrastructure_ref: Some(InfrastructureReference {
                    api_version: Some("infrastructure.cluster.x-k8s.io/v1alpha1".to_string()),
                    kind: Some(kind.to_string()),
                    name: Some("tenant-a".to_string()),
                    namespace: Some("tenants".to_string()),
                }),
                ..Default::default()
            },
            status: None,
        }
    }

    fn not_found() -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "kubevirtclusters \"tenant-a\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        })
    }

    fn conflict() -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        })
    }

    #[tokio::test]
    async fn kubevirt_patches_spec_then_status() {
        let mut store = MockResourceStore::new();
        let mut seq = Sequence::new();

        store
            .expect_patch()
            .withf(|target, sub, patch| {
                target.kind == "KubevirtCluster"
                    && target.name == "tenant-a"
                    && target.namespace == "tenants"
                    && *sub == SubResource::Spec
                    && *patch
                        == json!({
                            "spec": {"controlPlaneEndpoint": {"host": "10.0.0.5", "port": 6443}}
                        })
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        store
            .expect_patch()
            .withf(|_, sub, patch| {
                *sub == SubResource::Status && *patch == json!({"status": {"ready": true}})
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let outcome = propagate_endpoint(
            &store,
            &ProviderRegistry::default(),
            &cluster_with_kind("KubevirtCluster"),
            "10.0.0.5:6443",
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.provider, "KubevirtCluster");
        assert_eq!(outcome.patched, vec![SubResource::Spec, SubResource::Status]);
        assert_eq!(outcome.endpoint, ControlPlaneEndpoint::new("10.0.0.5", 6443));
    }

    #[tokio::test]
    async fn openstack_patches_spec_only() {
        let mut store = MockResourceStore::new();
        store
            .expect_patch()
            .with(
                always(),
                eq(SubResource::Spec),
                eq(json!({"spec": {"apiServerFixedIP": "10.0.0.5", "apiServerPort": 6443}})),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        let outcome = assert_ok!(
            propagate_endpoint(
                &store,
                &ProviderRegistry::default(),
                &cluster_with_kind("OpenStackCluster"),
                "10.0.0.5:6443",
                &CancellationToken::new(),
            )
            .await
        );

        assert_eq!(outcome.patched, vec![SubResource::Spec]);
    }

    #[tokio::test]
    async fn spec_failure_skips_status_patch() {
        let mut store = MockResourceStore::new();
        store
            .expect_patch()
            .with(always(), eq(SubResource::Spec), always())
            .times(1)
            .returning(|_, _, _| Err(not_found()));
        store
            .expect_patch()
            .with(always(), eq(SubResource::Status), always())
            .never();

        let err = assert_err!(
            propagate_endpoint(
                &store,
                &ProviderRegistry::default(),
                &cluster_with_kind("KubevirtCluster"),
                "10.0.0.5:6443",
                &CancellationToken::new(),
            )
            .await
        );

        match err {
            Error::PatchApply {
                sub_resource,
                applied,
                ref provider,
                ..
            } => {
                assert_eq!(sub_resource, SubResource::Spec);
                assert_eq!(applied, 0);
                assert_eq!(provider, "KubevirtCluster");
            }
            other => panic!("expected PatchApply, got {:?}", other),
        }
        assert!(!err.is_partial_application());
    }

    #[tokio::test]
    async fn status_failure_is_reported_as_partial_application() {
        let mut store = MockResourceStore::new();
        let mut seq = Sequence::new();
        store
            .expect_patch()
            .with(always(), eq(SubResource::Spec), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        store
            .expect_patch()
            .with(always(), eq(SubResource::Status), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(conflict()));

        let err = propagate_endpoint(
            &store,
            &ProviderRegistry::default(),
            &cluster_with_kind("KubevirtCluster"),
            "10.0.0.5:6443",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::PatchApply {
                sub_resource: SubResource::Status,
                ..
            }
        ));
        assert!(err.is_partial_application());
    }

    #[tokio::test]
    async fn unsupported_kind_issues_no_patch() {
        let mut store = MockResourceStore::new();
        store.expect_patch().never();

        let err = propagate_endpoint(
            &store,
            &ProviderRegistry::default(),
            &cluster_with_kind("AWSCluster"),
            "10.0.0.5:6443",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::UnsupportedProvider { ref kind } if kind == "AWSCluster"));
    }

    #[tokio::test]
    async fn missing_infrastructure_ref_fails_before_parsing() {
        let mut store = MockResourceStore::new();
        store.expect_patch().never();

        let mut cluster = cluster_with_kind("KubevirtCluster");
        cluster.spec.infrastructure_ref = None;

        // An unparseable endpoint must not mask the missing reference
        let err = propagate_endpoint(
            &store,
            &ProviderRegistry::default(),
            &cluster,
            "not-an-endpoint",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::MissingInfrastructureReference { ref cluster } if cluster == "tenants/tenant-a"
        ));
    }

    #[tokio::test]
    async fn malformed_endpoint_issues_no_patch() {
        let mut store = MockResourceStore::new();
        store.expect_patch().never();
        let registry = ProviderRegistry::default();
        let cluster = cluster_with_kind("OpenStackCluster");
        let cancel = CancellationToken::new();

        let err = propagate_endpoint(&store, &registry, &cluster, "10.0.0.5", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AddressFormat { .. }));

        let err = propagate_endpoint(&store, &registry, &cluster, "10.0.0.5:api", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PortFormat { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_skips_store() {
        let mut store = MockResourceStore::new();
        store.expect_patch().never();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = propagate_endpoint(
            &store,
            &ProviderRegistry::default(),
            &cluster_with_kind("KubevirtCluster"),
            "10.0.0.5:6443",
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Cancelled {
                sub_resource: SubResource::Spec,
                applied: 0,
                ..
            }
        ));
    }

    /// Accepts spec patches and never answers status patches
    #[derive(Default)]
    struct HangingStatusStore {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ResourceStore for HangingStatusStore {
        async fn patch(
            &self,
            _target: &TargetResource,
            sub_resource: SubResource,
            _patch: &serde_json::Value,
        ) -> std::result::Result<(), kube::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match sub_resource {
                SubResource::Spec => Ok(()),
                SubResource::Status => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn cancellation_during_status_patch_is_partial() {
        let store = HangingStatusStore::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = propagate_endpoint(
            &store,
            &ProviderRegistry::default(),
            &cluster_with_kind("KubevirtCluster"),
            "10.0.0.5:6443",
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Cancelled {
                sub_resource: SubResource::Status,
                applied: 1,
                ..
            }
        ));
        assert!(err.is_partial_application());
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn apply_patch_reports_target_in_error() {
        let mut store = MockResourceStore::new();
        store.expect_patch().returning(|_, _, _| Err(conflict()));

        let target = TargetResource {
            group: "infrastructure.cluster.x-k8s.io".to_string(),
            version: "v1alpha1".to_string(),
            kind: "OpenStackCluster".to_string(),
            name: "tenant-b".to_string(),
            namespace: "tenants".to_string(),
        };
        let document =
            PatchDocument::spec(PatchValue::object().field("spec", PatchValue::object()));

        let err = apply_patch(
            &store,
            "OpenStackCluster",
            &target,
            &document,
            0,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("tenants/tenant-b"));
        assert!(err.to_string().contains("OpenStackCluster spec"));
    }
}
