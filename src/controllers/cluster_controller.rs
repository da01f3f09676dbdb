//! Controller for Cluster API Cluster resources
//!
//! Relays the endpoint the control plane provider published on
//! `Cluster.spec.controlPlaneEndpoint` into the cluster's infrastructure resource.

use futures::StreamExt;
use kube::{
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    Api, ResourceExt,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::address::join_host_port;
use crate::controllers::Context;
use crate::crd::Cluster;
use crate::metrics::prometheus::{RECONCILE_DURATION, RECONCILIATIONS, RECONCILIATION_ERRORS};
use crate::reconcilers::endpoint;
use crate::Error;

/// Run the cluster controller
pub async fn run(ctx: Arc<Context>) {
    let client = ctx.client.clone();
    let clusters: Api<Cluster> = match ctx.config.watch_namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    info!(
        namespace = ctx.config.watch_namespace.as_deref().unwrap_or("*"),
        providers = ?ctx.registry.kinds().collect::<Vec<_>>(),
        "Starting Cluster controller"
    );

    Controller::new(clusters, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => debug!("Reconciled {:?}", o),
                Err(e) => error!("Reconcile failed: {:?}", e),
            }
        })
        .await;

    info!("Cluster controller stopped");
}

/// `host:port` published on the Cluster, if the control plane provider set one
pub fn control_plane_endpoint(cluster: &Cluster) -> Option<String> {
    cluster
        .spec
        .control_plane_endpoint
        .as_ref()
        .filter(|ep| !ep.host.is_empty() && ep.port > 0)
        .map(|ep| join_host_port(&ep.host, i64::from(ep.port)))
}

/// Reconcile a Cluster resource
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = cluster.namespace().unwrap_or_default()))]
async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start = std::time::Instant::now();
    RECONCILIATIONS.with_label_values(&["Cluster"]).inc();

    let result = apply(&cluster, &ctx).await;

    let duration = start.elapsed().as_secs_f64();
    RECONCILE_DURATION
        .with_label_values(&["Cluster"])
        .observe(duration);

    if let Err(e) = &result {
        RECONCILIATION_ERRORS.with_label_values(&["Cluster"]).inc();
        if e.is_partial_application() {
            warn!("Infrastructure resource was only partially updated: {}", e);
        }
    }

    result
}

async fn apply(cluster: &Cluster, ctx: &Context) -> Result<Action, Error> {
    if cluster.spec.paused {
        debug!("Cluster is paused, skipping");
        return Ok(Action::await_change());
    }

    let Some(address) = control_plane_endpoint(cluster) else {
        debug!("Control plane endpoint not published yet");
        return Ok(Action::await_change());
    };

    let outcome = endpoint::propagate_endpoint(
        ctx.store.as_ref(),
        &ctx.registry,
        cluster,
        &address,
        &ctx.shutdown,
    )
    .await?;

    debug!(patched = ?outcome.patched, "Propagation finished");

    Ok(Action::requeue(ctx.config.requeue_after()))
}

/// Error policy for the controller
fn error_policy(cluster: Arc<Cluster>, err: &Error, ctx: Arc<Context>) -> Action {
    let ns = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();

    error!("Reconciliation error for {}/{}: {}", ns, name, err);

    if err.is_terminal() {
        Action::requeue(ctx.config.terminal_requeue())
    } else {
        Action::requeue(ctx.config.error_requeue())
    }
}
