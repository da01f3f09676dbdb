//! Cluster API control plane endpoint operator
//!
//! Watches Cluster API `Cluster` objects and propagates the control plane
//! endpoint into the infrastructure provider resource referenced by
//! `spec.infrastructureRef` (KubeVirt and OpenStack are supported).

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;

pub use error::{Error, Result};
