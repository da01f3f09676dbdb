//! Cluster API resources watched by the operator

mod cluster;

pub use cluster::*;
