//! Adapters between Cluster objects and infrastructure provider resources

pub mod address;
pub mod patch;
pub mod providers;
pub mod store;
