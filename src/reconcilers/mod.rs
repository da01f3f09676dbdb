//! Reconciliation logic

pub mod endpoint;
