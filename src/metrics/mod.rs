//! Prometheus metrics for the CAPI endpoint operator
//!
//! This module exposes metrics for monitoring operator health and performance.

pub mod prometheus;

pub use self::prometheus::*;
