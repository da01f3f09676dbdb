//! Error types for the CAPI endpoint operator
//!
//! Propagation errors carry the context of the step that failed: the cluster
//! being reconciled, the infrastructure provider kind and, for patch failures,
//! the sub-resource that was being written.

use thiserror::Error;

use crate::adapters::patch::SubResource;

/// Result type for the operator
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the operator
#[derive(Debug, Error)]
pub enum Error {
    /// The Cluster has no `spec.infrastructureRef`
    #[error("cluster {cluster} has no infrastructureRef")]
    MissingInfrastructureReference {
        /// Namespaced name of the cluster
        cluster: String,
    },

    /// The infrastructureRef is present but cannot be addressed
    #[error("cluster {cluster} has an invalid infrastructureRef: {message}")]
    InvalidInfrastructureReference {
        /// Namespaced name of the cluster
        cluster: String,
        /// What is wrong with the reference
        message: String,
    },

    /// The endpoint cannot be split into a host and a port
    #[error("cannot split the control plane endpoint {address:?} into host and port: {message}")]
    AddressFormat {
        /// The raw endpoint string
        address: String,
        /// Why the split failed
        message: String,
    },

    /// The port part of the endpoint is not a valid TCP port
    #[error("cannot convert control plane endpoint port {port:?}: {message}")]
    PortFormat {
        /// The raw port string
        port: String,
        /// Why the conversion failed
        message: String,
    },

    /// The infrastructureRef kind has no registered provider
    #[error("unsupported infrastructure provider {kind:?}")]
    UnsupportedProvider {
        /// The kind found on the infrastructureRef
        kind: String,
    },

    /// A patch document could not be encoded to JSON
    #[error("unable to encode {provider} {sub_resource} patch: {source}")]
    PatchEncoding {
        /// Provider kind
        provider: String,
        /// Targeted sub-resource
        sub_resource: SubResource,
        /// The underlying serde_json error
        #[source]
        source: serde_json::Error,
    },

    /// The resource store rejected a patch
    #[error("cannot perform PATCH on the {provider} {sub_resource} of {target}: {source}")]
    PatchApply {
        /// Provider kind
        provider: String,
        /// Targeted sub-resource
        sub_resource: SubResource,
        /// `namespace/name` of the patched resource
        target: String,
        /// Number of documents of this attempt that were applied before the failure
        applied: usize,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// The caller cancelled the propagation attempt
    #[error("PATCH on the {provider} {sub_resource} was cancelled")]
    Cancelled {
        /// Provider kind
        provider: String,
        /// Targeted sub-resource
        sub_resource: SubResource,
        /// Number of documents of this attempt that were applied before cancellation
        applied: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True when an earlier document of the same attempt was already applied,
    /// e.g. the spec was patched but the status patch failed.
    pub fn is_partial_application(&self) -> bool {
        match self {
            Error::PatchApply { applied, .. } | Error::Cancelled { applied, .. } => *applied > 0,
            _ => false,
        }
    }

    /// Terminal errors cannot succeed until the inputs change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::MissingInfrastructureReference { .. }
                | Error::InvalidInfrastructureReference { .. }
                | Error::AddressFormat { .. }
                | Error::PortFormat { .. }
                | Error::UnsupportedProvider { .. }
                | Error::PatchEncoding { .. }
        )
    }

    /// Short label used for the propagation error metric
    pub fn reason(&self) -> &'static str {
        match self {
            Error::MissingInfrastructureReference { .. } => "missing_infrastructure_ref",
            Error::InvalidInfrastructureReference { .. } => "invalid_infrastructure_ref",
            Error::AddressFormat { .. } => "address_format",
            Error::PortFormat { .. } => "port_format",
            Error::UnsupportedProvider { .. } => "unsupported_provider",
            Error::PatchEncoding { .. } => "patch_encoding",
            Error::PatchApply { .. } => "patch_apply",
            Error::Cancelled { .. } => "cancelled",
            Error::Config(_) => "config",
        }
    }
}
