//! Diff error types

use thiserror::Error;

/// Errors raised while calculating a patch
#[derive(Debug, Error)]
pub enum DiffError {
    /// A manifest could not be decoded
    #[error("{option}: cannot decode manifest: {source}")]
    Decode {
        /// Policy (or stage) that decoded the manifest
        option: &'static str,
        /// Underlying decode error
        #[source]
        source: serde_json::Error,
    },

    /// A manifest could not be re-encoded
    #[error("{option}: cannot encode manifest: {source}")]
    Encode {
        /// Policy (or stage) that encoded the manifest
        option: &'static str,
        /// Underlying encode error
        #[source]
        source: serde_json::Error,
    },

    /// A cluster lookup performed by a policy failed
    #[error("{option}: lookup failed: {source}")]
    Lookup {
        /// Policy that performed the lookup
        option: &'static str,
        /// Underlying error
        #[source]
        source: meshplane_common::Error,
    },

    /// The caller cancelled the calculation
    #[error("patch calculation cancelled")]
    Cancelled,
}

impl From<DiffError> for meshplane_common::Error {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::Lookup { source, .. } => source,
            DiffError::Decode { option, source } | DiffError::Encode { option, source } => {
                meshplane_common::Error::serialization_for_kind(option, source.to_string())
            }
            DiffError::Cancelled => {
                meshplane_common::Error::internal_with_context("patch_calculator", "cancelled")
            }
        }
    }
}
