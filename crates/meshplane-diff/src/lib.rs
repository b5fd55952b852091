//! Patch calculation for rendered manifests
//!
//! Current (live) and modified (rendered) manifests pass through a chain of
//! [`CalculateOption`]s that strip fields which must not trigger an update,
//! then a JSON patch between them decides whether the object is applied.

#![deny(missing_docs)]

pub mod calculator;
pub mod error;
pub mod openshift;
pub mod option;
pub mod policies;

pub use calculator::{PatchCalculator, PatchResult};
pub use error::DiffError;
pub use openshift::{
    ClusterMetadataProvider, Distribution, IgnoreOpenShiftManagedSecrets, KubeClusterMetadata,
    KubeSecretLookup, SecretLookup,
};
pub use option::CalculateOption;
pub use policies::{
    IgnoreManagedFields, IgnoreMetadataAnnotations, IgnoreStatusFields,
    IgnoreWebhookFailurePolicy,
};
