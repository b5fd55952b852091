//! Component adapters
//!
//! A component maps one managed custom resource onto one Helm release:
//! which chart, which namespace and release name, whether the release
//! should exist at all, the values rendered from the spec, and how the
//! reconciler should compare rendered objects against live ones.

#![deny(missing_docs)]

pub mod charts;
pub mod component;
pub mod components;
pub mod object;
pub mod properties;
pub mod registry;
pub mod release;

pub use component::Component;
pub use object::ManagedObject;
pub use properties::{ControlPlaneReference, Properties};
pub use registry::{ComponentOptions, ComponentRegistry};
pub use release::{
    DesiredState, DesiredStateOverrides, DesiredStatePredicate, OverrideKey, ReleaseData,
};
