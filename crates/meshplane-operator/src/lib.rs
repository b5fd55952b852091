//! meshplane operator - reconciles Istio control planes, meshes and gateways
//!
//! Each custom resource is turned into component releases. A release is
//! rendered with helm, patched with user overlays, labelled with its owner
//! and applied object by object when the diff engine reports a change.

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod controller_runner;
pub mod overlay;
pub mod reconciler;
pub mod render;
pub mod startup;
