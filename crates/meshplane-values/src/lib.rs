//! Helm values rendering for meshplane
//!
//! A custom resource spec (plus reconciler-computed properties) is
//! serialized to JSON, executed against a chart's `values.yaml.tpl` and
//! decoded back into a structured [`Values`] tree.

#![deny(missing_docs)]

pub mod chart;
pub mod engine;
pub mod error;
pub mod filters;
pub mod values;

pub use chart::{Chart, ChartFile, VALUES_TEMPLATE};
pub use engine::{transform, TemplateEngine};
pub use error::TemplateError;
pub use values::{is_zero, prune_zero, Values};
