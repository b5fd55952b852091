//! Startup utilities for the meshplane operator

mod crds;

pub use crds::{all_crds, ensure_crds_installed};
