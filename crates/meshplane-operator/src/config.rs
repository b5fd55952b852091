//! Operator command line and environment configuration

use std::path::PathBuf;

use clap::Parser;

use meshplane_common::telemetry::TelemetryConfig;
use meshplane_components::ComponentOptions;

/// Default charts directory inside the operator image
pub const DEFAULT_CHARTS_DIR: &str = "/charts";

/// Default watcher timeout (seconds)
///
/// Must stay below the client read timeout (30s) so the API server closes
/// idle watches before the client gives up on them.
pub const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 25;

/// meshplane - Istio control plane and gateway operator
#[derive(Parser, Debug, Clone)]
#[command(name = "meshplane-operator", version, about, long_about = None)]
pub struct OperatorConfig {
    /// Print CRD manifests and exit
    #[arg(long)]
    pub crd: bool,

    /// Human readable logs instead of JSON
    #[arg(long, env = "MESHPLANE_DEV_MODE")]
    pub dev_mode: bool,

    /// Debug logging for meshplane crates
    #[arg(short, long, env = "MESHPLANE_VERBOSE")]
    pub verbose: bool,

    /// Directory holding one chart per component
    #[arg(long, env = "MESHPLANE_CHARTS_DIR", default_value = DEFAULT_CHARTS_DIR)]
    pub charts_dir: PathBuf,

    /// helm binary used to render charts
    #[arg(long, env = "MESHPLANE_HELM_BINARY", default_value = "helm")]
    pub helm_binary: PathBuf,

    /// Render cluster registry resource sync rules for control planes
    #[arg(long, env = "MESHPLANE_CLUSTER_REGISTRY")]
    pub cluster_registry: bool,

    /// Override the API server URL from the inferred kubeconfig
    #[arg(long, env = "MESHPLANE_API_SERVER")]
    pub api_server: Option<String>,

    /// Watch timeout in seconds
    #[arg(
        long,
        env = "MESHPLANE_WATCH_TIMEOUT_SECS",
        default_value_t = DEFAULT_WATCH_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u32).range(1..30)
    )]
    pub watch_timeout_secs: u32,
}

impl OperatorConfig {
    /// Logging settings
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            dev_mode: self.dev_mode,
            verbose: self.verbose,
        }
    }

    /// Registry switches
    pub fn component_options(&self) -> ComponentOptions {
        ComponentOptions {
            cluster_registry_enabled: self.cluster_registry,
        }
    }
}
