//! meshplane operator - Istio control plane and mesh gateway lifecycle

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use meshplane_common::kube_utils::create_client;
use meshplane_common::telemetry::init_logging;
use meshplane_common::yaml::to_yaml_string;
use meshplane_components::ComponentRegistry;
use meshplane_diff::{IgnoreOpenShiftManagedSecrets, KubeClusterMetadata, KubeSecretLookup};
use meshplane_operator::config::OperatorConfig;
use meshplane_operator::controller::{Context, MeshKubeClientImpl};
use meshplane_operator::controller_runner::{
    build_control_plane_controllers, build_gateway_controllers,
};
use meshplane_operator::reconciler::{default_options, KubeObjectStore, ReleaseReconciler};
use meshplane_operator::render::HelmCliRenderer;
use meshplane_operator::startup::{all_crds, ensure_crds_installed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider before any TLS client is built
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let config = OperatorConfig::parse();

    if config.crd {
        for crd in all_crds() {
            let yaml = to_yaml_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_logging(&config.telemetry())?;

    tracing::info!(
        charts_dir = %config.charts_dir.display(),
        cluster_registry = config.cluster_registry,
        "Starting meshplane operator"
    );

    let client = create_client(config.api_server.as_deref()).await?;
    ensure_crds_installed(&client).await?;

    let mut options = default_options();
    options.push(Arc::new(IgnoreOpenShiftManagedSecrets::new(
        Arc::new(KubeClusterMetadata::new(client.clone())),
        Arc::new(KubeSecretLookup::new(client.clone())),
    )));
    let releases = ReleaseReconciler::new(
        Arc::new(HelmCliRenderer::new(&config.helm_binary, &config.charts_dir)),
        Arc::new(KubeObjectStore::new(client.clone())),
        options,
    );

    let cancel = CancellationToken::new();
    let ctx = Arc::new(Context::new(
        Arc::new(MeshKubeClientImpl::new(client.clone())),
        ComponentRegistry::new(config.component_options()),
        Arc::new(releases),
        cancel.clone(),
    ));

    // In-flight releases stop between objects once a signal arrives
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    tracing::info!("Starting controllers:");
    let mut controllers =
        build_control_plane_controllers(client.clone(), ctx.clone(), config.watch_timeout_secs);
    controllers.extend(build_gateway_controllers(
        client,
        ctx,
        config.watch_timeout_secs,
    ));

    futures::future::join_all(controllers).await;
    cancel.cancel();

    tracing::info!("meshplane operator shutting down");
    Ok(())
}
