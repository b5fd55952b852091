//! CRD installation utilities
//!
//! Installs the meshplane CRDs on startup using server-side apply.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use meshplane_common::crd::{IstioControlPlane, IstioMesh, IstioMeshGateway, MeshGateway};
use meshplane_common::FIELD_MANAGER;

/// CRD definition with name and resource
struct CrdDef {
    name: &'static str,
    crd: CustomResourceDefinition,
}

fn crd_defs() -> Vec<CrdDef> {
    vec![
        CrdDef {
            name: "istiocontrolplanes.servicemesh.cisco.com",
            crd: IstioControlPlane::crd(),
        },
        CrdDef {
            name: "istiomeshes.servicemesh.cisco.com",
            crd: IstioMesh::crd(),
        },
        CrdDef {
            name: "meshgateways.servicemesh.cisco.com",
            crd: MeshGateway::crd(),
        },
        CrdDef {
            name: "istiomeshgateways.servicemesh.cisco.com",
            crd: IstioMeshGateway::crd(),
        },
    ]
}

/// Every CRD the operator serves, in install order
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    crd_defs().into_iter().map(|def| def.crd).collect()
}

/// Install a set of CRDs using server-side apply
async fn install_crds(client: &Client, crds_to_install: Vec<CrdDef>) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for def in crds_to_install {
        tracing::info!("Installing {} CRD...", def.name);
        crds.patch(def.name, &params, &Patch::Apply(&def.crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", def.name, e))?;
    }

    Ok(())
}

/// Ensure every meshplane CRD is installed and current
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    tracing::info!("Installing meshplane CRDs...");
    install_crds(client, crd_defs()).await?;
    tracing::info!("meshplane CRDs installed/updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_generated_crds() {
        for def in crd_defs() {
            assert_eq!(def.crd.metadata.name.as_deref(), Some(def.name));
        }
    }

    #[test]
    fn every_crd_is_in_the_mesh_group() {
        let crds = all_crds();
        assert_eq!(crds.len(), 4);
        assert!(crds
            .iter()
            .all(|crd| crd.spec.group == meshplane_common::API_GROUP));
    }

    #[test]
    fn every_crd_emits_as_yaml() {
        for crd in all_crds() {
            let text = meshplane_common::yaml::to_yaml_string(&crd).unwrap();
            let parsed = meshplane_common::yaml::parse_yaml(&text).unwrap();
            assert_eq!(parsed["kind"], "CustomResourceDefinition");
            assert_eq!(
                parsed["metadata"]["name"].as_str(),
                crd.metadata.name.as_deref()
            );
        }
    }
}
