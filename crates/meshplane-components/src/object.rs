//! Resources a component renders a release for

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::ResourceExt;
use meshplane_common::crd::{GatewayConfig, IstioControlPlane, IstioMeshGateway, MeshGateway};

/// A reconciled custom resource
#[derive(Clone, Debug)]
pub enum ManagedObject {
    /// An IstioControlPlane
    ControlPlane(Arc<IstioControlPlane>),
    /// A MeshGateway
    MeshGateway(Arc<MeshGateway>),
    /// An IstioMeshGateway
    IstioMeshGateway(Arc<IstioMeshGateway>),
}

impl ManagedObject {
    /// Kind of the wrapped resource
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ControlPlane(_) => "IstioControlPlane",
            Self::MeshGateway(_) => "MeshGateway",
            Self::IstioMeshGateway(_) => "IstioMeshGateway",
        }
    }

    /// Resource name
    pub fn name(&self) -> String {
        match self {
            Self::ControlPlane(o) => o.name_any(),
            Self::MeshGateway(o) => o.name_any(),
            Self::IstioMeshGateway(o) => o.name_any(),
        }
    }

    /// Resource namespace
    pub fn namespace(&self) -> String {
        let namespace = match self {
            Self::ControlPlane(o) => o.namespace(),
            Self::MeshGateway(o) => o.namespace(),
            Self::IstioMeshGateway(o) => o.namespace(),
        };
        namespace.unwrap_or_default()
    }

    /// `Kind namespace/name`, used in errors and logs
    pub fn describe(&self) -> String {
        format!("{} {}/{}", self.kind(), self.namespace(), self.name())
    }

    /// Resource annotations
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        match self {
            Self::ControlPlane(o) => o.annotations(),
            Self::MeshGateway(o) => o.annotations(),
            Self::IstioMeshGateway(o) => o.annotations(),
        }
    }

    /// True once a deletion timestamp is set
    pub fn is_deleting(&self) -> bool {
        match self {
            Self::ControlPlane(o) => o.metadata.deletion_timestamp.is_some(),
            Self::MeshGateway(o) => o.metadata.deletion_timestamp.is_some(),
            Self::IstioMeshGateway(o) => o.metadata.deletion_timestamp.is_some(),
        }
    }

    /// Gateway settings of either gateway kind
    pub fn gateway(&self) -> Option<&GatewayConfig> {
        match self {
            Self::ControlPlane(_) => None,
            Self::MeshGateway(o) => Some(&o.spec.gateway),
            Self::IstioMeshGateway(o) => Some(&o.spec.gateway),
        }
    }
}
