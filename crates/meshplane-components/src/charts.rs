//! Embedded values templates, one file set per chart

use meshplane_values::{Chart, ChartFile, VALUES_TEMPLATE};

const GLOBAL_HELPER: ChartFile = ChartFile {
    path: "_global.tpl",
    contents: include_str!("../charts/_shared/_global.tpl"),
};

const DEPLOYMENT_HELPER: ChartFile = ChartFile {
    path: "_deployment.tpl",
    contents: include_str!("../charts/_shared/_deployment.tpl"),
};

const SERVICE_HELPER: ChartFile = ChartFile {
    path: "_service.tpl",
    contents: include_str!("../charts/_shared/_service.tpl"),
};

/// Istio CRDs and cluster-wide RBAC
pub const BASE: Chart = Chart {
    name: "base",
    files: &[
        ChartFile {
            path: VALUES_TEMPLATE,
            contents: include_str!("../charts/base/values.yaml.tpl"),
        },
        GLOBAL_HELPER,
    ],
};

/// Istio CNI node agent
pub const CNI: Chart = Chart {
    name: "cni",
    files: &[
        ChartFile {
            path: VALUES_TEMPLATE,
            contents: include_str!("../charts/cni/values.yaml.tpl"),
        },
        GLOBAL_HELPER,
        DEPLOYMENT_HELPER,
    ],
};

/// istiod and the sidecar injector
pub const DISCOVERY: Chart = Chart {
    name: "discovery",
    files: &[
        ChartFile {
            path: VALUES_TEMPLATE,
            contents: include_str!("../charts/discovery/values.yaml.tpl"),
        },
        ChartFile {
            path: "_proxy.tpl",
            contents: include_str!("../charts/discovery/_proxy.tpl"),
        },
        GLOBAL_HELPER,
        DEPLOYMENT_HELPER,
    ],
};

/// Mesh expansion gateway and its exposure rules
pub const MESH_EXPANSION: Chart = Chart {
    name: "istio-meshexpansion",
    files: &[
        ChartFile {
            path: VALUES_TEMPLATE,
            contents: include_str!("../charts/istio-meshexpansion/values.yaml.tpl"),
        },
        GLOBAL_HELPER,
        DEPLOYMENT_HELPER,
        SERVICE_HELPER,
    ],
};

/// Ingress and egress gateways
pub const MESH_GATEWAY: Chart = Chart {
    name: "meshgateway",
    files: &[
        ChartFile {
            path: VALUES_TEMPLATE,
            contents: include_str!("../charts/meshgateway/values.yaml.tpl"),
        },
        GLOBAL_HELPER,
        DEPLOYMENT_HELPER,
        SERVICE_HELPER,
    ],
};

/// Cluster registry resource sync rules
pub const RESOURCE_SYNC_RULE: Chart = Chart {
    name: "resource-sync-rule",
    files: &[ChartFile {
        path: VALUES_TEMPLATE,
        contents: include_str!("../charts/resource-sync-rule/values.yaml.tpl"),
    }],
};

/// Every embedded chart
pub const ALL: &[Chart] = &[
    BASE,
    CNI,
    DISCOVERY,
    MESH_EXPANSION,
    MESH_GATEWAY,
    RESOURCE_SYNC_RULE,
];
