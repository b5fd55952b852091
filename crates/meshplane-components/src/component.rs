//! The component seam: one implementation per chart

use serde::Serialize;
use tracing::debug;

use meshplane_common::Error;
use meshplane_values::{transform, Chart, Values, VALUES_TEMPLATE};

use crate::object::ManagedObject;
use crate::properties::Properties;
use crate::release::ReleaseData;

/// Maps a managed resource onto one Helm release
pub trait Component: Send + Sync {
    /// Component name, used in logs and status messages
    fn name(&self) -> &'static str;

    /// Whether the release should exist for this object.
    ///
    /// A disabled component's release is removed.
    fn enabled(&self, object: &ManagedObject) -> bool;

    /// Render the release description.
    ///
    /// Fails with [`Error::WrongResourceKind`] when the object is not of the
    /// kind the component renders.
    fn release_data(
        &self,
        object: &ManagedObject,
        properties: &Properties,
    ) -> Result<ReleaseData, Error>;
}

#[derive(Serialize)]
struct TemplateMetadata {
    name: String,
    namespace: String,
}

/// Input of every values template: `metadata`, `spec` and `properties`
#[derive(Serialize)]
struct TemplateInput<'a, S: Serialize> {
    metadata: TemplateMetadata,
    spec: &'a S,
    properties: &'a Properties,
}

/// Run the chart's values template against a spec
pub(crate) fn render_values<S: Serialize>(
    chart: Chart,
    object: &ManagedObject,
    spec: &S,
    properties: &Properties,
) -> Result<Values, Error> {
    let input = TemplateInput {
        metadata: TemplateMetadata {
            name: object.name(),
            namespace: object.namespace(),
        },
        spec,
        properties,
    };
    let values = transform(&input, chart, VALUES_TEMPLATE)?;
    debug!(chart = chart.name, object = %object.describe(), "transformed values");
    Ok(values)
}

/// Error for an object of the wrong kind
pub(crate) fn wrong_kind(component: &str, expected: &str, object: &ManagedObject) -> Error {
    Error::wrong_resource_kind(component, expected, object.describe())
}
