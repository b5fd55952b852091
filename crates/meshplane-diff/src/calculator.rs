//! Patch calculation between a live object and its rendered form
//!
//! Live objects carry server-populated fields (uid, resourceVersion,
//! defaulted spec fields) that the rendered manifest never mentions. The
//! live side is therefore projected onto the shape of the rendered side
//! before the JSON patch is computed: only fields the operator renders
//! are compared. Server-side apply owns field removal.

use std::sync::Arc;

use json_patch::Patch;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::DiffError;
use crate::option::{decode, encode, CalculateOption};

/// Outcome of a patch calculation
#[derive(Debug, Clone)]
pub struct PatchResult {
    /// Operations turning the (projected) current object into the modified one
    pub patch: Patch,
    /// Current object after every option ran
    pub current: Value,
    /// Modified object after every option ran
    pub modified: Value,
}

impl PatchResult {
    /// True when the objects match
    pub fn is_empty(&self) -> bool {
        self.patch.0.is_empty()
    }
}

/// Runs calculate options left to right, then diffs
#[derive(Clone, Default)]
pub struct PatchCalculator {
    options: Vec<Arc<dyn CalculateOption>>,
}

impl std::fmt::Debug for PatchCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchCalculator")
            .field(
                "options",
                &self.options.iter().map(|o| o.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PatchCalculator {
    /// Calculator with the given options
    pub fn new(options: Vec<Arc<dyn CalculateOption>>) -> Self {
        Self { options }
    }

    /// Append an option
    pub fn with_option(mut self, option: Arc<dyn CalculateOption>) -> Self {
        self.options.push(option);
        self
    }

    /// Append several options
    pub fn with_options(mut self, options: impl IntoIterator<Item = Arc<dyn CalculateOption>>) -> Self {
        self.options.extend(options);
        self
    }

    /// Names of the configured options, in order
    pub fn option_names(&self) -> Vec<&'static str> {
        self.options.iter().map(|o| o.name()).collect()
    }

    /// Compute the patch from `current` to `modified`
    pub async fn calculate(
        &self,
        current: &Value,
        modified: &Value,
        cancel: &CancellationToken,
    ) -> Result<PatchResult, DiffError> {
        let mut current_bytes = encode("patch_calculator", current)?;
        let mut modified_bytes = encode("patch_calculator", modified)?;

        for option in &self.options {
            if cancel.is_cancelled() {
                return Err(DiffError::Cancelled);
            }
            (current_bytes, modified_bytes) =
                option.apply(current_bytes, modified_bytes, cancel).await?;
            trace!(option = option.name(), "applied calculate option");
        }

        let current = decode("patch_calculator", &current_bytes)?;
        let modified = decode("patch_calculator", &modified_bytes)?;
        let projected = project(&current, &modified);
        let patch = json_patch::diff(&projected, &modified);

        Ok(PatchResult {
            patch,
            current,
            modified,
        })
    }
}

/// Restrict `current` to the fields present in `shape`.
///
/// Mappings keep only keys the shape has. Sequences of equal length are
/// projected element-wise; otherwise the live sequence is kept whole so the
/// length change shows up in the diff.
pub fn project(current: &Value, shape: &Value) -> Value {
    match (current, shape) {
        (Value::Object(current), Value::Object(shape)) => {
            let projected: Map<String, Value> = shape
                .iter()
                .filter_map(|(key, shape_value)| {
                    current
                        .get(key)
                        .map(|value| (key.clone(), project(value, shape_value)))
                })
                .collect();
            Value::Object(projected)
        }
        (Value::Array(current), Value::Array(shape)) if current.len() == shape.len() => {
            Value::Array(
                current
                    .iter()
                    .zip(shape)
                    .map(|(value, shape_value)| project(value, shape_value))
                    .collect(),
            )
        }
        (current, _) => current.clone(),
    }
}
