//! The calculate option seam
//!
//! An option rewrites the serialized current and modified manifests before
//! they are compared. Options run left to right, each seeing the output of
//! the previous one.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::DiffError;

/// A transformation applied to both sides of a comparison
#[async_trait]
pub trait CalculateOption: Send + Sync {
    /// Stable name used in errors and logs
    fn name(&self) -> &'static str;

    /// Rewrite `(current, modified)`
    async fn apply(
        &self,
        current: Vec<u8>,
        modified: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, Vec<u8>), DiffError>;
}

impl std::fmt::Debug for dyn CalculateOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CalculateOption").field(&self.name()).finish()
    }
}

/// Decode a manifest
pub(crate) fn decode(option: &'static str, bytes: &[u8]) -> Result<Value, DiffError> {
    serde_json::from_slice(bytes).map_err(|source| DiffError::Decode { option, source })
}

/// Encode a manifest
pub(crate) fn encode(option: &'static str, value: &Value) -> Result<Vec<u8>, DiffError> {
    serde_json::to_vec(value).map_err(|source| DiffError::Encode { option, source })
}

/// Decode both sides, run `f` on each, encode them again
pub(crate) fn rewrite_both<F>(
    option: &'static str,
    current: &[u8],
    modified: &[u8],
    f: F,
) -> Result<(Vec<u8>, Vec<u8>), DiffError>
where
    F: Fn(&mut Value),
{
    let mut current = decode(option, current)?;
    let mut modified = decode(option, modified)?;
    f(&mut current);
    f(&mut modified);
    Ok((encode(option, &current)?, encode(option, &modified)?))
}

/// Run `fut` unless `cancel` fires first
pub async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, DiffError>
where
    F: Future<Output = Result<T, DiffError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DiffError::Cancelled),
        result = fut => result,
    }
}
