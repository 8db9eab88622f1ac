use std::path::Path;

use crate::error::StoreError;

/// Write `bytes` to `path` via a temp file in the same directory plus an
/// atomic rename, so readers never observe a torn file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(|e| StoreError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| StoreError::io(path, e))?;
    Ok(())
}
