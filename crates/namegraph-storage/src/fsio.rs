use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let text = std::fs::read_to_string(path).map_err(StoreError::io(path))?;
    serde_json::from_str(&text).map_err(StoreError::json(path))
}

/// Pretty JSON written to a sibling temp file, then renamed over `path`.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(StoreError::io(dir))?;
    serde_json::to_writer_pretty(&mut tmp, value).map_err(StoreError::json(path))?;
    tmp.write_all(b"\n").map_err(StoreError::io(path))?;
    tmp.flush().map_err(StoreError::io(path))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(path)(e.error))?;
    Ok(())
}
