//! Exclusion list files: one name per line, `#` starts a comment line.

use crate::error::StoreError;
use namegraph_core::ExclusionSet;
use std::path::Path;

pub fn load_exclusions(path: &Path) -> Result<ExclusionSet, StoreError> {
    let text = std::fs::read_to_string(path).map_err(StoreError::io(path))?;
    let set = ExclusionSet::parse(&text);
    tracing::info!(path = %path.display(), names = set.len(), "loaded exclusion list");
    Ok(set)
}
