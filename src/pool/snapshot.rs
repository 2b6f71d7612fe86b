//! On-disk JSON snapshots of the resource pools
//!
//! Each snapshot is a JSON object with a single array key (`api_keys` or `proxies`).
//! Writes go to a sibling temp file first and are renamed into place so a crash
//! mid-write never leaves a truncated snapshot behind.

use crate::pool::{PoolError, PoolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Reads a snapshot; a missing file yields `Ok(None)`
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> PoolResult<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PoolError::Io(e)),
    };

    let snapshot = serde_json::from_str(&content).map_err(|e| PoolError::Snapshot {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(snapshot))
}

/// Serializes `value` and atomically replaces the file at `path`
pub fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> PoolResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| PoolError::Snapshot {
        path: path.display().to_string(),
        source: e,
    })?;

    let tmp = temp_path(path);
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
