// pydeps-aio/src/json_io.rs
use std::io::Write;
use std::path::{Path, PathBuf};

use pydeps_common::error::{PydepsError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::debug;

/// Writes `data` as pretty-printed JSON. The file is replaced atomically.
pub async fn write_json_async<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    debug!("Writing JSON to: {}", path.display());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let mut json_bytes = serde_json::to_vec_pretty(data)?;
    json_bytes.push(b'\n');

    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || atomic_write(&path, &json_bytes))
        .await
        .map_err(|e| PydepsError::Generic(format!("JoinError in JSON write: {e}")))?
}

pub fn write_json_stdout<T: Serialize>(data: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, data)?;
    writeln!(handle)?;
    Ok(())
}

pub async fn read_json_async<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Reading JSON from: {}", path.display());
    let json_bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&json_bytes)?)
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| PydepsError::Io(std::sync::Arc::new(e.error)))?;
    Ok(())
}
