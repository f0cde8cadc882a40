use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::error::StorageError;

/// Reads and decodes a JSON file; `None` when the file does not exist.
pub(crate) async fn read_json<T>(path: &Path) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
{
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            error!(event_name = "storage.read_failed", path = %path.display(), error = %source, "read failed");
            return Err(StorageError::Read { path: path.to_path_buf(), source });
        }
    };

    serde_json::from_str(&raw).map(Some).map_err(|source| {
        error!(event_name = "storage.decode_failed", path = %path.display(), error = %source, "decode failed");
        StorageError::Decode { path: path.to_path_buf(), source }
    })
}

/// Writes pretty-printed JSON through a sibling temp file and a rename.
pub(crate) async fn write_json<T>(path: &Path, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
{
    let encoded = serde_json::to_string_pretty(value)
        .map_err(|source| StorageError::Encode { path: path.to_path_buf(), source })?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|source| write_error(path, source))?;
    }

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    tokio::fs::write(&staging, encoded).await.map_err(|source| write_error(path, source))?;
    tokio::fs::rename(&staging, path).await.map_err(|source| write_error(path, source))
}

fn write_error(path: &Path, source: std::io::Error) -> StorageError {
    error!(event_name = "storage.write_failed", path = %path.display(), error = %source, "write failed");
    StorageError::Write { path: path.to_path_buf(), source }
}
