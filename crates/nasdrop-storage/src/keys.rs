//! Shared remote path generation for storage backends.

use crate::{StorageError, StorageResult};

/// Remote location of a relayed job: `{folder}/{job_id}_{display_name}`.
///
/// The job id prefix keeps names unique, so relaying the same job twice writes
/// the same path.
pub fn remote_path_for(folder: &str, job_id: impl std::fmt::Display, display_name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    format!("{}/{}_{}", folder, job_id, display_name)
}

/// Reject remote paths that are relative or could climb out of the share.
pub fn validate_remote_path(path: &str) -> StorageResult<()> {
    if !path.starts_with('/') {
        return Err(StorageError::InvalidPath(format!(
            "remote path must be absolute: {}",
            path
        )));
    }
    if path.split('/').any(|segment| segment == "..") || path.contains('\0') {
        return Err(StorageError::InvalidPath(format!(
            "remote path contains invalid segments: {}",
            path
        )));
    }
    Ok(())
}

/// Non-empty `/`-separated segments of a validated path.
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}
