use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use uuid::Uuid;

use super::ExportError;
use crate::serializer::ResourceType;

pub fn job_dir(export_dir: &Path, job: &str) -> PathBuf {
    export_dir.join(job)
}

pub fn file_path(export_dir: &Path, job: &str, resource_type: ResourceType) -> PathBuf {
    job_dir(export_dir, job).join(format!("{}.ndjson", resource_type))
}

/// Deletes a job's files. A directory that was never written is not an error.
pub async fn remove_job_dir(export_dir: &Path, job: &str) -> Result<(), ExportError> {
    match fs::remove_dir_all(job_dir(export_dir, job)).await {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

/// Deletes job directories left behind by an earlier process. Only
/// directories named by a job id are touched.
pub async fn remove_orphaned_dirs(export_dir: &Path) -> Result<usize, ExportError> {
    let mut entries = match fs::read_dir(export_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let is_job = name.to_str().is_some_and(|n| Uuid::parse_str(n).is_ok());
        if is_job && entry.file_type().await?.is_dir() {
            fs::remove_dir_all(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Writes one resource per line. Returns the number of lines written.
pub async fn write_ndjson(path: &Path, resources: &[Value]) -> Result<usize, ExportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut out = BufWriter::new(fs::File::create(path).await?);
    for resource in resources {
        let line = serde_json::to_vec(resource)?;
        out.write_all(&line).await?;
        out.write_all(b"\n").await?;
    }
    out.flush().await?;
    Ok(resources.len())
}
