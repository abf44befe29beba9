use anyhow::{Result, Context};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Extension of persisted record files
pub const RECORD_EXTENSION: &str = "json";

/// Trait for fetched-record storage
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Ids that already have a record in `dir`
    async fn fetched_ids(&self, dir: &Path) -> Result<HashSet<String>>;

    /// Create `dir` if it is missing
    async fn prepare(&self, dir: &Path) -> Result<()>;

    /// Store one record as `<dir>/<id>.json`, returning the written path
    async fn persist(&self, dir: &Path, id: &str, record: &Value) -> Result<PathBuf>;
}

/// Filesystem implementation: one pretty-printed JSON file per note
#[derive(Debug, Clone, Default)]
pub struct FsRecordStore;

impl FsRecordStore {
    pub fn new() -> Self {
        Self
    }

    pub fn record_path(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }
}

/// Render a record with 4-space indentation; non-ASCII stays literal
pub fn to_pretty_json(record: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    record.serialize(&mut serializer)
        .context("Failed to serialize record")?;
    Ok(buf)
}

#[async_trait]
impl RecordStore for FsRecordStore {
    async fn fetched_ids(&self, dir: &Path) -> Result<HashSet<String>> {
        let mut ids = HashSet::new();

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ids),
            Err(e) => {
                return Err(e).context(format!("Failed to list records in: {}", dir.display()));
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == RECORD_EXTENSION) {
                if let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) {
                    ids.insert(id.to_string());
                }
            }
        }

        debug!("Found {} existing records in {}", ids.len(), dir.display());

        Ok(ids)
    }

    async fn prepare(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).await
            .context(format!("Failed to create output directory: {}", dir.display()))
    }

    async fn persist(&self, dir: &Path, id: &str, record: &Value) -> Result<PathBuf> {
        let path = Self::record_path(dir, id);
        let tmp_path = dir.join(format!(".{}.{}.tmp", id, RECORD_EXTENSION));

        let contents = to_pretty_json(record)?;

        // Rename keeps a crash from leaving a truncated record behind
        if let Err(e) = fs::write(&tmp_path, &contents).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e).context(format!("Failed to write record: {}", tmp_path.display()));
        }
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e).context(format!("Failed to move record into place: {}", path.display()));
        }

        debug!("Stored record: {}", path.display());

        Ok(path)
    }
}
