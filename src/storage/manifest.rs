use anyhow::{Result, Context};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::crawler::extract::{extract, is_valid_id, Extraction};
use crate::crawler::task::ContentRef;

/// List `*.json` files directly inside `dir`, sorted by file name
pub async fn list_manifests(dir: &Path) -> Result<Vec<PathBuf>> {
    list_files(dir, "json").await
}

/// List `*.txt` share-link lists directly inside `dir`, sorted by file name
pub async fn list_link_lists(dir: &Path) -> Result<Vec<PathBuf>> {
    list_files(dir, "txt").await
}

async fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await
        .context(format!("Failed to list files in: {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == extension) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Read and extract one manifest file
pub async fn read_manifest(path: &Path) -> Result<Extraction> {
    let contents = fs::read_to_string(path).await
        .context(format!("Failed to read manifest: {}", path.display()))?;

    let raw: Value = serde_json::from_str(&contents)
        .context(format!("Failed to parse manifest: {}", path.display()))?;

    let extraction = extract(&raw);
    debug!("{}: {} refs, {} invalid ids", path.display(), extraction.refs.len(), extraction.invalid_ids.len());

    Ok(extraction)
}

/// Read a plain-text list of note share links, one per line.
///
/// Blank lines and lines starting with `#` are ignored; lines that are not a
/// recognizable note link, or carry an id of the wrong length, land in `invalid_ids`.
pub async fn read_link_list(path: &Path) -> Result<Extraction> {
    let contents = fs::read_to_string(path).await
        .context(format!("Failed to read link list: {}", path.display()))?;

    let mut extraction = Extraction::default();
    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match ContentRef::from_url(line) {
            Some(content) if is_valid_id(&content.id) => extraction.refs.push(content),
            Some(content) => extraction.invalid_ids.push(content.id),
            None => extraction.invalid_ids.push(line.to_string()),
        }
    }

    Ok(extraction)
}

/// Extract every manifest in `dir`, concatenated in file-name order.
///
/// Unreadable manifests are logged and skipped. Duplicates are left in
/// place so callers can apply their own first-wins rule.
pub async fn read_manifests(dir: &Path) -> Result<Extraction> {
    let mut merged = Extraction::default();

    for path in list_manifests(dir).await? {
        match read_manifest(&path).await {
            Ok(extraction) => merged.merge(extraction),
            Err(e) => warn!("Skipping manifest: {:#}", e),
        }
    }

    Ok(merged)
}

#[derive(Serialize)]
struct ManifestItem<'a> {
    id: &'a str,
    xsec_token: &'a str,
    url: String,
}

/// Write refs in the same `{"data": {"items": [...]}}` shape the crawler reads
pub async fn write_manifest(path: &Path, refs: &[ContentRef]) -> Result<()> {
    let items: Vec<ManifestItem> = refs.iter()
        .map(|content| ManifestItem {
            id: &content.id,
            xsec_token: &content.access_token,
            url: content.explore_url(),
        })
        .collect();

    let document = serde_json::json!({ "data": { "items": items } });
    let contents = serde_json::to_string_pretty(&document)
        .context("Failed to serialize manifest")?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    fs::write(path, contents).await
        .context(format!("Failed to write manifest: {}", path.display()))?;

    debug!("Wrote {} refs to {}", refs.len(), path.display());

    Ok(())
}
