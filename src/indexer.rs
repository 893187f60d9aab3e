//! Read-only directory scanner that feeds the file index.
//!
//! Walks a directory tree, hashing file contents with SHA-256. Nothing on disk
//! is created, moved or modified.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::store::FileIndexEntry;

const READ_CHUNK: usize = 64 * 1024;

/// Directory names never descended into.
const SKIPPED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    "venv",
    ".venv",
    ".cache",
];

/// Result of one scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub entries: Vec<FileIndexEntry>,
    /// Entries that could not be read (permissions, races).
    pub skipped: usize,
    /// True when the scan stopped at the file limit.
    pub truncated: bool,
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~')
        && let Some(home) = std::env::var_os("HOME")
    {
        let rest = rest.trim_start_matches('/');
        return if rest.is_empty() {
            PathBuf::from(home)
        } else {
            PathBuf::from(home).join(rest)
        };
    }
    PathBuf::from(path)
}

/// SHA-256 of a file's contents as lowercase hex.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Scan `root` recursively, indexing at most `limit` files.
///
/// Fails only if `root` itself cannot be read.
pub async fn scan(root: &Path, limit: usize) -> std::io::Result<ScanReport> {
    let mut report = ScanReport::default();
    let meta = fs::metadata(root).await?;
    if meta.is_file() {
        let hash = hash_file(root).await?;
        report.entries.push(entry_for(root, &meta, hash));
        return Ok(report);
    }

    // Fail early on an unreadable root.
    fs::read_dir(root).await?;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut reader = match fs::read_dir(&dir).await {
            Ok(r) => r,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                report.skipped += 1;
                continue;
            }
        };

        loop {
            let entry = match reader.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "Directory read failed");
                    report.skipped += 1;
                    break;
                }
            };
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                report.skipped += 1;
                continue;
            };

            if file_type.is_dir() {
                let name = entry.file_name();
                if !SKIPPED_DIRS.contains(&name.to_string_lossy().as_ref()) {
                    pending.push(path);
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            if report.entries.len() >= limit {
                report.truncated = true;
                return Ok(finish(report));
            }

            let Ok(meta) = entry.metadata().await else {
                report.skipped += 1;
                continue;
            };
            match hash_file(&path).await {
                Ok(hash) => report.entries.push(entry_for(&path, &meta, hash)),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable file");
                    report.skipped += 1;
                }
            }
        }
    }

    Ok(finish(report))
}

fn entry_for(path: &Path, meta: &std::fs::Metadata, hash: String) -> FileIndexEntry {
    let entry = FileIndexEntry::new(path.display().to_string(), meta.len(), hash);
    match meta.modified() {
        Ok(mtime) => entry.with_modified(DateTime::<Utc>::from(mtime)),
        Err(_) => entry,
    }
}

fn finish(mut report: ScanReport) -> ScanReport {
    report.entries.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(
        files = report.entries.len(),
        skipped = report.skipped,
        truncated = report.truncated,
        "Scan finished"
    );
    report
}
