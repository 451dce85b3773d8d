//! Listing of every file in the page tree, and per-path repository status.
use std::path::Path;

use chrono::{
    DateTime,
    Utc,
};
use log::{
    debug,
    error,
};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::EditError;
use crate::path::METADATA_DIR;
use crate::repo::{
    RepoStatus,
    Store,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileList {
    pub listing: Vec<FileEntry>,
}

fn relative_name(root: &Path, p: &Path) -> Option<String> {
    let rel = p.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Every regular file under `root`, in walk order.
///
/// Entries that cannot be read are skipped.
pub fn list_all(root: &Path, store: &Store) -> FileList {
    let mut listing = vec!();
    store.with_read(|_| {
        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.file_name() != METADATA_DIR);
        for entry in walker {
            let entry = match entry {
                Ok(v) => v,
                Err(e) => {
                    debug!("skipping unreadable entry: {}", e);
                    continue;
                },
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(v) => v,
                Err(e) => {
                    debug!("skipping {:?}: {}", entry.path(), e);
                    continue;
                },
            };
            let name = match relative_name(root, entry.path()) {
                Some(v) => v,
                None => continue,
            };
            let modified = match meta.modified() {
                Ok(v) => DateTime::<Utc>::from(v),
                Err(_) => continue,
            };
            debug!("walk {:?}", name);
            listing.push(FileEntry {
                name,
                modified,
                size: meta.len(),
            });
        }
    });
    FileList {
        listing,
    }
}

/// Repository status of `relative`.
///
/// A path the repository does not know at all reports `Unknown`, and so does
/// a directory.
pub fn status_of(store: &Store, relative: &str) -> Result<RepoStatus, EditError> {
    store.with_read(|repo| {
        match repo.status(relative) {
            Ok(v) => Ok(v),
            Err(e) => {
                if e.is_unknown_path() {
                    return Ok(RepoStatus::Unknown);
                }
                error!("cannot get status of {:?}: {}", relative, e);
                Err(EditError::repo_read(relative, e))
            },
        }
    })
}
