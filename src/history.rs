//! Revision history of a single page.
use std::fs::read;
use std::path::Path;

use chrono::{
    DateTime,
    FixedOffset,
};
use log::{
    debug,
    error,
};
use serde::Serialize;

use crate::error::EditError;
use crate::path::resolve;
use crate::repo::{
    Store,
    LOG_DATE_FORMAT,
};

/// One revision of a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileVersion {
    pub hash: String,
    pub modified: DateTime<FixedOffset>,
    pub comment: String,
}

/// Response to a history query: revisions newest first and the current content.
#[derive(Debug, Clone, Serialize)]
pub struct VersionList {
    pub listing: Vec<FileVersion>,
    pub content: String,
}

/// Parse one `<hash> <<date>> <subject>` log line.
///
/// Returns `None` for anything that does not match, including a date that does
/// not parse.
pub fn parse_log_line(line: &str) -> Option<FileVersion> {
    let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
    let (hash, rest) = line.split_once(' ')?;
    if hash.is_empty() || !hash.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return None;
    }
    let rest = rest.strip_prefix('<')?;
    let (date, subject) = rest.split_once("> ")?;
    if date.is_empty() || !date.bytes().all(|b| b.is_ascii_digit() || b == b' ' || b == b':' || b == b'-' || b == b'+') {
        return None;
    }
    let modified = DateTime::parse_from_str(date, LOG_DATE_FORMAT).ok()?;
    Some(FileVersion {
        hash: hash.to_string(),
        modified,
        comment: subject.to_string(),
    })
}

/// Lazily parse raw log lines, silently dropping those that do not match.
pub fn parse_log<I, S>(lines: I) -> impl Iterator<Item = FileVersion>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines.into_iter().filter_map(|l| {
        let v = parse_log_line(l.as_ref());
        if v.is_none() {
            debug!("skipping log line {:?}", l.as_ref());
        }
        v
    })
}

/// Revisions of `relative` under `root`, with its present content.
///
/// # Arguments
///
/// * `root` - Root of the page tree and repository.
/// * `store` - Repository the tree is recorded in.
/// * `relative` - Cleaned path of the page relative to `root`.
pub fn history(root: &Path, store: &Store, relative: &str) -> Result<VersionList, EditError> {
    let fp = resolve(root, relative);
    store.with_read(|repo| {
        let data = match read(&fp) {
            Ok(v) => v,
            Err(e) => {
                debug!("cannot read {:?}: {}", fp, e);
                return Err(EditError::bad_request(format!("cannot read {}", relative)));
            },
        };
        let lines = match repo.log(relative) {
            Ok(v) => v,
            Err(e) => {
                error!("cannot read log for {:?}: {}", fp, e);
                return Err(EditError::repo_read(&fp, e));
            },
        };
        Ok(VersionList {
            listing: parse_log(lines).collect(),
            content: String::from_utf8_lossy(&data).into_owned(),
        })
    })
}
