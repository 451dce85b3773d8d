//! Version control backend.
//!
//! [Repository](crate::repo::Repository) is the seam between the edit handlers
//! and the actual history store. [GitRepository](crate::repo::GitRepository)
//! implements it on a local git working tree through `git2`.
//!
//! The index, the working tree and the branch reference are shared by every
//! request. [Store](crate::repo::Store) owns the repository together with a
//! reader/writer lock: queries run under the read side, publishes under the
//! write side, so two commits can never race for the same parent.
use std::fmt;
use std::path::{
    Path,
    PathBuf,
};

use chrono::{
    FixedOffset,
    TimeZone,
};
use log::{
    debug,
    warn,
};
use parking_lot::RwLock;
use thiserror::Error;

/// Date layout of the lines returned by [Repository::log].
pub const LOG_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

const SHORT_HASH_LEN: usize = 7;

/// Notes ref recording which path each published commit was made for.
pub const PUBLISH_NOTES_REF: &str = "refs/notes/published";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("git: {0}")]
    Git(#[from] git2::Error),
    #[error("path is not valid in the repository: {0:?}")]
    InvalidPath(String),
}

impl RepoError {
    /// The path names no single entry: absent everywhere, or a directory.
    pub fn is_unknown_path(&self) -> bool {
        match self {
            RepoError::Git(e) => {
                e.code() == git2::ErrorCode::NotFound || e.code() == git2::ErrorCode::Ambiguous
            },
            _ => false,
        }
    }
}

/// Author and committer of published changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: &str, email: &str) -> Identity {
        Identity {
            name: name.to_string(),
            email: email.to_string(),
        }
    }
}

impl Default for Identity {
    fn default() -> Identity {
        Identity::new("Rand Om Hacker", "random@hacker.com")
    }
}

/// Working tree and index status of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoStatus {
    Current,
    IndexNew,
    IndexModified,
    IndexRenamed,
    IndexTypeChange,
    WorkingNew,
    WorkingModified,
    WorkingDeleted,
    WorkingTypeChange,
    WorkingRenamed,
    Ignored,
    Unknown,
}

impl RepoStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RepoStatus::Current => "Current",
            RepoStatus::IndexNew => "IndexNew",
            RepoStatus::IndexModified => "IndexModified",
            RepoStatus::IndexRenamed => "IndexRenamed",
            RepoStatus::IndexTypeChange => "IndexTypeChange",
            RepoStatus::WorkingNew => "WorkingNew",
            RepoStatus::WorkingModified => "WorkingModified",
            RepoStatus::WorkingDeleted => "WorkingDeleted",
            RepoStatus::WorkingTypeChange => "WorkingTypeChange",
            RepoStatus::WorkingRenamed => "WorkingRenamed",
            RepoStatus::Ignored => "Ignored",
            RepoStatus::Unknown => "Unknown",
        }
    }
}

impl From<git2::Status> for RepoStatus {
    // Only single flags are recognized, any combination is Unknown.
    fn from(s: git2::Status) -> RepoStatus {
        if s == git2::Status::CURRENT {
            RepoStatus::Current
        } else if s == git2::Status::INDEX_NEW {
            RepoStatus::IndexNew
        } else if s == git2::Status::INDEX_MODIFIED {
            RepoStatus::IndexModified
        } else if s == git2::Status::INDEX_RENAMED {
            RepoStatus::IndexRenamed
        } else if s == git2::Status::INDEX_TYPECHANGE {
            RepoStatus::IndexTypeChange
        } else if s == git2::Status::WT_NEW {
            RepoStatus::WorkingNew
        } else if s == git2::Status::WT_MODIFIED {
            RepoStatus::WorkingModified
        } else if s == git2::Status::WT_DELETED {
            RepoStatus::WorkingDeleted
        } else if s == git2::Status::WT_TYPECHANGE {
            RepoStatus::WorkingTypeChange
        } else if s == git2::Status::WT_RENAMED {
            RepoStatus::WorkingRenamed
        } else if s == git2::Status::IGNORED {
            RepoStatus::Ignored
        } else {
            RepoStatus::Unknown
        }
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.label())
    }
}

/// History store operations used by the edit handlers.
///
/// Paths are relative to the repository root and use `/` separators.
/// Implementations do no locking of their own; callers go through [Store].
pub trait Repository: Send + Sync {
    fn status(&self, path: &str) -> Result<RepoStatus, RepoError>;

    /// Stage `path` from the working tree and commit it on top of the current
    /// branch tip. Nothing is persisted unless the commit succeeds.
    fn stage_and_commit(&self, path: &str, message: &str, author: &Identity) -> Result<String, RepoError>;

    /// Commits touching `path`, newest first, one line each as
    /// `<short hash> <<date>> <subject>` with the date in [LOG_DATE_FORMAT].
    fn log(&self, path: &str) -> Result<Vec<String>, RepoError>;

    /// Make the working tree match the index.
    fn checkout_index(&self) -> Result<(), RepoError>;
}

/// A git working tree on the local filesystem.
///
/// The `git2` handle is opened per operation, so the struct itself is shared
/// freely between request threads.
pub struct GitRepository {
    root: PathBuf,
}

impl GitRepository {
    /// Open the repository at `root`, failing if there is none.
    pub fn open(root: &Path) -> Result<GitRepository, RepoError> {
        let repo = git2::Repository::open(root)?;
        if repo.is_bare() {
            return Err(RepoError::InvalidPath(root.display().to_string()));
        }
        Ok(GitRepository {
            root: root.to_path_buf(),
        })
    }

    /// Open the repository at `root`, creating an empty one if needed.
    pub fn open_or_init(root: &Path) -> Result<GitRepository, RepoError> {
        match git2::Repository::open(root) {
            Ok(_) => {},
            Err(e) => {
                if e.code() != git2::ErrorCode::NotFound {
                    return Err(e.into());
                }
                debug!("initializing repository in {:?}", root);
                git2::Repository::init(root)?;
            },
        }
        GitRepository::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn handle(&self) -> Result<git2::Repository, RepoError> {
        Ok(git2::Repository::open(&self.root)?)
    }
}

// Tip of HEAD, or None on an unborn branch.
fn head_commit(repo: &git2::Repository) -> Result<Option<git2::Commit<'_>>, RepoError> {
    match repo.head() {
        Ok(r) => Ok(Some(r.peel_to_commit()?)),
        Err(e) => {
            if e.code() == git2::ErrorCode::UnbornBranch || e.code() == git2::ErrorCode::NotFound {
                return Ok(None);
            }
            Err(e.into())
        },
    }
}

fn entry_id(tree: &git2::Tree<'_>, path: &Path) -> Option<git2::Oid> {
    tree.get_path(path).ok().map(|e| e.id())
}

// Republishing unchanged content leaves the tree alone, the note still names the path.
fn published_for(repo: &git2::Repository, oid: git2::Oid, path: &str) -> bool {
    match repo.find_note(Some(PUBLISH_NOTES_REF), oid) {
        Ok(n) => n.message() == Some(path),
        Err(_) => false,
    }
}

fn log_line(commit: &git2::Commit<'_>) -> String {
    let hash = commit.id().to_string();
    let when = commit.author().when();
    let date = FixedOffset::east_opt(when.offset_minutes() * 60)
        .and_then(|tz| tz.timestamp_opt(when.seconds(), 0).single())
        .map(|t| t.format(LOG_DATE_FORMAT).to_string())
        .unwrap_or_default();
    format!(
        "{} <{}> {}",
        &hash[..SHORT_HASH_LEN],
        date,
        commit.summary().unwrap_or(""),
    )
}

impl Repository for GitRepository {
    fn status(&self, path: &str) -> Result<RepoStatus, RepoError> {
        let repo = self.handle()?;
        let s = repo.status_file(Path::new(path))?;
        Ok(RepoStatus::from(s))
    }

    fn stage_and_commit(&self, path: &str, message: &str, author: &Identity) -> Result<String, RepoError> {
        let repo = self.handle()?;
        let mut index = repo.index()?;
        index.add_path(Path::new(path))?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;

        let sig = git2::Signature::now(&author.name, &author.email)?;
        let parent = head_commit(&repo)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        // the commit exists now, a stale index on disk only skews status
        if let Err(e) = index.write() {
            warn!("cannot write index after {}: {}", oid, e);
        }
        if let Err(e) = repo.note(&sig, &sig, Some(PUBLISH_NOTES_REF), oid, path, true) {
            warn!("cannot annotate {} with {}: {}", oid, path, e);
        }
        debug!("committed {} as {}", path, oid);
        Ok(oid.to_string())
    }

    fn log(&self, path: &str) -> Result<Vec<String>, RepoError> {
        let repo = self.handle()?;
        let mut lines = vec!();
        let head = match head_commit(&repo)? {
            Some(v) => v,
            None => return Ok(lines),
        };

        let target = Path::new(path);
        let mut walk = repo.revwalk()?;
        walk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;
        walk.push(head.id())?;
        for oid in walk {
            let commit = repo.find_commit(oid?)?;
            let tree = commit.tree()?;
            let current = entry_id(&tree, target);
            if current.is_none() {
                continue;
            }
            let previous = match commit.parent(0) {
                Ok(p) => entry_id(&p.tree()?, target),
                Err(_) => None,
            };
            if current != previous || published_for(&repo, commit.id(), path) {
                lines.push(log_line(&commit));
            }
        }
        Ok(lines)
    }

    fn checkout_index(&self) -> Result<(), RepoError> {
        let repo = self.handle()?;
        let mut index = repo.index()?;
        let mut opts = git2::build::CheckoutBuilder::new();
        repo.checkout_index(Some(&mut index), Some(&mut opts))?;
        Ok(())
    }
}

/// A [Repository] behind the single-writer boundary.
pub struct Store {
    repo: Box<dyn Repository>,
    lock: RwLock<()>,
}

impl Store {
    pub fn new(repo: Box<dyn Repository>) -> Store {
        Store {
            repo,
            lock: RwLock::new(()),
        }
    }

    /// Run `f` while no mutation is in progress. Readers may overlap.
    pub fn with_read<T>(&self, f: impl FnOnce(&dyn Repository) -> T) -> T {
        let _guard = self.lock.read();
        f(self.repo.as_ref())
    }

    /// Run `f` with exclusive access to the repository.
    pub fn with_write<T>(&self, f: impl FnOnce(&dyn Repository) -> T) -> T {
        let _guard = self.lock.write();
        f(self.repo.as_ref())
    }
}
