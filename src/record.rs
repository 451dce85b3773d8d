//! Publishing a page: write it under the root and record it as a commit.
//!
//! A publish either leaves the new content on disk *and* in a new commit, or
//! leaves the tree as it was. When the commit fails after the file was
//! written, the previous content is put back (or the new file removed).
use std::fs::{
    self,
    create_dir_all,
    read,
};
use std::io::{
    self,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};

use log::{
    debug,
    error,
    info,
    warn,
};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::EditError;
use crate::path::{
    is_metadata,
    resolve,
};
use crate::repo::{
    Identity,
    Repository,
    Store,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Ok,
    Failed,
}

/// Client visible outcome of a publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    pub status: PublishStatus,
}

impl PublishResult {
    pub fn ok() -> PublishResult {
        PublishResult {
            status: PublishStatus::Ok,
        }
    }

    pub fn failed() -> PublishResult {
        PublishResult {
            status: PublishStatus::Failed,
        }
    }
}

/// A published page.
#[derive(Debug, Clone)]
pub struct Record {
    pub commit: String,
    pub path: PathBuf,
}

// Replace the content at `fp` through a temporary file in the same directory.
fn write_content(fp: &Path, content: &[u8]) -> Result<(), io::Error> {
    let dir = match fp.parent() {
        Some(v) => v,
        None => return Err(io::Error::new(io::ErrorKind::InvalidInput, "no parent directory")),
    };
    create_dir_all(dir)?;
    let mut f = NamedTempFile::new_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        f.as_file().set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    f.write_all(content)?;
    f.as_file().sync_all()?;
    f.persist(fp).map_err(|e| e.error)?;
    Ok(())
}

fn restore(fp: &Path, previous: Option<Vec<u8>>) {
    let r = match previous {
        Some(v) => write_content(fp, &v),
        None => fs::remove_file(fp),
    };
    match r {
        Ok(_) => {
            debug!("rolled back {:?}", fp);
        },
        Err(e) => {
            error!("cannot roll back {:?}: {}", fp, e);
        },
    }
}

fn commit_content(repo: &dyn Repository, fp: &Path, relative: &str, comment: &str, content: &[u8], author: &Identity) -> Result<Record, EditError> {
    let previous = match read(fp) {
        Ok(v) => Some(v),
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                error!("cannot read {:?}: {}", fp, e);
                return Err(EditError::io(fp, e));
            }
            None
        },
    };

    if let Err(e) = write_content(fp, content) {
        error!("error writing file {:?}: {}", fp, e);
        return Err(EditError::io(fp, e));
    }

    let commit = match repo.stage_and_commit(relative, comment, author) {
        Ok(v) => v,
        Err(e) => {
            error!("cannot commit {:?}: {}", fp, e);
            restore(fp, previous);
            return Err(EditError::repo(fp, e));
        },
    };

    if let Err(e) = repo.checkout_index() {
        warn!("checkout after commit {} failed: {}", commit, e);
    }

    Ok(Record {
        commit,
        path: fp.to_path_buf(),
    })
}

/// Write `content` to `relative` under `root` and commit it with `comment`.
///
/// # Arguments
///
/// * `root` - Root of the page tree and repository working tree.
/// * `store` - Repository to record the change in.
/// * `author` - Identity used as author and committer.
/// * `relative` - Cleaned path relative to `root`.
/// * `comment` - Commit message.
/// * `content` - Full new content of the file.
pub fn publish(root: &Path, store: &Store, author: &Identity, relative: &str, comment: &str, content: &[u8]) -> Result<Record, EditError> {
    if is_metadata(relative) {
        return Err(EditError::bad_request(format!("filename {} is reserved", relative)));
    }
    let fp = resolve(root, relative);
    debug!("{} bytes of comment, {} bytes of {:?}", comment.len(), content.len(), relative);
    let r = store.with_write(|repo| {
        commit_content(repo, &fp, relative, comment, content, author)
    })?;
    info!("published {} as {}", relative, r.commit);
    Ok(r)
}

#[cfg(test)]
mod tests {
    use std::fs::{
        read,
        read_to_string,
        write,
    };
    use std::sync::Arc;
    use std::thread;

    use tempfile::tempdir;

    use super::{
        publish,
        PublishResult,
    };
    use crate::error::EditError;
    use crate::history::history;
    use crate::path::clean;
    use crate::repo::{
        GitRepository,
        Identity,
        Repository,
        RepoError,
        RepoStatus,
        Store,
    };

    struct BrokenRepository;

    impl Repository for BrokenRepository {
        fn status(&self, _path: &str) -> Result<RepoStatus, RepoError> {
            Ok(RepoStatus::Unknown)
        }

        fn stage_and_commit(&self, path: &str, _message: &str, _author: &Identity) -> Result<String, RepoError> {
            Err(RepoError::InvalidPath(path.to_string()))
        }

        fn log(&self, _path: &str) -> Result<Vec<String>, RepoError> {
            Ok(vec!())
        }

        fn checkout_index(&self) -> Result<(), RepoError> {
            Ok(())
        }
    }

    fn git_store(root: &std::path::Path) -> Store {
        Store::new(Box::new(GitRepository::open_or_init(root).unwrap()))
    }

    #[test]
    fn test_publish_result_json() {
        assert_eq!(serde_json::to_string(&PublishResult::ok()).unwrap(), r#"{"status":"ok"}"#);
        assert_eq!(serde_json::to_string(&PublishResult::failed()).unwrap(), r#"{"status":"failed"}"#);
    }

    #[test]
    fn test_publish_nested() {
        let d = tempdir().unwrap();
        let store = git_store(d.path());
        let r = publish(d.path(), &store, &Identity::default(), "a/b.txt", "c1", b"hello").unwrap();
        assert_eq!(read_to_string(d.path().join("a/b.txt")).unwrap(), "hello");
        assert_eq!(r.path, d.path().join("a").join("b.txt"));

        let v = history(d.path(), &store, "a/b.txt").unwrap();
        assert_eq!(v.content, "hello");
        assert_eq!(v.listing[0].comment, "c1");
        assert_eq!(v.listing[0].hash, r.commit[..7]);
        assert_eq!(store.with_read(|repo| repo.status("a/b.txt").unwrap()), RepoStatus::Current);
    }

    #[test]
    fn test_publish_twice() {
        let d = tempdir().unwrap();
        let store = git_store(d.path());
        let author = Identity::default();
        let first = publish(d.path(), &store, &author, "page.html", "first", b"same").unwrap();
        let second = publish(d.path(), &store, &author, "page.html", "second", b"same").unwrap();
        assert_ne!(first.commit, second.commit);

        let v = history(d.path(), &store, "page.html").unwrap();
        let comments: Vec<&str> = v.listing.iter().map(|f| f.comment.as_str()).collect();
        assert_eq!(comments, vec!("second", "first"));
        assert_eq!(v.content, "same");

        publish(d.path(), &store, &author, "page.html", "third", b"new").unwrap();
        let v = history(d.path(), &store, "page.html").unwrap();
        let comments: Vec<&str> = v.listing.iter().map(|f| f.comment.as_str()).collect();
        assert_eq!(comments, vec!("third", "second", "first"));
        assert_eq!(v.content, "new");

        let g = git2::Repository::open(d.path()).unwrap();
        let head = g.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.parent(0).unwrap().id().to_string(), second.commit);
    }

    #[test]
    fn test_publish_traversal_stays_in_root() {
        let d = tempdir().unwrap();
        let root = d.path().join("www");
        std::fs::create_dir(&root).unwrap();
        let store = git_store(&root);
        let rel = clean("../../etc/passwd").unwrap();
        let r = publish(&root, &store, &Identity::default(), &rel, "evil", b"x").unwrap();
        assert!(r.path.starts_with(&root));
        assert_eq!(read(root.join("etc/passwd")).unwrap(), b"x");
    }

    #[test]
    fn test_publish_refuses_metadata() {
        let d = tempdir().unwrap();
        let store = git_store(d.path());
        let head = read(d.path().join(".git/HEAD")).unwrap();
        match publish(d.path(), &store, &Identity::default(), ".git/HEAD", "c", b"ref: refs/heads/evil") {
            Err(EditError::BadRequest(_)) => {},
            v => panic!("expected bad request, got {:?}", v),
        }
        assert_eq!(read(d.path().join(".git/HEAD")).unwrap(), head);
    }

    #[test]
    fn test_publish_rollback_new_file() {
        let d = tempdir().unwrap();
        let store = Store::new(Box::new(BrokenRepository));
        match publish(d.path(), &store, &Identity::default(), "new.html", "c", b"data") {
            Err(EditError::StorageFailure { .. }) => {},
            v => panic!("expected storage failure, got {:?}", v),
        }
        assert!(!d.path().join("new.html").exists());
    }

    #[test]
    fn test_publish_rollback_existing_file() {
        let d = tempdir().unwrap();
        write(d.path().join("old.html"), "original").unwrap();
        let store = Store::new(Box::new(BrokenRepository));
        assert!(publish(d.path(), &store, &Identity::default(), "old.html", "c", b"replacement").is_err());
        assert_eq!(read_to_string(d.path().join("old.html")).unwrap(), "original");
    }

    #[test]
    fn test_publish_write_failure() {
        let d = tempdir().unwrap();
        // a file where a directory is needed
        write(d.path().join("blocker"), "x").unwrap();
        let store = git_store(d.path());
        match publish(d.path(), &store, &Identity::default(), "blocker/page.html", "c", b"data") {
            Err(EditError::StorageFailure { .. }) => {},
            v => panic!("expected storage failure, got {:?}", v),
        }
        let g = git2::Repository::open(d.path()).unwrap();
        assert!(g.head().is_err());
    }

    #[test]
    fn test_concurrent_publish() {
        let d = tempdir().unwrap();
        let root = d.path().to_path_buf();
        let store = Arc::new(git_store(&root));

        let mut handles = vec!();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let root = root.clone();
            handles.push(thread::spawn(move || {
                let name = format!("p{}.html", i);
                let body = format!("page {}", i);
                publish(&root, &store, &Identity::default(), &name, &name, body.as_bytes()).unwrap()
            }));
        }
        let mut commits: Vec<String> = handles.into_iter().map(|h| h.join().unwrap().commit).collect();

        let g = git2::Repository::open(&root).unwrap();
        let mut walk = g.revwalk().unwrap();
        walk.push_head().unwrap();
        let mut seen = vec!();
        for oid in walk {
            let c = g.find_commit(oid.unwrap()).unwrap();
            assert!(c.parent_count() <= 1);
            seen.push(c.id().to_string());
        }
        assert_eq!(seen.len(), 8);
        seen.sort();
        commits.sort();
        assert_eq!(seen, commits);

        for i in 0..8 {
            let name = format!("p{}.html", i);
            let v = history(&root, &store, &name).unwrap();
            assert_eq!(v.listing.len(), 1);
            assert_eq!(v.listing[0].comment, name);
        }
    }
}
