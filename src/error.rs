use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::repo::RepoError;

/// Failures surfaced to an edit namespace client.
///
/// `AuthenticationRequired` never carries the reason; the gate answers every
/// rejected request with the same challenge.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("authentication required")]
    AuthenticationRequired,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage failure on {path:?}: {message}")]
    StorageFailure {
        path: PathBuf,
        message: String,
    },

    #[error("cannot read repository for {path:?}: {message}")]
    ReadFailure {
        path: PathBuf,
        message: String,
    },
}

impl EditError {
    pub fn bad_request(message: impl Into<String>) -> EditError {
        EditError::BadRequest(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, e: io::Error) -> EditError {
        EditError::StorageFailure {
            path: path.into(),
            message: e.to_string(),
        }
    }

    pub fn repo(path: impl Into<PathBuf>, e: RepoError) -> EditError {
        EditError::StorageFailure {
            path: path.into(),
            message: e.to_string(),
        }
    }

    /// A failed repository query, nothing was written.
    pub fn repo_read(path: impl Into<PathBuf>, e: RepoError) -> EditError {
        EditError::ReadFailure {
            path: path.into(),
            message: e.to_string(),
        }
    }

    /// HTTP status code for the error class.
    pub fn status_code(&self) -> u16 {
        match self {
            EditError::AuthenticationRequired => 401,
            EditError::BadRequest(_) => 400,
            EditError::NotFound(_) => 404,
            EditError::StorageFailure { .. } => 500,
            EditError::ReadFailure { .. } => 500,
        }
    }
}
