//! Startup configuration document.
//!
//! The document is JSON with one required `users` array. Each user carries its
//! login and the precomputed HA1 digest (`MD5(login:realm:password)`) under the
//! key `password`; plaintext passwords never appear.
//!
//! ``` ignore,
//! {
//!     "users": [{"login": "alice", "password": "9d0a4fe1cbc5b0d0a1f658fdc1e6f5a7"}],
//!     "realm": "Jason's Server",
//!     "author": {"name": "Rand Om Hacker", "email": "random@hacker.com"}
//! }
//! ```
use std::fs::read;
use std::io;
use std::path::{
    Path,
    PathBuf,
};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::repo::Identity;

pub const DEFAULT_REALM: &str = "Jason's Server";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("malformed config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
    /// HA1 digest, not the password itself.
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub users: Vec<User>,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let buf = read(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let cfg: Config = serde_json::from_slice(&buf).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!("loaded {} users from {:?}", cfg.users.len(), path);
        Ok(cfg)
    }

    pub fn realm(&self) -> &str {
        match &self.realm {
            Some(v) => v.as_str(),
            None => DEFAULT_REALM,
        }
    }

    pub fn identity(&self) -> Identity {
        match &self.author {
            Some(v) => Identity::new(&v.name, &v.email),
            None => Identity::default(),
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.users.iter().map(|u| Credential {
                login: u.login.clone(),
                ha1: u.password.clone(),
            }).collect()
        )
    }
}

/// One known login and its HA1 digest.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub login: String,
    pub ha1: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "Credential({})", self.login)
    }
}

/// Read-only credential list, in configured order.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    entries: Vec<Credential>,
}

impl Credentials {
    pub fn new(entries: Vec<Credential>) -> Credentials {
        Credentials {
            entries,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
