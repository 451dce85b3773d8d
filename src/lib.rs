#![crate_name = "scriv"]

//! scriv is an HTTP server for editing a tree of pages in place.
//!
//! Every published change is written under the page root and recorded as a
//! commit in the git repository rooted at the same directory, so the history
//! of each page can be listed and its current content read back.
//!
//! ## Mounts
//!
//! Requests under the edit mount (`/edit` by default) must carry an HTTP
//! Digest `Authorization` header (RFC 2617, MD5, `qop=auth`). Requests without
//! one, or with one that does not verify, get a `401` and a fresh challenge.
//! Everything outside the edit mount is served from the page root without
//! authentication. An editor asset tree can be mounted at `<mount>/ace/`,
//! also without authentication.
//!
//! ## Editing
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | POST | `<mount>/update` | publish an uploaded file (`comment`, `page`) and redirect to it |
//! | POST | `<mount>/html` | publish `body` at `filename` with `comment`, answers `{"status": ...}` |
//! | GET | `<mount>/git/status/<path>` | repository status label of a page |
//! | GET | `<mount>/v/<path>` | history and current content of a page |
//! | GET | `<mount>/list` | every file under the page root |
//!
//! Anything else under the mount is served from the raw edit tree.
//!
//! ## Running the daemon
//!
//! See `cargo run -- --help` for the options. Users are read from a JSON
//! document of the form `{"users": [{"login": "...", "password": "<HA1>"}]}`.

/// HTTP Digest authentication.
pub mod auth;

/// Startup configuration document and credentials.
pub mod config;

pub mod error;

/// Multipart form extraction for the publish endpoints.
pub mod form;

/// Per-page version history.
pub mod history;

/// Page listing and per-page repository status.
pub mod listing;

pub mod path;

/// Publishing pages as commits.
pub mod record;

/// Version control capability and its git implementation.
pub mod repo;

/// Encapsulates an incoming edit request.
pub mod request;

/// Encapsulates an outgoing response to remote.
pub mod response;

/// Read-only file trees.
pub mod serve;

pub mod server;
