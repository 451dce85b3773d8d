//! HTTP Digest authentication (RFC 2617, `MD5` with `qop=auth`).
//!
//! The server supports exactly one profile. A client `Authorization` header is
//! parsed into an [AuthSpec](crate::auth::AuthSpec), and
//! [digest::verify](crate::auth::digest::verify) tests it against every known
//! credential. Any failure is answered with a fresh
//! [Challenge](crate::auth::Challenge).
//!
//! Issued nonces are not tracked. Any nonce the client echoes back is
//! accepted as long as the response digest over it is correct.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub mod digest;

pub const OPAQUE: &str = "foo";
pub const QOP: &str = "auth";
pub const ALGORITHM: &str = "MD5";

/// Parameters every accepted `Authorization` header must carry.
pub const REQUIRED_PARAMS: [&str; 10] = [
    "username",
    "realm",
    "nonce",
    "uri",
    "qop",
    "nc",
    "cnonce",
    "response",
    "opaque",
    "algorithm",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthSpecError {
    #[error("not a digest authorization")]
    Scheme,
    #[error("missing digest parameter {0}")]
    Missing(&'static str),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("authentication failed")]
pub struct AuthError;

/// Parsed parameters of a `Digest` authorization header.
pub struct AuthSpec {
    params: HashMap<String, String>,
}

impl AuthSpec {
    pub fn get(&self, key: &str) -> &str {
        match self.params.get(key) {
            Some(v) => v.as_str(),
            None => "",
        }
    }

    pub fn username(&self) -> &str {
        self.get("username")
    }
}

impl FromStr for AuthSpec {
    type Err = AuthSpecError;

    fn from_str(s: &str) -> Result<AuthSpec, AuthSpecError> {
        let s = s.trim_start();
        let (scheme, rest) = match s.split_once(|c: char| c.is_ascii_whitespace()) {
            Some(v) => v,
            None => return Err(AuthSpecError::Scheme),
        };
        if !scheme.eq_ignore_ascii_case("digest") {
            return Err(AuthSpecError::Scheme);
        }

        let params = parse_params(rest);
        for k in REQUIRED_PARAMS.iter() {
            if !params.contains_key(*k) {
                return Err(AuthSpecError::Missing(*k));
            }
        }
        Ok(AuthSpec {
            params,
        })
    }
}

impl fmt::Debug for AuthSpec {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Digest username={:?} uri={:?}", self.username(), self.get("uri"))
    }
}

// key=value and key="quoted, value" pairs separated by commas.
fn parse_params(s: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = s.chars().peekable();
    loop {
        while let Some(c) = chars.peek() {
            if *c == ',' || c.is_ascii_whitespace() {
                chars.next();
            } else {
                break;
            }
        }
        let mut key = String::new();
        while let Some(c) = chars.peek() {
            if *c == '=' || *c == ',' {
                break;
            }
            key.push(*c);
            chars.next();
        }
        if key.is_empty() && chars.peek().is_none() {
            break;
        }
        if chars.next() != Some('=') {
            // bare token without a value
            continue;
        }

        let mut value = String::new();
        while let Some(c) = chars.peek() {
            if !c.is_ascii_whitespace() {
                break;
            }
            chars.next();
        }
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    },
                    '"' => break,
                    v => value.push(v),
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
            value = value.trim_end().to_string();
        }
        params.insert(key.trim().to_ascii_lowercase(), value);
    }
    params
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    /// Login of the credential that matched.
    pub identity: String,
}

/// A `WWW-Authenticate` challenge.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub realm: String,
    pub nonce: String,
}

impl Challenge {
    /// Challenge for `realm` with a freshly computed nonce.
    pub fn new(realm: &str) -> Challenge {
        Challenge {
            realm: realm.to_string(),
            nonce: digest::compute_nonce(),
        }
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "Digest realm=\"{}\", nonce=\"{}\", qop=\"{}\", opaque=\"{}\", algorithm=\"{}\"",
            self.realm.replace('"', "\\\""),
            self.nonce,
            QOP,
            OPAQUE,
            ALGORITHM,
        )
    }
}
