//! Digest computation and verification.
use chrono::Utc;
use log::debug;
use url::Url;

use crate::auth::{
    AuthSpec,
    AuthError,
    AuthResult,
    ALGORITHM,
    OPAQUE,
    QOP,
};
use crate::config::Credentials;

/// Lowercase hex MD5 of `parts` joined with `:`.
pub fn md5_combine(parts: &[&str]) -> String {
    let mut ctx = md5::Context::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            ctx.consume(b":");
        }
        ctx.consume(p.as_bytes());
    }
    hex::encode(ctx.compute().0)
}

/// HA1 for a login, suitable for the `password` field of the config document.
pub fn ha1(login: &str, realm: &str, password: &str) -> String {
    md5_combine(&[login, realm, password])
}

/// The `response` value a client holding `ha1` must send for `method` on `path`.
pub fn response_for(ha1: &str, nonce: &str, nc: &str, cnonce: &str, qop: &str, method: &str, path: &str) -> String {
    let ha2 = md5_combine(&[method, path]);
    md5_combine(&[ha1, nonce, nc, cnonce, qop, &ha2])
}

/// Nonce derived from the current time.
pub fn compute_nonce() -> String {
    let now = Utc::now();
    md5_combine(&[&now.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)])
}

// Path component of the signed `uri` parameter.
fn uri_path(uri: &str) -> Option<String> {
    let base = Url::parse("http://localhost/").ok()?;
    let u = base.join(uri).ok()?;
    Some(u.path().to_string())
}

/// Verify a parsed authorization against the request it arrived with.
///
/// `request_path` is the path of the request target, without query. The signed
/// `uri` must be a prefix of it. Every credential is tried in configured order
/// and the first whose expected response matches wins.
///
/// # Arguments
///
/// * `auth` - Authorization parameters submitted by client.
/// * `method` - HTTP method of the request.
/// * `request_path` - Path of the request.
/// * `credentials` - Known logins.
pub fn verify(auth: &AuthSpec, method: &str, request_path: &str, credentials: &Credentials) -> Result<AuthResult, AuthError> {
    if auth.get("opaque") != OPAQUE
        || auth.get("algorithm") != ALGORITHM
        || auth.get("qop") != QOP {
        return Err(AuthError);
    }

    let signed_path = match uri_path(auth.get("uri")) {
        Some(v) => v,
        None => return Err(AuthError),
    };
    if signed_path.len() > request_path.len() || !request_path.starts_with(&signed_path) {
        debug!("signed uri {:?} does not cover {:?}", signed_path, request_path);
        return Err(AuthError);
    }

    let supplied = auth.get("response");
    for credential in credentials.iter() {
        let expected = response_for(
            &credential.ha1,
            auth.get("nonce"),
            auth.get("nc"),
            auth.get("cnonce"),
            auth.get("qop"),
            method,
            request_path,
        );
        if supplied == expected {
            return Ok(AuthResult {
                identity: credential.login.clone(),
            });
        }
    }
    Err(AuthError)
}
