use std::io::Read;
use std::path::{
    Path,
    PathBuf,
};
use std::str::FromStr;

use log::{
    debug,
    error,
    info,
};
use tiny_http::Method;

use crate::auth::{
    digest,
    AuthResult,
    AuthSpec,
    Challenge,
};
use crate::config::{
    Config,
    Credentials,
};
use crate::error::EditError;
use crate::form::{
    read_html_edit,
    read_page_upload,
};
use crate::history::history;
use crate::listing::{
    list_all,
    status_of,
};
use crate::path::{
    clean,
    decode,
    is_metadata,
    public_url,
};
use crate::record::{
    publish,
    PublishResult,
};
use crate::repo::{
    Identity,
    RepoStatus,
    Store,
};
use crate::response::{
    RequestResult,
    RequestResultType,
};
use crate::serve::StaticTree;

/// A request to the edit namespace.
pub struct EditRequest<R: Read> {
    pub method: Method,
    /// Raw (percent-encoded) path of the request target, without query.
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: R,
}

/// Handler for everything under the edit mount.
///
/// Every request is authenticated from scratch; there is no session.
pub struct EditServer {
    root: PathBuf,
    mount: String,
    realm: String,
    credentials: Credentials,
    author: Identity,
    store: Store,
    edit: StaticTree,
}

impl EditServer {
    /// # Arguments
    ///
    /// * `root` - Page tree, also the repository working tree.
    /// * `mount` - Path prefix of the edit namespace, e.g. `/edit`.
    /// * `edit_dir` - Tree served for unrecognized edit paths.
    /// * `cfg` - Users, realm and commit identity.
    /// * `store` - Repository recording the page tree.
    pub fn new(root: &Path, mount: &str, edit_dir: &Path, cfg: &Config, store: Store) -> EditServer {
        EditServer {
            root: root.to_path_buf(),
            mount: mount.trim_end_matches('/').to_string(),
            realm: cfg.realm().to_string(),
            credentials: cfg.credentials(),
            author: cfg.identity(),
            store,
            edit: StaticTree::new(edit_dir),
        }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Verify the `Authorization` header of a request.
    ///
    /// Every failure is the same `AuthenticationRequired`.
    pub fn authenticate(&self, method: &Method, path: &str, authorization: Option<&str>) -> Result<AuthResult, EditError> {
        let header = match authorization {
            Some(v) => v,
            None => return Err(EditError::AuthenticationRequired),
        };
        let spec = match AuthSpec::from_str(header) {
            Ok(v) => v,
            Err(e) => {
                debug!("rejecting authorization: {}", e);
                return Err(EditError::AuthenticationRequired);
            },
        };
        debug!("verifying {:?}", spec);
        digest::verify(&spec, &method.to_string(), path, &self.credentials)
            .map_err(|_| EditError::AuthenticationRequired)
    }

    fn need_authorization(&self) -> RequestResult {
        let c = Challenge::new(&self.realm);
        debug!("need: {}", c);
        RequestResult::challenge(c)
    }

    /// Authenticate and dispatch one request.
    pub fn process<R: Read>(&self, req: EditRequest<R>) -> RequestResult {
        let auth = match self.authenticate(&req.method, &req.path, req.authorization.as_deref()) {
            Ok(v) => v,
            Err(e) => {
                debug!("{} for {} {}", e, req.method, req.path);
                return self.need_authorization();
            },
        };
        info!("handling {} {} for {}", req.method, req.path, auth.identity);

        let sub = match req.path.strip_prefix(&self.mount) {
            Some(v) => v.to_string(),
            None => return RequestResult::text(RequestResultType::RecordError, "404 page not found\n"),
        };

        if req.method == Method::Post && sub == "/update" {
            self.handle_page_update(req)
        } else if req.method == Method::Post && sub == "/html" {
            self.handle_html_edit(req)
        } else if let Some(rest) = sub.strip_prefix("/git/") {
            self.handle_git(rest)
        } else if let Some(rest) = sub.strip_prefix("/v/") {
            self.handle_versions(rest)
        } else if sub == "/list" {
            self.handle_listing()
        } else {
            match decode(&sub) {
                Some(v) => self.edit.lookup(&req.method, &v),
                None => bad_path(),
            }
        }
    }

    fn handle_page_update<R: Read>(&self, req: EditRequest<R>) -> RequestResult {
        let upload = match read_page_upload(req.content_type.as_deref(), req.body) {
            Ok(v) => v,
            Err(e) => {
                debug!("upload rejected: {}", e);
                return RequestResult::from_error(&e);
            },
        };
        match publish(&self.root, &self.store, &self.author, &upload.filename, &upload.comment, &upload.content) {
            Ok(_) => RequestResult::redirect(public_url(&upload.filename)),
            Err(e) => RequestResult::from_error(&e),
        }
    }

    fn handle_html_edit<R: Read>(&self, req: EditRequest<R>) -> RequestResult {
        let upload = match read_html_edit(req.content_type.as_deref(), req.body) {
            Ok(v) => v,
            Err(e) => {
                debug!("edit rejected: {}", e);
                return RequestResult::from_error(&e);
            },
        };
        match publish(&self.root, &self.store, &self.author, &upload.filename, &upload.comment, &upload.content) {
            Ok(_) => RequestResult::json(RequestResultType::Changed, &PublishResult::ok()),
            Err(e) => {
                debug!("edit of {:?} failed: {}", upload.filename, e);
                RequestResult::json(RequestResultType::WriteError, &PublishResult::failed())
            },
        }
    }

    fn handle_git(&self, rest: &str) -> RequestResult {
        let mut out = String::new();
        if let Some(name) = rest.strip_prefix("status/") {
            let status = match decode(name).as_deref().and_then(clean) {
                Some(v) if is_metadata(&v) => return bad_path(),
                Some(v) => status_of(&self.store, &v),
                None => Ok(RepoStatus::Unknown),
            };
            match status {
                Ok(v) => out.push_str(v.label()),
                Err(e) => return RequestResult::from_error(&e),
            }
        }
        out.push('\n');
        RequestResult::text(RequestResultType::Found, out)
    }

    fn handle_versions(&self, rest: &str) -> RequestResult {
        let name = match decode(rest).as_deref().and_then(clean) {
            Some(v) if !is_metadata(&v) => v,
            _ => return bad_path(),
        };
        match history(&self.root, &self.store, &name) {
            Ok(v) => RequestResult::json(RequestResultType::Found, &v),
            Err(e) => {
                if e.status_code() >= 500 {
                    error!("history of {:?} failed: {}", name, e);
                }
                RequestResult::from_error(&e)
            },
        }
    }

    fn handle_listing(&self) -> RequestResult {
        let list = list_all(&self.root, &self.store);
        RequestResult::json(RequestResultType::Found, &list)
    }
}

fn bad_path() -> RequestResult {
    RequestResult::from_error(&EditError::bad_request("bad path"))
}

#[cfg(test)]
mod tests {
    use std::fs::{
        create_dir_all,
        read_to_string,
        write,
    };
    use std::io::{
        empty,
        Read,
    };

    use tempfile::{
        tempdir,
        TempDir,
    };
    use tiny_http::Method;

    use super::{
        EditRequest,
        EditServer,
    };
    use crate::auth::digest::{
        ha1,
        response_for,
    };
    use crate::config::{
        Config,
        User,
        DEFAULT_REALM,
    };
    use crate::form::tests::{
        body,
        content_type,
    };
    use crate::repo::{
        GitRepository,
        Store,
    };
    use crate::response::{
        RequestResult,
        RequestResultType,
    };

    struct Fixture {
        _d: TempDir,
        root: std::path::PathBuf,
        server: EditServer,
    }

    fn fixture() -> Fixture {
        let d = tempdir().unwrap();
        let root = d.path().join("www");
        let edit = d.path().join("edit");
        create_dir_all(&root).unwrap();
        create_dir_all(&edit).unwrap();
        write(edit.join("editor.html"), "<textarea>").unwrap();

        let cfg = Config {
            users: vec!(User {
                login: String::from("alice"),
                password: ha1("alice", DEFAULT_REALM, "secret"),
            }),
            realm: None,
            author: None,
        };
        let store = Store::new(Box::new(GitRepository::open_or_init(&root).unwrap()));
        let server = EditServer::new(&root, "/edit", &edit, &cfg, store);
        Fixture {
            _d: d,
            root,
            server,
        }
    }

    fn authorization(method: &str, path: &str, password: &str) -> String {
        let h = ha1("alice", DEFAULT_REALM, password);
        let rsp = response_for(&h, "abc123", "00000001", "0a4f113b", "auth", method, path);
        format!(
            r#"Digest username="alice", realm="{}", nonce="abc123", uri="{}", qop=auth, nc=00000001, cnonce="0a4f113b", response="{}", opaque="foo", algorithm=MD5"#,
            DEFAULT_REALM,
            path,
            rsp,
        )
    }

    fn get(f: &Fixture, path: &str) -> RequestResult {
        f.server.process(EditRequest {
            method: Method::Get,
            path: path.to_string(),
            authorization: Some(authorization("GET", path, "secret")),
            content_type: None,
            body: empty(),
        })
    }

    fn post(f: &Fixture, path: &str, form: Vec<u8>) -> RequestResult {
        f.server.process(EditRequest {
            method: Method::Post,
            path: path.to_string(),
            authorization: Some(authorization("POST", path, "secret")),
            content_type: Some(content_type()),
            body: &form[..],
        })
    }

    fn json(r: &RequestResult) -> serde_json::Value {
        serde_json::from_str(r.v.as_deref().unwrap()).unwrap()
    }

    #[test]
    fn test_challenge_without_authorization() {
        let f = fixture();
        let r = f.server.process(EditRequest {
            method: Method::Get,
            path: String::from("/edit/list"),
            authorization: None,
            content_type: None,
            body: empty(),
        });
        assert_eq!(r.typ, RequestResultType::AuthRequired);
        let c = r.challenge.unwrap();
        assert_eq!(c.realm, DEFAULT_REALM);
        assert!(!c.nonce.is_empty());
    }

    #[test]
    fn test_challenge_wrong_password() {
        let f = fixture();
        let r = f.server.process(EditRequest {
            method: Method::Get,
            path: String::from("/edit/list"),
            authorization: Some(authorization("GET", "/edit/list", "wrong")),
            content_type: None,
            body: empty(),
        });
        assert_eq!(r.typ, RequestResultType::AuthRequired);
        assert!(r.challenge.is_some());
    }

    #[test]
    fn test_challenge_basic_scheme() {
        let f = fixture();
        let r = f.server.process(EditRequest {
            method: Method::Get,
            path: String::from("/edit/list"),
            authorization: Some(String::from("Basic YWxpY2U6c2VjcmV0")),
            content_type: None,
            body: empty(),
        });
        assert_eq!(r.typ, RequestResultType::AuthRequired);
    }

    #[test]
    fn test_publish_and_history() {
        let f = fixture();
        let form = body(&[
            ("comment", None, "c1"),
            ("filename", None, "a/b.txt"),
            ("body", None, "hello"),
        ]);
        let r = post(&f, "/edit/html", form);
        assert_eq!(r.typ, RequestResultType::Changed);
        assert_eq!(json(&r)["status"], "ok");

        let r = get(&f, "/edit/v/a/b.txt");
        assert_eq!(r.typ, RequestResultType::Found);
        let v = json(&r);
        assert_eq!(v["content"], "hello");
        assert_eq!(v["listing"][0]["comment"], "c1");

        let r = get(&f, "/edit/git/status/a/b.txt");
        assert_eq!(r.v.as_deref(), Some("Current\n"));
    }

    #[test]
    fn test_publish_traversal() {
        let f = fixture();
        let form = body(&[
            ("comment", None, "evil"),
            ("filename", None, "../../etc/passwd"),
            ("body", None, "x"),
        ]);
        let r = post(&f, "/edit/html", form);
        assert_eq!(r.typ, RequestResultType::Changed);
        assert_eq!(read_to_string(f.root.join("etc/passwd")).unwrap(), "x");
        assert!(!f.root.parent().unwrap().join("etc").exists());
    }

    #[test]
    fn test_publish_missing_field() {
        let f = fixture();
        let form = body(&[
            ("comment", None, "c1"),
            ("body", None, "hello"),
        ]);
        let r = post(&f, "/edit/html", form);
        assert_eq!(r.typ, RequestResultType::InputError);
    }

    #[test]
    fn test_page_update_redirects() {
        let f = fixture();
        let form = body(&[
            ("comment", None, "logo"),
            ("page", Some("C:/pics/my logo.png"), "PNG"),
        ]);
        let r = post(&f, "/edit/update", form);
        assert_eq!(r.typ, RequestResultType::Redirect);
        assert_eq!(r.location.as_deref(), Some("/my%20logo.png"));
        assert_eq!(read_to_string(f.root.join("my logo.png")).unwrap(), "PNG");

        let r = get(&f, "/edit/v/my%20logo.png");
        assert_eq!(json(&r)["listing"][0]["comment"], "logo");
    }

    #[test]
    fn test_listing() {
        let f = fixture();
        let form = body(&[
            ("comment", None, "c"),
            ("filename", None, "index.html"),
            ("body", None, "<p>hi</p>"),
        ]);
        post(&f, "/edit/html", form);

        let r = get(&f, "/edit/list");
        let v = json(&r);
        let listing = v["listing"].as_array().unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0]["name"], "index.html");
        assert_eq!(listing[0]["size"], 9);
    }

    #[test]
    fn test_git_paths() {
        let f = fixture();
        write(f.root.join("draft.html"), "d").unwrap();
        assert_eq!(get(&f, "/edit/git/status/draft.html").v.as_deref(), Some("WorkingNew\n"));
        assert_eq!(get(&f, "/edit/git/status/").v.as_deref(), Some("Unknown\n"));
        assert_eq!(get(&f, "/edit/git/log").v.as_deref(), Some("\n"));
    }

    #[test]
    fn test_git_status_of_directory() {
        let f = fixture();
        for name in &["docs/a.html", "docs/b.html"] {
            let form = body(&[
                ("comment", None, "c"),
                ("filename", None, name),
                ("body", None, "x"),
            ]);
            assert_eq!(post(&f, "/edit/html", form).typ, RequestResultType::Changed);
        }
        let r = get(&f, "/edit/git/status/docs");
        assert_eq!(r.typ, RequestResultType::Found);
        assert_eq!(r.v.as_deref(), Some("Unknown\n"));
    }

    #[test]
    fn test_metadata_not_reachable() {
        let f = fixture();
        assert_eq!(get(&f, "/edit/v/.git/config").typ, RequestResultType::InputError);
        assert_eq!(get(&f, "/edit/v/docs/..%2F.git/HEAD").typ, RequestResultType::InputError);
        assert_eq!(get(&f, "/edit/git/status/.git/HEAD").typ, RequestResultType::InputError);

        let head = read_to_string(f.root.join(".git/HEAD")).unwrap();
        let form = body(&[
            ("comment", None, "evil"),
            ("filename", None, ".git/HEAD"),
            ("body", None, "ref: refs/heads/evil"),
        ]);
        let r = post(&f, "/edit/html", form);
        assert_eq!(r.typ, RequestResultType::InputError);
        assert_eq!(read_to_string(f.root.join(".git/HEAD")).unwrap(), head);
    }

    #[test]
    fn test_versions_missing_file() {
        let f = fixture();
        assert_eq!(get(&f, "/edit/v/none.html").typ, RequestResultType::InputError);
    }

    #[test]
    fn test_fallback_to_edit_tree() {
        let f = fixture();
        let r = get(&f, "/edit/editor.html");
        assert_eq!(r.typ, RequestResultType::Found);
        let mut s = String::new();
        r.f.unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "<textarea>");

        // GET on a publish endpoint is not a publish
        let r = get(&f, "/edit/html");
        assert_eq!(r.typ, RequestResultType::RecordError);
        assert!(!f.root.join("html").exists());
    }
}
