//! Top-level routing across the three mounts and the accept loop.
use std::sync::Arc;
use std::thread;

use log::{
    debug,
    error,
    info,
};
use tiny_http::{
    Request,
    Server,
};
use url::Url;

use crate::path::decode;
use crate::request::{
    EditRequest,
    EditServer,
};
use crate::response::{
    exec_response,
    RequestResult,
    RequestResultType,
};
use crate::serve::StaticTree;

/// Path of a request target with the query removed and dot segments resolved.
///
/// The result stays percent-encoded.
pub fn request_path(target: &str) -> Option<String> {
    let target = match target.split_once('?') {
        Some((v, _)) => v,
        None => target,
    };
    let abs = if target.starts_with('/') {
        format!("http://localhost{}", target)
    } else {
        format!("http://localhost/{}", target)
    };
    match Url::parse(&abs) {
        Ok(v) => Some(v.path().to_string()),
        Err(e) => {
            debug!("unparseable request target {:?}: {}", target, e);
            None
        },
    }
}

fn header_value(req: &Request, field: &'static str) -> Option<String> {
    req.headers().iter()
        .find(|h| h.field.equiv(field))
        .map(|h| h.value.as_str().to_string())
}

/// Routes requests to the editor asset tree, the edit namespace or the public tree.
pub struct Router {
    edit: EditServer,
    public: StaticTree,
    ace: Option<StaticTree>,
}

impl Router {
    pub fn new(edit: EditServer, public: StaticTree, ace: Option<StaticTree>) -> Router {
        Router {
            edit,
            public,
            ace,
        }
    }

    fn serve_tree(tree: &StaticTree, req: &Request, relative: &str) -> RequestResult {
        match decode(relative) {
            Some(v) => tree.lookup(req.method(), &v),
            None => RequestResult::text(RequestResultType::InputError, "bad path\n"),
        }
    }

    pub fn handle(&self, mut req: Request) {
        let path = match request_path(req.url()) {
            Some(v) => v,
            None => {
                exec_response(req, RequestResult::text(RequestResultType::InputError, "bad path\n"));
                return;
            },
        };
        let mount = self.edit.mount();

        let result = match path.strip_prefix(mount) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                match (&self.ace, rest.strip_prefix("/ace/")) {
                    (Some(tree), Some(asset)) => Router::serve_tree(tree, &req, asset),
                    _ => {
                        let authorization = header_value(&req, "Authorization");
                        let content_type = header_value(&req, "Content-Type");
                        let method = req.method().clone();
                        self.edit.process(EditRequest {
                            method,
                            path: path.clone(),
                            authorization,
                            content_type,
                            body: req.as_reader(),
                        })
                    },
                }
            },
            _ => Router::serve_tree(&self.public, &req, &path),
        };
        exec_response(req, result);
    }
}

/// Serve requests on `threads` worker threads until the server stops accepting.
pub fn run(server: Arc<Server>, router: Arc<Router>, threads: usize) {
    let mut handles = vec!();
    for i in 0..threads.max(1) {
        let server = Arc::clone(&server);
        let router = Arc::clone(&router);
        handles.push(thread::spawn(move || {
            debug!("worker {} started", i);
            loop {
                match server.recv() {
                    Ok(req) => router.handle(req),
                    Err(e) => {
                        error!("cannot receive request: {}", e);
                        break;
                    },
                }
            }
        }));
    }
    info!("serving with {} workers", handles.len());
    for h in handles {
        if h.join().is_err() {
            error!("worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::request_path;

    #[test]
    fn test_request_path() {
        assert_eq!(request_path("/edit/v/a.html?x=1").unwrap(), "/edit/v/a.html");
        assert_eq!(request_path("/a/../b/./c").unwrap(), "/b/c");
        assert_eq!(request_path("/my%20page.html").unwrap(), "/my%20page.html");
        assert_eq!(request_path("index.html").unwrap(), "/index.html");
        assert_eq!(request_path("/../../etc/passwd").unwrap(), "/etc/passwd");
    }
}
