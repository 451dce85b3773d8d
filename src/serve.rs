//! Plain file trees served without version control: the public root, the raw
//! edit tree and the editor assets.
use std::fs::File;
use std::path::{
    Path,
    PathBuf,
};

use log::debug;
use mime::Mime;
use tiny_http::Method;

use crate::error::EditError;
use crate::path::{
    clean,
    is_metadata,
    resolve,
};
use crate::response::{
    RequestResult,
    RequestResultType,
};

pub const INDEX_FILE: &str = "index.html";

/// Content type for a file, guessed from its extension.
pub fn content_type(p: &Path) -> Mime {
    let ext = match p.extension().and_then(|v| v.to_str()) {
        Some(v) => v.to_ascii_lowercase(),
        None => return mime::APPLICATION_OCTET_STREAM,
    };
    match ext.as_str() {
        "html" | "htm" => mime::TEXT_HTML_UTF_8,
        "css" => mime::TEXT_CSS_UTF_8,
        "js" => mime::APPLICATION_JAVASCRIPT_UTF_8,
        "json" => mime::APPLICATION_JSON,
        "txt" | "md" => mime::TEXT_PLAIN_UTF_8,
        "xml" => mime::TEXT_XML,
        "svg" => mime::IMAGE_SVG,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "pdf" => mime::APPLICATION_PDF,
        "woff" => mime::FONT_WOFF,
        "woff2" => mime::FONT_WOFF2,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// A directory served read-only.
#[derive(Debug, Clone)]
pub struct StaticTree {
    dir: PathBuf,
}

impl StaticTree {
    pub fn new(dir: &Path) -> StaticTree {
        StaticTree {
            dir: dir.to_path_buf(),
        }
    }

    /// Serve `relative` (already percent-decoded) from the tree.
    ///
    /// Directories are served through their index file.
    pub fn lookup(&self, method: &Method, relative: &str) -> RequestResult {
        match method {
            Method::Get | Method::Head => {},
            _ => {
                return RequestResult::text(RequestResultType::MethodError, "405 method not allowed\n");
            },
        }

        let mut fp = match clean(relative) {
            Some(v) => {
                if is_metadata(&v) {
                    return not_found(&v);
                }
                resolve(&self.dir, &v)
            },
            None => self.dir.clone(),
        };
        if fp.is_dir() {
            fp.push(INDEX_FILE);
        }
        debug!("url {:?} resolved to {:?}", relative, fp);

        match File::open(&fp) {
            Ok(f) => {
                let is_file = f.metadata().map(|m| m.is_file()).unwrap_or(false);
                if !is_file {
                    return not_found(relative);
                }
                RequestResult::file(f, content_type(&fp))
            },
            Err(e) => {
                debug!("cannot open {:?}: {}", fp, e);
                not_found(relative)
            },
        }
    }
}

fn not_found(relative: &str) -> RequestResult {
    RequestResult::from_error(&EditError::NotFound(relative.to_string()))
}
