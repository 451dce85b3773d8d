//! Extraction of publish requests from `multipart/form-data` bodies.
//!
//! Two forms are accepted. The upload form carries a `comment` and a `page`
//! file part; only the base name of the client filename is kept, so uploads
//! always land directly in the root. The editor form carries `comment`,
//! `filename` and `body` parts; the filename is cleaned and may name nested
//! directories.
use std::collections::HashMap;
use std::io::Read;
use std::str::FromStr;

use log::debug;
use mime::Mime;
use multipart::server::Multipart;

use crate::error::EditError;
use crate::path::{
    base_name,
    clean,
    is_metadata,
};

/// A publish request taken from a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Cleaned path relative to the root.
    pub filename: String,
    pub comment: String,
    pub content: Vec<u8>,
}

struct Part {
    filename: Option<String>,
    data: Vec<u8>,
}

/// Boundary of a `multipart/form-data` content type.
pub fn boundary(content_type: Option<&str>) -> Result<String, EditError> {
    let s = match content_type {
        Some(v) => v,
        None => return Err(EditError::bad_request("missing content type")),
    };
    let m = match Mime::from_str(s) {
        Ok(v) => v,
        Err(_) => return Err(EditError::bad_request("error parsing media type")),
    };
    if m.type_() != mime::MULTIPART || m.subtype() != mime::FORM_DATA {
        return Err(EditError::bad_request(format!("bad media type [outer=\"{}/{}\"]", m.type_(), m.subtype())));
    }
    match m.get_param(mime::BOUNDARY) {
        Some(v) => Ok(v.as_str().to_string()),
        None => Err(EditError::bad_request("missing multipart boundary")),
    }
}

fn read_parts(content_type: Option<&str>, body: impl Read) -> Result<HashMap<String, Part>, EditError> {
    let b = boundary(content_type)?;
    let mut form = Multipart::with_body(body, b);
    let mut parts = HashMap::new();
    loop {
        let mut field = match form.read_entry() {
            Ok(Some(v)) => v,
            Ok(None) => break,
            Err(e) => {
                debug!("malformed multipart body: {}", e);
                return Err(EditError::bad_request("malformed multipart body"));
            },
        };
        let name = field.headers.name.to_string();
        let mut data = vec!();
        if let Err(e) = field.data.read_to_end(&mut data) {
            debug!("cannot read part {:?}: {}", name, e);
            return Err(EditError::bad_request("error reading multipart body"));
        }
        debug!("part {:?} filename {:?} {} bytes", name, field.headers.filename, data.len());
        parts.insert(name, Part {
            filename: field.headers.filename.clone(),
            data,
        });
    }
    Ok(parts)
}

fn take(parts: &mut HashMap<String, Part>, name: &str) -> Result<Part, EditError> {
    match parts.remove(name) {
        Some(v) => Ok(v),
        None => Err(EditError::bad_request(format!("missing form field {}", name))),
    }
}

fn page_name(name: Option<String>) -> Result<String, EditError> {
    match name {
        Some(v) => {
            if is_metadata(&v) {
                return Err(EditError::bad_request(format!("filename {} is reserved", v)));
            }
            Ok(v)
        },
        None => Err(EditError::bad_request("empty filename")),
    }
}

fn text(part: Part, name: &str) -> Result<String, EditError> {
    match String::from_utf8(part.data) {
        Ok(v) => Ok(v),
        Err(_) => Err(EditError::bad_request(format!("form field {} is not text", name))),
    }
}

/// Read the upload form (`comment`, `page`).
pub fn read_page_upload(content_type: Option<&str>, body: impl Read) -> Result<Upload, EditError> {
    let mut parts = read_parts(content_type, body)?;
    let comment = text(take(&mut parts, "comment")?, "comment")?;
    let page = take(&mut parts, "page")?;
    let filename = page_name(page.filename.as_deref().and_then(base_name))?;
    Ok(Upload {
        filename,
        comment,
        content: page.data,
    })
}

/// Read the editor form (`comment`, `filename`, `body`).
pub fn read_html_edit(content_type: Option<&str>, body: impl Read) -> Result<Upload, EditError> {
    let mut parts = read_parts(content_type, body)?;
    let comment = text(take(&mut parts, "comment")?, "comment")?;
    let raw_name = text(take(&mut parts, "filename")?, "filename")?;
    let content = take(&mut parts, "body")?.data;
    let filename = page_name(clean(&raw_name))?;
    Ok(Upload {
        filename,
        comment,
        content,
    })
}
