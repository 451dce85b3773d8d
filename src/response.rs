use std::fs::File;
use std::str::FromStr;

use ascii::AsciiString;
use log::{
    debug,
    error,
};
use mime::Mime;
use serde::Serialize;
use tiny_http::{
    Header,
    HeaderField,
    Request,
    Response,
    ResponseBox,
    StatusCode,
};

use crate::auth::Challenge;
use crate::error::EditError;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RequestResultType {
    Found,
    Changed,
    Redirect,
    AuthRequired,
    InputError,
    MethodError,
    RecordError,
    WriteError,
}

/// Outcome of handling a request, before it is turned into a response.
pub struct RequestResult {
    pub typ: RequestResultType,
    /// Text body.
    pub v: Option<String>,
    /// File body, when no text body is set.
    pub f: Option<File>,
    /// Content type of the body.
    pub m: Option<Mime>,
    pub location: Option<String>,
    pub challenge: Option<Challenge>,
}

impl std::fmt::Debug for RequestResult {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "{:?} {:?}", self.typ, self.v)
    }
}

impl RequestResult {
    pub fn new(typ: RequestResultType) -> RequestResult {
        RequestResult {
            typ,
            v: None,
            f: None,
            m: None,
            location: None,
            challenge: None,
        }
    }

    pub fn text(typ: RequestResultType, v: impl Into<String>) -> RequestResult {
        let mut r = RequestResult::new(typ);
        r.v = Some(v.into());
        r.m = Some(mime::TEXT_PLAIN_UTF_8);
        r
    }

    /// JSON body followed by a newline.
    pub fn json<T: Serialize>(typ: RequestResultType, value: &T) -> RequestResult {
        match serde_json::to_string(value) {
            Ok(mut v) => {
                v.push('\n');
                let mut r = RequestResult::new(typ);
                r.v = Some(v);
                r.m = Some(mime::APPLICATION_JSON);
                r
            },
            Err(e) => {
                error!("cannot encode response: {}", e);
                RequestResult::text(RequestResultType::WriteError, "internal error\n")
            },
        }
    }

    pub fn file(f: File, m: Mime) -> RequestResult {
        let mut r = RequestResult::new(RequestResultType::Found);
        r.f = Some(f);
        r.m = Some(m);
        r
    }

    pub fn redirect(location: String) -> RequestResult {
        let mut r = RequestResult::new(RequestResultType::Redirect);
        r.location = Some(location);
        r
    }

    pub fn challenge(c: Challenge) -> RequestResult {
        let mut r = RequestResult::text(RequestResultType::AuthRequired, "401 Unauthorized\n");
        r.challenge = Some(c);
        r
    }

    /// Client response for a handler error. Storage details stay in the log.
    pub fn from_error(e: &EditError) -> RequestResult {
        match e {
            EditError::AuthenticationRequired => {
                RequestResult::text(RequestResultType::AuthRequired, "401 Unauthorized\n")
            },
            EditError::BadRequest(v) => {
                RequestResult::text(RequestResultType::InputError, format!("{}\n", v))
            },
            EditError::NotFound(_) => {
                RequestResult::text(RequestResultType::RecordError, "404 page not found\n")
            },
            EditError::StorageFailure { .. } => {
                RequestResult::text(RequestResultType::WriteError, "Error saving file\n")
            },
            EditError::ReadFailure { .. } => {
                RequestResult::text(RequestResultType::WriteError, "Error reading repository\n")
            },
        }
    }

    pub fn status_code(&self) -> u16 {
        match self.typ {
            RequestResultType::Found => 200,
            RequestResultType::Changed => 200,
            RequestResultType::Redirect => 301,
            RequestResultType::AuthRequired => 401,
            RequestResultType::InputError => 400,
            RequestResultType::RecordError => 404,
            RequestResultType::MethodError => 405,
            RequestResultType::WriteError => 500,
        }
    }
}

fn header(field: &str, value: &str) -> Option<Header> {
    let field = HeaderField::from_str(field).ok()?;
    let value = match AsciiString::from_ascii(value) {
        Ok(v) => v,
        Err(_) => {
            error!("dropping non-ascii {:?} header", field);
            return None;
        },
    };
    Some(Header {
        field,
        value,
    })
}

/// Headers added to every response.
pub fn server_headers() -> Vec<Header> {
    let server_header_v = format!("scriv/{}, tiny_http (Rust)", env!("CARGO_PKG_VERSION"));
    header("Server", &server_header_v).into_iter().collect()
}

/// All headers for `r`, including the server headers.
pub fn result_headers(r: &RequestResult) -> Vec<Header> {
    let mut headers = server_headers();
    if let Some(m) = &r.m {
        headers.extend(header("Content-Type", m.as_ref()));
    }
    if let Some(v) = &r.location {
        headers.extend(header("Location", v));
    }
    if let Some(c) = &r.challenge {
        headers.extend(header("WWW-Authenticate", &c.to_string()));
    }
    headers
}

pub fn exec_response(req: Request, r: RequestResult) {
    let code = r.status_code();
    let headers = result_headers(&r);

    let mut res: ResponseBox = match (r.v, r.f) {
        (Some(v), _) => {
            Response::from_string(v).with_status_code(StatusCode(code)).boxed()
        },
        (None, Some(f)) => {
            Response::from_file(f).with_status_code(StatusCode(code)).boxed()
        },
        (None, None) => {
            Response::empty(StatusCode(code)).boxed()
        },
    };
    for h in headers {
        res.add_header(h);
    }

    let url = req.url().to_string();
    match req.respond(res) {
        Ok(_) => {
            debug!("responded {} to {}", code, url);
        },
        Err(e) => {
            error!("cannot respond to {}: {}", url, e);
        },
    }
}
