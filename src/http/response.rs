//! Handler responses.
//!
//! # Responsibilities
//! - Carry status, ordered headers and trailers produced by a handler
//! - Hold exactly one body: an in-memory buffer or an open file region
//! - Provide the fixed error pages the dispatcher answers with
//!
//! # Design Decisions
//! - Built by value: once a handler returns it, nothing mutates it
//! - Header and trailer lists keep order and allow duplicates
//! - Fixed pages are constants so their bytes never drift

use std::fs::File;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

pub const NOT_FOUND_STATUS: u16 = 404;
pub const NOT_FOUND_BODY: &str = r#"{"error":"Not Found","code":"NOT_FOUND"}"#;

pub const METHOD_NOT_ALLOWED_STATUS: u16 = 405;
pub const METHOD_NOT_ALLOWED_BODY: &str =
    r#"{"error":"Method not acceptable","code":"METHOD_NOT_ACCEPTABLE"}"#;

pub const BAD_REQUEST_STATUS: u16 = 400;
pub const BAD_REQUEST_BODY: &str = r#"{"error":"Malformed request","code":"BAD_REQUEST"}"#;

pub const REQUEST_TIMEOUT_STATUS: u16 = 408;
pub const REQUEST_TIMEOUT_BODY: &str = r#"{"error":"Request timeout","code":"REQUEST_TIMEOUT"}"#;

pub const PAYLOAD_TOO_LARGE_STATUS: u16 = 413;
pub const PAYLOAD_TOO_LARGE_BODY: &str =
    r#"{"error":"Request body too large","code":"BODY_TOO_LARGE"}"#;

pub const SERVICE_UNAVAILABLE_STATUS: u16 = 503;
pub const SERVICE_UNAVAILABLE_BODY: &str =
    r#"{"error":"Server shutting down","code":"SHUTTING_DOWN"}"#;

pub const INTERNAL_ERROR_STATUS: u16 = 500;
pub const INTERNAL_ERROR_BODY: &str =
    r#"{"error":"Internal server error","code":"INTERNAL_ERROR"}"#;

/// A region of an open file to send as the body.
#[derive(Debug)]
pub struct FileRegion {
    pub file: File,
    pub offset: u64,
    /// `None` sends everything from `offset` to end of file.
    pub len: Option<u64>,
}

/// Response body, tagged by kind.
#[derive(Debug)]
pub enum ResponseBody {
    Buffer(Vec<u8>),
    File(FileRegion),
}

/// Discriminator for [`ResponseBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Buffer,
    File,
}

/// The result of handling a request.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    trailers: Vec<(String, String)>,
    body: ResponseBody,
}

impl Response {
    /// Empty-bodied response.
    pub fn new(status: u16) -> Self {
        Self::bytes(status, Vec::new())
    }

    pub fn bytes(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            trailers: Vec::new(),
            body: ResponseBody::Buffer(body.into()),
        }
    }

    /// `text/plain` body.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::bytes(status, body.into().into_bytes())
            .with_header(CONTENT_TYPE, "text/plain; charset=utf-8")
    }

    /// `application/json` body from already-serialized text.
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self::bytes(status, body.into().into_bytes()).with_header(CONTENT_TYPE, JSON_CONTENT_TYPE)
    }

    /// Send a whole file. Ownership of the handle moves to the transport.
    pub fn file(status: u16, file: File) -> Self {
        Self::file_region(status, file, 0, None)
    }

    pub fn file_region(status: u16, file: File, offset: u64, len: Option<u64>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            trailers: Vec::new(),
            body: ResponseBody::File(FileRegion { file, offset, len }),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_trailer(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailers.push((name.into(), value.into()));
        self
    }

    pub fn not_found() -> Self {
        Self::json(NOT_FOUND_STATUS, NOT_FOUND_BODY)
    }

    pub fn method_not_allowed() -> Self {
        Self::json(METHOD_NOT_ALLOWED_STATUS, METHOD_NOT_ALLOWED_BODY)
    }

    pub fn bad_request() -> Self {
        Self::json(BAD_REQUEST_STATUS, BAD_REQUEST_BODY)
    }

    pub fn request_timeout() -> Self {
        Self::json(REQUEST_TIMEOUT_STATUS, REQUEST_TIMEOUT_BODY)
    }

    pub fn payload_too_large() -> Self {
        Self::json(PAYLOAD_TOO_LARGE_STATUS, PAYLOAD_TOO_LARGE_BODY)
    }

    pub fn internal_error() -> Self {
        Self::json(INTERNAL_ERROR_STATUS, INTERNAL_ERROR_BODY)
    }

    pub fn service_unavailable() -> Self {
        Self::json(SERVICE_UNAVAILABLE_STATUS, SERVICE_UNAVAILABLE_BODY)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn trailers(&self) -> &[(String, String)] {
        &self.trailers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn kind(&self) -> ResponseKind {
        match self.body {
            ResponseBody::Buffer(_) => ResponseKind::Buffer,
            ResponseBody::File(_) => ResponseKind::File,
        }
    }

    pub fn into_parts(self) -> (u16, Vec<(String, String)>, Vec<(String, String)>, ResponseBody) {
        (self.status, self.headers, self.trailers, self.body)
    }
}
