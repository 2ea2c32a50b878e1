//! Request accumulator.
//!
//! # Responsibilities
//! - Collect method, path, version, headers, cookies and trailers
//! - Merge query, form-body and path arguments into one mapping
//! - Grow the raw body while it streams in
//! - Carry client address, port and basic-auth credentials
//!
//! # Design Decisions
//! - Header names are stored lowercased; lookups are case-insensitive
//! - Every mapping is last-write-wins
//! - The body only grows through the crate-internal `append_body`; handlers
//!   receive `&Request` once it is complete

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::http::method::Method;

/// Basic-auth user and password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// An in-flight request, read-only to handlers.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    version: String,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    trailers: HashMap<String, String>,
    args: HashMap<String, String>,
    body: Vec<u8>,
    requestor: Option<SocketAddr>,
    credentials: Option<Credentials>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            version: version.into(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            trailers: HashMap::new(),
            args: HashMap::new(),
            body: Vec::new(),
            requestor: None,
            credentials: None,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Standardized, percent-decoded path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    pub fn set_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn trailer(&self, name: &str) -> Option<&str> {
        self.trailers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn trailers(&self) -> &HashMap<String, String> {
        &self.trailers
    }

    pub fn set_trailer(&mut self, name: &str, value: impl Into<String>) {
        self.trailers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Query, form or path argument.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    pub fn args(&self) -> &HashMap<String, String> {
        &self.args
    }

    pub fn set_arg(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.args.insert(name.into(), value.into());
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub(crate) fn append_body(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    /// Client socket address, when the transport reported one.
    pub fn requestor(&self) -> Option<SocketAddr> {
        self.requestor
    }

    pub fn requestor_port(&self) -> Option<u16> {
        self.requestor.map(|addr| addr.port())
    }

    pub fn set_requestor(&mut self, addr: SocketAddr) {
        self.requestor = Some(addr);
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }
}
