//! Boundary contract with the transport collaborator.
//!
//! The transport owns sockets, TLS and HTTP/1.x parsing. For every protocol
//! event it hands the dispatcher a [`RequestEvent`] plus a
//! [`TransportConnection`] through which request metadata can be enumerated,
//! and it turns the returned [`Outcome`] into wire bytes.

use std::fs::File;
use std::net::SocketAddr;

use crate::http::request::Credentials;

/// One callback invocation for a request.
#[derive(Debug)]
pub struct RequestEvent<'a> {
    pub method: &'a str,
    /// Raw request path, still percent-encoded.
    pub url: &'a str,
    pub version: &'a str,
    /// Body bytes delivered with this event.
    pub upload: &'a [u8],
    /// Bytes of `upload` not yet consumed. The dispatcher sets it to zero once
    /// it has taken them; an event arriving with zero means the body is done.
    pub remaining: &'a mut usize,
}

/// Metadata queries the transport answers for the request being served.
///
/// Visitors are invoked once per entry, in transport order.
pub trait TransportConnection {
    fn visit_headers(&self, visit: &mut dyn FnMut(&str, &str));
    fn visit_cookies(&self, visit: &mut dyn FnMut(&str, &str));
    fn visit_trailers(&self, visit: &mut dyn FnMut(&str, &str));
    /// Query arguments with values still percent-encoded.
    fn visit_query_args(&self, visit: &mut dyn FnMut(&str, &str));
    fn basic_auth(&self) -> Option<Credentials>;
    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Body of a materialized response.
#[derive(Debug)]
pub enum Payload {
    /// Transport-owned copy of the response bytes.
    Buffer(Vec<u8>),
    /// Owned file handle; the transport closes it after sending `len` bytes
    /// starting at `offset`.
    File { file: File, offset: u64, len: u64 },
}

impl Payload {
    pub fn len(&self) -> u64 {
        match self {
            Payload::Buffer(bytes) => bytes.len() as u64,
            Payload::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A response in the shape the transport queues.
#[derive(Debug)]
pub struct Materialized {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub trailers: Vec<(String, String)>,
    pub payload: Payload,
}

/// What the transport should do after an event.
#[derive(Debug)]
pub enum Outcome {
    /// Not answered yet; call again with the next event.
    Continue,
    /// Queue this response.
    Respond(Materialized),
}

impl Outcome {
    pub fn is_continue(&self) -> bool {
        matches!(self, Outcome::Continue)
    }

    pub fn into_response(self) -> Option<Materialized> {
        match self {
            Outcome::Continue => None,
            Outcome::Respond(materialized) => Some(materialized),
        }
    }
}
