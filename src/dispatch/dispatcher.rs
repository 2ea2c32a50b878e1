//! Request-cycle driver.
//!
//! # Responsibilities
//! - Advance a ConnectionContext on every transport event
//! - Bind request metadata once headers are queryable
//! - Accumulate streamed body chunks, feeding the form parser when attached
//! - Resolve the endpoint and invoke its handler exactly once
//! - Materialize the handler's response for the transport
//! - Emit one access-log line per answered cycle
//!
//! # Design Decisions
//! - Registration goes through the builder; a built Dispatcher is read-only
//!   and shared across worker threads
//! - Routing misses and unsupported verbs become fixed 404 / 405 pages
//! - Handler errors are returned to the transport untouched
//! - A malformed form body only detaches the parser; the raw body survives

use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::dispatch::handler::{Handler, HandlerError};
use crate::http::form::{is_form_encoded, FormError, FormParser};
use crate::http::method::Method;
use crate::http::request::Request;
use crate::http::response::{FileRegion, Response, ResponseBody};
use crate::http::unescape::{PercentDecoder, Unescaper};
use crate::net::connection::{ConnectionContext, ConnectionId, Phase, PhaseKind, Termination};
use crate::net::transport::{Materialized, Outcome, Payload, RequestEvent, TransportConnection};
use crate::observability::metrics;
use crate::routing::path::standardize;
use crate::routing::{ConfigurationError, EndpointTable};

/// Log target of the per-request access line.
pub const ACCESS_TARGET: &str = "endpoint_dispatch::access";
/// Log target of internally recovered faults.
pub const ERROR_TARGET: &str = "endpoint_dispatch::error";

/// Method label recorded for verbs outside the supported set.
const UNSUPPORTED_METHOD_LABEL: &str = "OTHER";

/// Handler table as held by the dispatcher.
pub type HandlerTable = EndpointTable<Arc<dyn Handler>>;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The handler failed. Nothing has been queued for this request.
    #[error("handler failed: {0}")]
    Handler(#[source] HandlerError),

    /// An event arrived after the handler already ran.
    #[error("request already answered")]
    AlreadyAnswered,

    /// An event arrived in a phase that cannot accept it.
    #[error("event not valid in phase {0:?}")]
    OutOfOrder(PhaseKind),
}

/// Collects registrations, then freezes them into a [`Dispatcher`].
pub struct DispatcherBuilder {
    table: HandlerTable,
    unescaper: Arc<dyn Unescaper>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            table: EndpointTable::new(),
            unescaper: Arc::new(PercentDecoder),
        }
    }

    /// Bind `template` to `handler`. An identical endpoint registered earlier
    /// is silently replaced.
    pub fn register(
        self,
        template: &str,
        handler: impl Handler + 'static,
        family: bool,
    ) -> Result<Self, ConfigurationError> {
        self.register_shared(template, Arc::new(handler), family)
    }

    pub fn register_shared(
        mut self,
        template: &str,
        handler: Arc<dyn Handler>,
        family: bool,
    ) -> Result<Self, ConfigurationError> {
        self.table.register(template, handler, family)?;
        Ok(self)
    }

    pub fn unescaper(mut self, unescaper: impl Unescaper + 'static) -> Self {
        self.unescaper = Arc::new(unescaper);
        self
    }

    pub fn build(self) -> Dispatcher {
        tracing::info!(endpoints = self.table.len(), "Dispatcher ready");
        Dispatcher {
            table: self.table,
            unescaper: self.unescaper,
            exclusive: Mutex::new(()),
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Single entry point for transport events.
pub struct Dispatcher {
    table: HandlerTable,
    unescaper: Arc<dyn Unescaper>,
    exclusive: Mutex<()>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn table(&self) -> &HandlerTable {
        &self.table
    }

    /// Open a request cycle for the complete URI the transport just read.
    pub fn begin(&self, uri: &str) -> ConnectionContext {
        let ctx = ConnectionContext::new(uri);
        tracing::trace!(connection_id = %ctx.id(), uri = %uri, "Request cycle started");
        ctx
    }

    /// Advance `ctx` by one transport event.
    pub fn handle(
        &self,
        ctx: &mut ConnectionContext,
        conn: &dyn TransportConnection,
        event: RequestEvent<'_>,
    ) -> Result<Outcome, DispatchError> {
        if matches!(ctx.phase, Phase::Answered) {
            return Err(DispatchError::AlreadyAnswered);
        }

        let Some(method) = Method::parse(event.method) else {
            *event.remaining = 0;
            ctx.phase = Phase::Answered;
            tracing::debug!(
                connection_id = %ctx.id(),
                method = %event.method,
                "Unsupported method"
            );
            return Ok(self.respond(ctx, event.method, Response::method_not_allowed()));
        };

        match std::mem::replace(&mut ctx.phase, Phase::Answered) {
            Phase::Fresh => {
                let mut request = self.bind_request(method, conn, &event);

                if !method.carries_body() {
                    *event.remaining = 0;
                    ctx.phase = Phase::HeadersBound(request);
                    return self.answer(ctx, conn, method);
                }

                let mut parser = request
                    .header("content-type")
                    .filter(|content_type| is_form_encoded(content_type))
                    .map(|_| FormParser::new());

                self.consume(ctx.id(), &mut request, &mut parser, event.upload, event.remaining);
                ctx.phase = Phase::BodyStreaming { request, parser };
                Ok(Outcome::Continue)
            }
            Phase::BodyStreaming {
                mut request,
                mut parser,
            } => {
                if *event.remaining > 0 {
                    self.consume(ctx.id(), &mut request, &mut parser, event.upload, event.remaining);
                    ctx.phase = Phase::BodyStreaming { request, parser };
                    return Ok(Outcome::Continue);
                }

                if let Some(parser) = parser {
                    if let Err(e) = parser.finish(&mut |key, value| request.set_arg(key, value)) {
                        form_fault(ctx.id(), &e);
                    }
                }
                ctx.phase = Phase::Complete(request);
                self.answer(ctx, conn, method)
            }
            phase @ (Phase::HeadersBound(_) | Phase::Complete(_)) => {
                ctx.phase = phase;
                self.answer(ctx, conn, method)
            }
            Phase::Answered => Err(DispatchError::AlreadyAnswered),
        }
    }

    /// Close a request cycle. Consuming the context releases the request and
    /// any attached body parser, whatever phase was reached.
    pub fn terminate(&self, ctx: ConnectionContext, termination: Termination) {
        match (ctx.phase(), termination) {
            (PhaseKind::Answered, Termination::Completed) => {
                tracing::trace!(connection_id = %ctx.id(), "Request cycle completed");
            }
            (phase, termination) => {
                tracing::debug!(
                    connection_id = %ctx.id(),
                    ?phase,
                    ?termination,
                    body_bytes = ctx.body_len(),
                    "Request cycle ended early"
                );
            }
        }
    }

    fn bind_request(
        &self,
        method: Method,
        conn: &dyn TransportConnection,
        event: &RequestEvent<'_>,
    ) -> Request {
        let path = standardize(&self.unescaper.unescape(event.url));
        let mut request = Request::new(method, path, event.version);

        conn.visit_headers(&mut |name, value| request.set_header(name, value));
        conn.visit_cookies(&mut |name, value| request.set_cookie(name, value));
        conn.visit_trailers(&mut |name, value| request.set_trailer(name, value));
        conn.visit_query_args(&mut |name, value| {
            request.set_arg(name, self.unescaper.unescape(value))
        });

        if let Some(peer) = conn.peer_addr() {
            request.set_requestor(peer);
        }
        if let Some(credentials) = conn.basic_auth() {
            request.set_credentials(credentials);
        }
        request
    }

    fn consume(
        &self,
        id: ConnectionId,
        request: &mut Request,
        parser: &mut Option<FormParser>,
        upload: &[u8],
        remaining: &mut usize,
    ) {
        let chunk = &upload[..(*remaining).min(upload.len())];
        *remaining = 0;
        if chunk.is_empty() {
            return;
        }

        if let Some(active) = parser.as_mut() {
            let fed = active.feed(chunk, &mut |key, value| request.set_arg(key, value));
            if let Err(e) = fed {
                form_fault(id, &e);
                *parser = None;
            }
        }
        request.append_body(chunk);
    }

    fn answer(
        &self,
        ctx: &mut ConnectionContext,
        conn: &dyn TransportConnection,
        method: Method,
    ) -> Result<Outcome, DispatchError> {
        let mut request = match std::mem::replace(&mut ctx.phase, Phase::Answered) {
            Phase::HeadersBound(request) | Phase::Complete(request) => request,
            other => {
                let phase = other.kind();
                ctx.phase = other;
                return Err(DispatchError::OutOfOrder(phase));
            }
        };

        // Trailers may only be known once the body has ended.
        conn.visit_trailers(&mut |name, value| request.set_trailer(name, value));

        let response = match self.table.resolve(request.path()) {
            Ok(resolution) => {
                metrics::record_routing(resolution.kind.as_str());
                tracing::debug!(
                    connection_id = %ctx.id(),
                    path = %request.path(),
                    endpoint = %resolution.endpoint.template(),
                    "Endpoint resolved"
                );
                for (name, value) in resolution.params {
                    request.set_arg(name, value);
                }
                self.invoke(&**resolution.handler, &request)
                    .map_err(DispatchError::Handler)?
            }
            Err(_) => {
                metrics::record_routing("miss");
                tracing::debug!(connection_id = %ctx.id(), path = %request.path(), "No endpoint matched");
                Response::not_found()
            }
        };

        Ok(self.respond(ctx, method.as_str(), response))
    }

    fn invoke(&self, handler: &dyn Handler, request: &Request) -> Result<Response, HandlerError> {
        if handler.exclusive() {
            let _section = self.exclusive.lock().unwrap_or_else(PoisonError::into_inner);
            handler.handle(request)
        } else {
            handler.handle(request)
        }
    }

    fn respond(&self, ctx: &ConnectionContext, method: &str, response: Response) -> Outcome {
        let materialized = match materialize(response) {
            Ok(materialized) => materialized,
            Err(e) => {
                tracing::error!(
                    target: ERROR_TARGET,
                    connection_id = %ctx.id(),
                    error = %e,
                    "Failed to stat file response"
                );
                fixed_page(Response::internal_error())
            }
        };

        tracing::info!(
            target: ACCESS_TARGET,
            connection_id = %ctx.id(),
            status = materialized.status,
            "{} METHOD: {}",
            ctx.uri(),
            method
        );
        metrics::record_request(method_label(method), materialized.status, ctx.started());

        Outcome::Respond(materialized)
    }
}

/// Metric label for a request method. Client tokens never become labels.
fn method_label(method: &str) -> &'static str {
    Method::parse(method).map_or(UNSUPPORTED_METHOD_LABEL, Method::as_str)
}

fn form_fault(id: ConnectionId, error: &FormError) {
    tracing::error!(
        target: ERROR_TARGET,
        connection_id = %id,
        error = %error,
        "Form body rejected, exposing raw body only"
    );
    metrics::record_parse_fault();
}

/// Convert a handler response into the transport's representation. File
/// regions are clamped to the file's current length.
pub fn materialize(response: Response) -> std::io::Result<Materialized> {
    let (status, headers, trailers, body) = response.into_parts();
    let payload = match body {
        ResponseBody::Buffer(bytes) => Payload::Buffer(bytes),
        ResponseBody::File(FileRegion { file, offset, len }) => {
            let available = file.metadata()?.len().saturating_sub(offset);
            Payload::File {
                file,
                offset,
                len: len.map_or(available, |len| len.min(available)),
            }
        }
    };
    Ok(Materialized {
        status,
        headers,
        trailers,
        payload,
    })
}

/// Materialize a buffer-bodied page. File bodies are dropped.
pub(crate) fn fixed_page(response: Response) -> Materialized {
    let (status, headers, trailers, body) = response.into_parts();
    let bytes = match body {
        ResponseBody::Buffer(bytes) => bytes,
        ResponseBody::File(_) => Vec::new(),
    };
    Materialized {
        status,
        headers,
        trailers,
        payload: Payload::Buffer(bytes),
    }
}
