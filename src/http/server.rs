//! Hyper transport binding.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener, filtered by the accept policy
//! - Serve HTTP/1.1 on each connection with hyper
//! - Translate every request into dispatcher events: one for the headers, one
//!   per body frame, one empty event once the body has ended
//! - Run handler-invoking events on the blocking pool
//! - Stream the materialized response back, file regions included
//! - Drain in-flight connections on shutdown; uploads still streaming are cut
//!   with a 503
//!
//! # Design Decisions
//! - Request metadata is snapshotted once per request; the dispatcher only
//!   ever sees the owned snapshot through `TransportConnection`
//! - Body size and per-frame timeouts are enforced here, before the
//!   dispatcher sees the bytes
//! - A failed handler becomes a 500 page; the connection stays usable

use base64::Engine;
use futures_util::StreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Bytes, Frame, Incoming};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use std::convert::Infallible;
use std::io::SeekFrom;
use std::net::{IpAddr, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::config::ServerConfig;
use crate::dispatch::dispatcher::fixed_page;
use crate::dispatch::{DispatchError, Dispatcher, ERROR_TARGET};
use crate::http::request::Credentials;
use crate::http::response::Response;
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionContext, ConnectionTracker, Termination};
use crate::net::listener::{Listener, ListenerError};
use crate::net::policy::{AcceptPolicy, AllowAll, DenyList};
use crate::net::transport::{Materialized, Outcome, Payload, RequestEvent, TransportConnection};

/// Response body handed to hyper.
pub type WireBody = UnsyncBoxBody<Bytes, std::io::Error>;

const FILE_CHUNK: usize = 64 * 1024;

/// HTTP server driving a shared [`Dispatcher`].
pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
    policy: Arc<dyn AcceptPolicy>,
    tracker: ConnectionTracker,
    max_body_size: usize,
    request_timeout: Duration,
    shutdown_grace: Duration,
}

/// Per-server state shared by every connection task.
struct Serve {
    dispatcher: Arc<Dispatcher>,
    max_body_size: usize,
    request_timeout: Duration,
    shutdown: Shutdown,
}

impl HttpServer {
    pub fn new(dispatcher: Arc<Dispatcher>, config: &ServerConfig) -> Self {
        let deny = deny_list(&config.listener.deny);
        let policy: Arc<dyn AcceptPolicy> = if deny.is_empty() {
            Arc::new(AllowAll)
        } else {
            Arc::new(deny)
        };

        Self {
            dispatcher,
            policy,
            tracker: ConnectionTracker::new(),
            max_body_size: config.limits.max_body_size,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            shutdown_grace: Duration::from_secs(config.timeouts.shutdown_secs),
        }
    }

    /// Replace the accept policy derived from the config.
    pub fn with_policy(mut self, policy: impl AcceptPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept and serve until `shutdown` fires, then drain.
    pub async fn run(self, listener: Listener, shutdown: Shutdown) -> Result<(), ListenerError> {
        let mut stop = shutdown.subscribe();
        let serve = Arc::new(Serve {
            dispatcher: Arc::clone(&self.dispatcher),
            max_body_size: self.max_body_size,
            request_timeout: self.request_timeout,
            shutdown: shutdown.clone(),
        });

        loop {
            let (stream, peer, permit) = tokio::select! {
                _ = stop.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            if !self.policy.accept(&peer) {
                tracing::debug!(peer_addr = %peer, "Connection refused by policy");
                continue;
            }

            let guard = self.tracker.track();
            let serve = Arc::clone(&serve);
            let mut conn_stop = shutdown.subscribe();

            tokio::spawn(async move {
                let _permit = permit;
                let connection_id = guard.id();

                let service = service_fn(move |req| {
                    let serve = Arc::clone(&serve);
                    async move { Ok::<_, Infallible>(serve.request(req, peer).await) }
                });
                let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    _ = conn_stop.recv() => {
                        conn.as_mut().graceful_shutdown();
                        conn.as_mut().await
                    }
                };
                if let Err(e) = result {
                    tracing::debug!(connection_id = %connection_id, peer_addr = %peer, error = %e, "Connection ended with error");
                }
                drop(guard);
            });
        }

        tracing::info!(
            active = self.tracker.active_count(),
            "Listener closed, draining connections"
        );
        if tokio::time::timeout(self.shutdown_grace, self.tracker.drained())
            .await
            .is_err()
        {
            tracing::warn!(
                active = self.tracker.active_count(),
                "Shutdown grace period elapsed with connections still open"
            );
        }
        Ok(())
    }
}

/// Parse the configured deny entries, skipping any that are not IP addresses.
fn deny_list(entries: &[String]) -> DenyList {
    DenyList::new(entries.iter().filter_map(|entry| match entry.parse::<IpAddr>() {
        Ok(ip) => Some(ip),
        Err(e) => {
            tracing::warn!(entry = %entry, error = %e, "Ignoring unparsable deny entry");
            None
        }
    }))
}

/// Everything one request cycle owns. Moved onto the blocking pool and back
/// whenever an event may run a handler.
struct Cycle {
    ctx: ConnectionContext,
    conn: HyperConnection,
    method: String,
    path: String,
    version: &'static str,
}

impl Cycle {
    fn step(&mut self, dispatcher: &Dispatcher, upload: &[u8]) -> Result<Outcome, DispatchError> {
        let mut remaining = upload.len();
        dispatcher.handle(
            &mut self.ctx,
            &self.conn,
            RequestEvent {
                method: &self.method,
                url: &self.path,
                version: self.version,
                upload,
                remaining: &mut remaining,
            },
        )
    }
}

impl Serve {
    async fn request(
        self: Arc<Self>,
        req: hyper::Request<Incoming>,
        peer: SocketAddr,
    ) -> hyper::Response<WireBody> {
        let (parts, mut body) = req.into_parts();
        let uri = parts
            .uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str())
            .to_string();

        let cycle = Cycle {
            ctx: self.dispatcher.begin(&uri),
            conn: HyperConnection::from_parts(&parts, peer),
            method: parts.method.as_str().to_string(),
            path: parts.uri.path().to_string(),
            version: version_str(parts.version),
        };

        let (mut cycle, outcome) = match self.step_blocking(cycle).await {
            Some(stepped) => stepped,
            None => return into_hyper(fixed_page(Response::internal_error())).await,
        };
        match outcome {
            Ok(Outcome::Continue) => {}
            other => return self.finish(cycle, other).await,
        }

        let mut stop = self.shutdown.subscribe();
        let mut received = 0usize;
        loop {
            let next = tokio::select! {
                next = tokio::time::timeout(self.request_timeout, body.frame()) => next,
                _ = stop.recv() => {
                    return self.abort(cycle, Termination::Shutdown, Response::service_unavailable()).await;
                }
            };
            let frame = match next {
                Err(_) => return self.abort(cycle, Termination::TimedOut, Response::request_timeout()).await,
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    tracing::debug!(connection_id = %cycle.ctx.id(), error = %e, "Body read failed");
                    return self.abort(cycle, Termination::ClientAbort, Response::bad_request()).await;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            let data = match frame.into_data() {
                Ok(data) => data,
                Err(frame) => {
                    if let Ok(trailers) = frame.into_trailers() {
                        cycle.conn.trailers = header_pairs(&trailers);
                    }
                    continue;
                }
            };
            if data.is_empty() {
                continue;
            }

            received += data.len();
            if received > self.max_body_size {
                tracing::debug!(
                    connection_id = %cycle.ctx.id(),
                    limit = self.max_body_size,
                    "Request body too large"
                );
                return self.abort(cycle, Termination::WithError, Response::payload_too_large()).await;
            }

            match cycle.step(&self.dispatcher, &data) {
                Ok(Outcome::Continue) => {}
                other => return self.finish(cycle, other).await,
            }
        }

        match self.step_blocking(cycle).await {
            Some((cycle, outcome)) => self.finish(cycle, outcome).await,
            None => into_hyper(fixed_page(Response::internal_error())).await,
        }
    }

    /// Deliver an empty event on the blocking pool. A panicking handler ends
    /// the cycle with an error and yields `None`.
    async fn step_blocking(&self, mut cycle: Cycle) -> Option<(Cycle, Result<Outcome, DispatchError>)> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let joined = tokio::task::spawn_blocking(move || {
            let stepped = panic::catch_unwind(AssertUnwindSafe(|| cycle.step(&dispatcher, &[])));
            (cycle, stepped)
        })
        .await;

        match joined {
            Ok((cycle, Ok(outcome))) => Some((cycle, outcome)),
            Ok((cycle, Err(_))) => {
                tracing::error!(
                    target: ERROR_TARGET,
                    connection_id = %cycle.ctx.id(),
                    uri = %cycle.ctx.uri(),
                    "Handler panicked"
                );
                self.dispatcher.terminate(cycle.ctx, Termination::WithError);
                None
            }
            Err(e) => {
                tracing::error!(target: ERROR_TARGET, error = %e, "Handler task failed");
                None
            }
        }
    }

    async fn finish(
        &self,
        cycle: Cycle,
        outcome: Result<Outcome, DispatchError>,
    ) -> hyper::Response<WireBody> {
        match outcome {
            Ok(Outcome::Respond(materialized)) => {
                self.dispatcher.terminate(cycle.ctx, Termination::Completed);
                into_hyper(materialized).await
            }
            Ok(Outcome::Continue) => {
                tracing::error!(
                    target: ERROR_TARGET,
                    connection_id = %cycle.ctx.id(),
                    "Request left unanswered after body end"
                );
                self.abort(cycle, Termination::WithError, Response::internal_error()).await
            }
            Err(e) => {
                tracing::error!(
                    target: ERROR_TARGET,
                    connection_id = %cycle.ctx.id(),
                    uri = %cycle.ctx.uri(),
                    error = %e,
                    "Request failed"
                );
                self.abort(cycle, Termination::WithError, Response::internal_error()).await
            }
        }
    }

    async fn abort(
        &self,
        cycle: Cycle,
        termination: Termination,
        page: Response,
    ) -> hyper::Response<WireBody> {
        self.dispatcher.terminate(cycle.ctx, termination);
        into_hyper(fixed_page(page)).await
    }
}

/// Owned snapshot of one request's metadata.
#[derive(Debug, Default)]
struct HyperConnection {
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    query: Vec<(String, String)>,
    trailers: Vec<(String, String)>,
    credentials: Option<Credentials>,
    peer: Option<SocketAddr>,
}

impl HyperConnection {
    fn from_parts(parts: &hyper::http::request::Parts, peer: SocketAddr) -> Self {
        Self {
            headers: header_pairs(&parts.headers),
            cookies: parts
                .headers
                .get_all(header::COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(parse_cookies)
                .collect(),
            query: parts.uri.query().map(parse_query).unwrap_or_default(),
            trailers: Vec::new(),
            credentials: parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_basic_auth),
            peer: Some(peer),
        }
    }
}

impl TransportConnection for HyperConnection {
    fn visit_headers(&self, visit: &mut dyn FnMut(&str, &str)) {
        self.headers.iter().for_each(|(k, v)| visit(k, v));
    }

    fn visit_cookies(&self, visit: &mut dyn FnMut(&str, &str)) {
        self.cookies.iter().for_each(|(k, v)| visit(k, v));
    }

    fn visit_trailers(&self, visit: &mut dyn FnMut(&str, &str)) {
        self.trailers.iter().for_each(|(k, v)| visit(k, v));
    }

    fn visit_query_args(&self, visit: &mut dyn FnMut(&str, &str)) {
        self.query.iter().for_each(|(k, v)| visit(k, v));
    }

    fn basic_auth(&self) -> Option<Credentials> {
        self.credentials.clone()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn parse_cookies(header: &str) -> impl Iterator<Item = (String, String)> + '_ {
    header.split(';').filter_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        Some((name.to_string(), value.trim_matches('"').to_string()))
    })
}

/// Split a query string into pairs. Keys are decoded, values are left for
/// the dispatcher's unescaper.
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (
                percent_decode_str(key).decode_utf8_lossy().into_owned(),
                value.to_string(),
            )
        })
        .collect()
}

fn parse_basic_auth(value: &str) -> Option<Credentials> {
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some(Credentials {
        user: user.to_string(),
        password: password.to_string(),
    })
}

fn version_str(version: hyper::Version) -> &'static str {
    match version {
        hyper::Version::HTTP_09 => "HTTP/0.9",
        hyper::Version::HTTP_10 => "HTTP/1.0",
        hyper::Version::HTTP_2 => "HTTP/2.0",
        hyper::Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

fn trailer_map(trailers: &[(String, String)]) -> Option<HeaderMap> {
    if trailers.is_empty() {
        return None;
    }
    let mut map = HeaderMap::new();
    for (name, value) in trailers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => tracing::warn!(trailer = %name, "Dropping invalid trailer"),
        }
    }
    Some(map)
}

async fn into_hyper(materialized: Materialized) -> hyper::Response<WireBody> {
    let Materialized {
        status,
        headers,
        trailers,
        payload,
    } = materialized;

    let mut builder = hyper::Response::builder().status(status);
    for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let trailers = trailer_map(&trailers);

    let body = match payload {
        Payload::Buffer(bytes) => Ok(buffer_body(Bytes::from(bytes), trailers)),
        Payload::File { file, offset, len } => {
            if trailers.is_none() {
                builder = builder.header(header::CONTENT_LENGTH, len);
            }
            file_body(file, offset, len, trailers).await
        }
    };

    let built = body
        .map_err(|e| e.to_string())
        .and_then(|body| builder.body(body).map_err(|e| e.to_string()));
    match built {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(target: ERROR_TARGET, %error, "Failed to build response");
            let mut response = hyper::Response::new(buffer_body(Bytes::new(), None));
            *response.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn buffer_body(bytes: Bytes, trailers: Option<HeaderMap>) -> WireBody {
    match trailers {
        None => Full::new(bytes).map_err(|never| match never {}).boxed_unsync(),
        Some(trailers) => {
            let frames = [Frame::data(bytes), Frame::trailers(trailers)]
                .into_iter()
                .map(Ok::<_, std::io::Error>);
            StreamBody::new(futures_util::stream::iter(frames)).boxed_unsync()
        }
    }
}

async fn file_body(
    file: std::fs::File,
    offset: u64,
    len: u64,
    trailers: Option<HeaderMap>,
) -> std::io::Result<WireBody> {
    let mut file = tokio::fs::File::from_std(file);
    file.seek(SeekFrom::Start(offset)).await?;

    let data = futures_util::stream::unfold(Some(file.take(len)), |reader| async move {
        let mut reader = reader?;
        let mut buf = vec![0u8; FILE_CHUNK];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Frame::data(Bytes::from(buf))), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    });
    let tail = futures_util::stream::iter(trailers.map(|t| Ok(Frame::trailers(t))));

    Ok(StreamBody::new(data.chain(tail)).boxed_unsync())
}
