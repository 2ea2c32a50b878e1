//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use endpoint_dispatch::config::ServerConfig;
use endpoint_dispatch::http::Credentials;
use endpoint_dispatch::net::listener::Listener;
use endpoint_dispatch::net::{ConnectionContext, Materialized, Outcome, Payload, RequestEvent, TransportConnection};
use endpoint_dispatch::{Dispatcher, HttpServer, Shutdown};
use tokio::task::JoinHandle;

/// In-memory transport: metadata is whatever the test puts in.
#[derive(Debug, Default, Clone)]
pub struct ScriptedConnection {
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub trailers: Vec<(String, String)>,
    pub credentials: Option<Credentials>,
    pub peer: Option<SocketAddr>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self {
            peer: Some("192.0.2.10:51000".parse().unwrap()),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }
}

impl TransportConnection for ScriptedConnection {
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

/// Deliver one event, returning the outcome and what was left in `remaining`.
pub fn send(
    dispatcher: &Dispatcher,
    ctx: &mut ConnectionContext,
    conn: &ScriptedConnection,
    method: &str,
    path: &str,
    upload: &[u8],
) -> (Outcome, usize) {
    let mut remaining = upload.len();
    let outcome = dispatcher
        .handle(
            ctx,
            conn,
            RequestEvent {
                method,
                url: path,
                version: "HTTP/1.1",
                upload,
                remaining: &mut remaining,
            },
        )
        .expect("dispatch failed");
    (outcome, remaining)
}

/// Run a full cycle the way a transport would: header event, one event per
/// chunk, then the empty end-of-body event for body-carrying verbs.
pub fn exchange(
    dispatcher: &Dispatcher,
    conn: &ScriptedConnection,
    method: &str,
    path: &str,
    chunks: &[&[u8]],
) -> Materialized {
    let mut ctx = dispatcher.begin(path);
    let (outcome, _) = send(dispatcher, &mut ctx, conn, method, path, &[]);
    if let Outcome::Respond(materialized) = outcome {
        return materialized;
    }
    for chunk in chunks {
        let (outcome, remaining) = send(dispatcher, &mut ctx, conn, method, path, chunk);
        assert!(outcome.is_continue(), "answered before the body ended");
        assert_eq!(remaining, 0, "chunk not consumed");
    }
    let (outcome, _) = send(dispatcher, &mut ctx, conn, method, path, &[]);
    outcome.into_response().expect("no response after body end")
}

pub fn body_text(materialized: &Materialized) -> String {
    match &materialized.payload {
        Payload::Buffer(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Payload::File { .. } => panic!("expected a buffered body"),
    }
}

/// Serve `dispatcher` on an ephemeral port.
pub async fn start_server(
    dispatcher: Dispatcher,
    mut config: ServerConfig,
) -> (SocketAddr, Shutdown, JoinHandle<()>) {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(Arc::new(dispatcher), &config);
    let stop = shutdown.clone();
    let handle = tokio::spawn(async move {
        server.run(listener, stop).await.unwrap();
    });
    (addr, shutdown, handle)
}
