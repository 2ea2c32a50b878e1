//! Per-connection request state.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Carry request assembly state across repeated transport callbacks
//! - Track active transport connections for graceful shutdown
//!
//! # Phases
//! ```text
//! Fresh ──► HeadersBound ───────────────────────────► Answered
//!   │                                                    ▲
//!   └─────► BodyStreaming ──(0 bytes left)──► Complete ──┘
//! ```
//!
//! # Design Decisions
//! - The phase is a sum type: the request only exists in phases that have one
//! - Leaving a phase moves its data out, so a handler can run at most once
//! - Dropping the context releases the request and any body parser

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::http::form::FormParser;
use crate::http::request::Request;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Observable phase of a [`ConnectionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Fresh,
    HeadersBound,
    BodyStreaming,
    Complete,
    Answered,
}

pub(crate) enum Phase {
    Fresh,
    HeadersBound(Request),
    BodyStreaming {
        request: Request,
        parser: Option<FormParser>,
    },
    Complete(Request),
    Answered,
}

impl Phase {
    pub(crate) fn kind(&self) -> PhaseKind {
        match self {
            Phase::Fresh => PhaseKind::Fresh,
            Phase::HeadersBound(_) => PhaseKind::HeadersBound,
            Phase::BodyStreaming { .. } => PhaseKind::BodyStreaming,
            Phase::Complete(_) => PhaseKind::Complete,
            Phase::Answered => PhaseKind::Answered,
        }
    }
}

/// Why the transport ended a request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Completed,
    WithError,
    TimedOut,
    Shutdown,
    ClientAbort,
}

/// State that survives across the callbacks of one request cycle.
///
/// Created by `Dispatcher::begin`, passed by `&mut` into every
/// `Dispatcher::handle` call and consumed by `Dispatcher::terminate`.
pub struct ConnectionContext {
    id: ConnectionId,
    uri: String,
    started: Instant,
    pub(crate) phase: Phase,
}

impl ConnectionContext {
    pub(crate) fn new(uri: &str) -> Self {
        Self {
            id: ConnectionId::new(),
            uri: uri.to_string(),
            started: Instant::now(),
            phase: Phase::Fresh,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Complete URI as first seen by the transport, query string included.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn phase(&self) -> PhaseKind {
        self.phase.kind()
    }

    /// True until the first event has been handled.
    pub fn is_first_callback(&self) -> bool {
        matches!(self.phase, Phase::Fresh)
    }

    /// Bytes of body accumulated so far.
    pub fn body_len(&self) -> usize {
        match &self.phase {
            Phase::HeadersBound(request)
            | Phase::BodyStreaming { request, .. }
            | Phase::Complete(request) => request.body().len(),
            Phase::Fresh | Phase::Answered => 0,
        }
    }
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("id", &self.id)
            .field("uri", &self.uri)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Counts live transport connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        crate::observability::metrics::record_active_connections(active);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every tracked connection has closed.
    pub async fn drained(&self) {
        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }
    }
}

/// Guard that tracks a transport connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let active = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        crate::observability::metrics::record_active_connections(active);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
