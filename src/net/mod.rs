//! Network and transport-boundary subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → policy.rs (accept or drop by peer address)
//!     → Hand off to the transport binding (http::server)
//!
//! Per request cycle:
//!     transport event (transport.rs: RequestEvent + TransportConnection)
//!     → connection.rs (ConnectionContext phase)
//!     → dispatcher
//!     → Outcome::Continue | Outcome::Respond(Materialized)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - The core never touches sockets; transport.rs is the whole contract
//! - One context per request cycle, owned by the transport

pub mod connection;
pub mod listener;
pub mod policy;
pub mod transport;

pub use connection::{ConnectionContext, ConnectionId, PhaseKind, Termination};
pub use policy::{AcceptPolicy, AllowAll, DenyList};
pub use transport::{Materialized, Outcome, Payload, RequestEvent, TransportConnection};
