//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (before serving):
//!     register(template, handler, family)
//!     → endpoint.rs (compile template, classify segments)
//!     → table.rs (index static paths, keep registration order)
//!
//! Incoming request path (percent-decoded by the transport boundary):
//!     → path.rs (standardize, split into segments)
//!     → table.rs (static fast path, then specificity scan)
//!     → Return: Resolution { endpoint, handler, params } or NoMatch
//! ```
//!
//! # Design Decisions
//! - Endpoints compiled at registration, immutable at runtime
//! - No regex: segments are literals or named placeholders
//! - Deterministic: same table and path always give the same resolution
//! - Most literal segments wins

pub mod endpoint;
pub mod path;
pub mod table;

pub use endpoint::{ConfigurationError, Endpoint, Segment};
pub use table::{EndpointTable, MatchKind, NoMatch, Resolution};
