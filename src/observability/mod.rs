//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher and transport produce:
//!     → logging.rs (access and error log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Access and error logs are tracing targets, not separate sinks
//! - Connection ID flows through every event of a request cycle
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingError};
