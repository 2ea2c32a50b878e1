//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! transport event (RequestEvent + TransportConnection)
//!     → dispatcher.rs (advance ConnectionContext phase)
//!     → routing::EndpointTable::resolve
//!     → handler.rs (caller logic, optionally serialized)
//!     → Outcome::Respond(Materialized) back to the transport
//!
//! Startup:
//!     config routes → configured.rs → DispatcherBuilder::register
//! ```

pub mod configured;
pub mod dispatcher;
pub mod handler;

pub use dispatcher::{
    materialize, DispatchError, Dispatcher, DispatcherBuilder, ACCESS_TARGET, ERROR_TARGET,
};
pub use handler::{handler_fn, Exclusive, Handler, HandlerError, HandlerFn};
