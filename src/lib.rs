//! HTTP endpoint routing and request dispatch.
//!
//! Handlers are registered against path templates (`/users/{id}`,
//! `/static/*`) in a [`Dispatcher`]. A transport feeds the dispatcher one
//! event per protocol callback; the dispatcher assembles the request across
//! those events, resolves the most specific endpoint and runs its handler
//! exactly once.

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::schema::ServerConfig;
pub use dispatch::{handler_fn, Dispatcher, DispatcherBuilder, Handler};
pub use http::{HttpServer, Request, Response};
pub use lifecycle::Shutdown;
