//! Request handlers.

use crate::http::request::Request;
use crate::http::response::Response;

/// Error a handler may fail with. The dispatcher never recovers from it.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Caller-supplied logic turning a complete request into a response.
///
/// Handlers are shared across worker threads and may block.
pub trait Handler: Send + Sync {
    fn handle(&self, request: &Request) -> Result<Response, HandlerError>;

    /// Whether the call must run inside the dispatcher's exclusive section.
    fn exclusive(&self) -> bool {
        false
    }
}

/// Handler backed by a closure. Build with [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&Request) -> Result<Response, HandlerError> + Send + Sync,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&Request) -> Result<Response, HandlerError> + Send + Sync,
{
    fn handle(&self, request: &Request) -> Result<Response, HandlerError> {
        (self.f)(request)
    }
}

/// Wraps a handler that needs serialized execution, e.g. one that calls into
/// an embedded interpreter with a global lock.
pub struct Exclusive<H>(pub H);

impl<H: Handler> Handler for Exclusive<H> {
    fn handle(&self, request: &Request) -> Result<Response, HandlerError> {
        self.0.handle(request)
    }

    fn exclusive(&self) -> bool {
        true
    }
}
