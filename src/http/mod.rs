//! HTTP value objects and the hyper transport binding.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper http1, metadata snapshot, body frames)
//!     → dispatcher events
//!         → method.rs (verb classification)
//!         → request.rs (accumulated request, handed to handlers)
//!         → form.rs + unescape.rs (argument decoding)
//!     → response.rs (handler result)
//!     → server.rs (buffer or file stream back to the client)
//! ```

pub mod form;
pub mod method;
pub mod request;
pub mod response;
pub mod server;
pub mod unescape;

pub use method::Method;
pub use request::{Credentials, Request};
pub use response::{Response, ResponseBody, ResponseKind};
pub use server::HttpServer;
pub use unescape::{PercentDecoder, Unescaper};
