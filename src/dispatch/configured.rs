//! Handlers declared in configuration.

use std::fs::File;
use std::path::PathBuf;

use crate::config::{ResponseConfig, RouteConfig};
use crate::dispatch::dispatcher::DispatcherBuilder;
use crate::dispatch::handler::{Handler, HandlerError};
use crate::http::request::Request;
use crate::http::response::{Response, CONTENT_TYPE};
use crate::routing::ConfigurationError;

/// Answers every request with the same in-memory body.
#[derive(Debug, Clone)]
pub struct StaticText {
    status: u16,
    content_type: String,
    body: String,
}

impl StaticText {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

impl Handler for StaticText {
    fn handle(&self, _request: &Request) -> Result<Response, HandlerError> {
        Ok(Response::bytes(self.status, self.body.as_bytes())
            .with_header(CONTENT_TYPE, self.content_type.as_str()))
    }
}

/// Streams a file from disk. The file is opened per request so edits show
/// up without a restart.
#[derive(Debug, Clone)]
pub struct FileServe {
    path: PathBuf,
    content_type: String,
}

impl FileServe {
    pub fn new(path: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_type: content_type.into(),
        }
    }
}

impl Handler for FileServe {
    fn handle(&self, _request: &Request) -> Result<Response, HandlerError> {
        let file = File::open(&self.path)?;
        Ok(Response::file(200, file).with_header(CONTENT_TYPE, self.content_type.as_str()))
    }
}

/// Register every configured route, in order.
pub fn register_routes(
    mut builder: DispatcherBuilder,
    routes: &[RouteConfig],
) -> Result<DispatcherBuilder, ConfigurationError> {
    for route in routes {
        builder = match &route.response {
            ResponseConfig::Text {
                status,
                content_type,
                body,
            } => builder.register(
                &route.path,
                StaticText::new(*status, content_type.as_str(), body.as_str()),
                route.family,
            )?,
            ResponseConfig::File { path, content_type } => builder.register(
                &route.path,
                FileServe::new(path.clone(), content_type.as_str()),
                route.family,
            )?,
        };
        tracing::debug!(path = %route.path, family = route.family, "Configured route registered");
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::method::Method;
    use crate::http::response::ResponseBody;
    use std::io::Write;

    #[test]
    fn test_static_text() {
        let handler = StaticText::new(201, "text/plain", "made");
        let resp = handler.handle(&Request::new(Method::Post, "/", "HTTP/1.1")).unwrap();
        assert_eq!(resp.status(), 201);
        assert_eq!(resp.headers()[0].1, "text/plain");
        assert!(matches!(resp.body(), ResponseBody::Buffer(b) if b.as_slice() == b"made"));
    }

    #[test]
    fn test_file_serve() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<h1>hi</h1>").unwrap();

        let handler = FileServe::new(file.path(), "text/html");
        let resp = handler.handle(&Request::new(Method::Get, "/", "HTTP/1.1")).unwrap();
        assert!(matches!(resp.body(), ResponseBody::File(_)));

        let missing = FileServe::new("/no/such/file", "text/html");
        assert!(missing.handle(&Request::new(Method::Get, "/", "HTTP/1.1")).is_err());
    }

    #[test]
    fn test_register_routes() {
        let routes = vec![
            RouteConfig {
                path: "/health".to_string(),
                family: false,
                response: ResponseConfig::Text {
                    status: 200,
                    content_type: "text/plain".to_string(),
                    body: "ok".to_string(),
                },
            },
            RouteConfig {
                path: "/docs".to_string(),
                family: true,
                response: ResponseConfig::File {
                    path: "/srv/docs/index.html".into(),
                    content_type: "text/html".to_string(),
                },
            },
        ];
        let dispatcher = register_routes(DispatcherBuilder::new(), &routes).unwrap().build();
        assert_eq!(dispatcher.table().len(), 2);
        assert!(dispatcher.table().resolve("/docs/a/b").is_ok());
    }
}
