//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0, addresses parse)
//! - Reject route templates the endpoint parser would refuse
//! - Check that file routes point at existing files
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a function of the config plus file existence:
//!   ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::schema::{ResponseConfig, ServerConfig};
use crate::routing::{ConfigurationError, Endpoint};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: `{value}` is not a socket address")]
    Address { field: &'static str, value: String },

    #[error("listener.deny: `{0}` is not an IP address")]
    DenyEntry(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("observability.log_level: unknown level `{0}`")]
    LogLevel(String),

    #[error("routes[{index}]: {source}")]
    Template {
        index: usize,
        source: ConfigurationError,
    },

    #[error("routes[{index}]: status {status} is outside 100..=599")]
    Status { index: usize, status: u16 },

    #[error("routes[{index}]: `{}` is not a readable file", .path.display())]
    MissingFile { index: usize, path: PathBuf },
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }
    for entry in &config.listener.deny {
        if entry.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::DenyEntry(entry.clone()));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::Zero("limits.max_body_size"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::Address {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    for (index, route) in config.routes.iter().enumerate() {
        if let Err(source) = Endpoint::parse(&route.path, route.family) {
            errors.push(ValidationError::Template { index, source });
        }
        match &route.response {
            ResponseConfig::Text { status, .. } => {
                if !(100..=599).contains(status) {
                    errors.push(ValidationError::Status {
                        index,
                        status: *status,
                    });
                }
            }
            ResponseConfig::File { path, .. } => {
                if !path.is_file() {
                    errors.push(ValidationError::MissingFile {
                        index,
                        path: path.clone(),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
