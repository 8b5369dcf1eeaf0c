// Error types for the Girder framework

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Route not found: {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Target [{0}] is not instantiable")]
    NotInstantiable(String),

    #[error("Unresolvable dependency resolving [{parameter}] in {target}: {reason}")]
    UnresolvableDependency {
        target: String,
        parameter: String,
        reason: String,
    },

    #[error("Target [{0}] does not exist")]
    TargetNotFound(String),

    #[error("Invalid route action: {0}")]
    InvalidAction(String),

    #[error("Circular alias detected: {0}")]
    CircularAlias(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Type mismatch for [{key}]: expected {expected}")]
    TypeMismatch { key: String, expected: String },

    #[error("Route [{0}] not defined")]
    RouteNotDefined(String),

    #[error("URL generation failed: {0}")]
    UrlGeneration(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code an exception handler should render for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound { .. } => 404,
            Error::Deserialization(_) => 400,
            Error::ServiceUnavailable(_) => 503,
            _ => 500,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// True for the two container failures that a parameter default may absorb
    pub(crate) fn is_missing_target(&self) -> bool {
        matches!(self, Error::NotInstantiable(_) | Error::TargetNotFound(_))
    }
}
