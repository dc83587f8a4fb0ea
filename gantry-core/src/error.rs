// Error types for the Gantry framework

use crate::HttpStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Container
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Circular dependency detected: {0}")]
    ResolutionCycle(String),

    #[error("Cannot autowire constructor argument: {0}")]
    UnsatisfiableArgument(String),

    #[error("Binding already registered: {0}")]
    DuplicateBinding(String),

    // Router
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Method not allowed: {method} {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        /// Methods the matched path does accept; the HTTP boundary surfaces
        /// these in an `Allow` header.
        allowed: Vec<String>,
    },

    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidRoutePattern { pattern: String, reason: String },

    // Request processing
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) => HttpStatus::NotFound.code(),
            Error::MethodNotAllowed { .. } => HttpStatus::MethodNotAllowed.code(),
            Error::Unauthorized(_) => HttpStatus::Unauthorized.code(),
            Error::Forbidden(_) => HttpStatus::Forbidden.code(),
            Error::BadRequest(_) => HttpStatus::BadRequest.code(),
            Error::Deserialization(_) => HttpStatus::BadRequest.code(),

            // Container failures, serialization and everything else are the
            // application's fault, not the request's
            _ => HttpStatus::InternalServerError.code(),
        }
    }

    /// Get the HttpStatus enum for this error
    pub fn http_status(&self) -> HttpStatus {
        HttpStatus::from_code(self.status_code()).unwrap_or(HttpStatus::InternalServerError)
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.http_status().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.http_status().is_server_error()
    }
}

impl From<gantry_session::SessionError> for Error {
    fn from(err: gantry_session::SessionError) -> Self {
        Error::Session(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_error_status_codes() {
        assert_eq!(Error::RouteNotFound("GET /x".into()).status_code(), 404);
        let err = Error::MethodNotAllowed {
            method: "GET".into(),
            path: "/register".into(),
            allowed: vec!["POST".into()],
        };
        assert_eq!(err.status_code(), 405);
    }

    #[test]
    fn test_container_errors_are_server_errors() {
        assert!(Error::ServiceNotFound("X".into()).is_server_error());
        assert!(Error::ResolutionCycle("A -> B -> A".into()).is_server_error());
        assert!(Error::UnsatisfiableArgument("String".into()).is_server_error());
    }

    #[test]
    fn test_auth_error_is_client_error() {
        let err = Error::Unauthorized("no session".into());
        assert_eq!(err.status_code(), 401);
        assert!(err.is_client_error());
    }
}
