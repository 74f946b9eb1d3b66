//! # Error Handling
//!
//! Centralized error types for Waymark core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Registration failures (`UnresolvedController`, `UnboundMethod`,
//! `InvalidRoutePattern`) abort route table construction. Per-request
//! failures travel as [`BoxError`] so that whatever a DTO or a controller
//! raised reaches the caller unchanged.

use thiserror::Error;

/// Result type alias for Waymark operations
pub type Result<T> = std::result::Result<T, Error>;

/// Type-erased error produced while dispatching a single request
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Core error types for the Waymark runtime
#[derive(Error, Debug)]
pub enum Error {
    /// A controller identity has no registered factory
    #[error("Controller {controller} is not registered")]
    UnresolvedController {
        /// Type name of the missing controller
        controller: &'static str,
    },

    /// A route declaration names a method with no bound handler
    #[error("Route {controller}.{method} has no bound handler")]
    UnboundMethod {
        /// Controller type name
        controller: &'static str,
        /// Declared method name
        method: String,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Router failed to match the requested path
    #[error("No route found for {method} {path}")]
    RouteNotFound {
        /// Request method
        method: String,
        /// The path that wasn't matched
        path: String,
    },

    /// The path exists but not for the requested method
    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed {
        /// Request method
        method: String,
        /// Matched path
        path: String,
        /// Methods registered for the path
        allowed: Vec<String>,
    },

    /// Raw request data could not be turned into the declared DTO
    #[error("Failed to hydrate {dto}: {source}")]
    Hydration {
        /// DTO type name
        dto: &'static str,
        /// Deserialization failure
        #[source]
        source: serde_json::Error,
    },

    /// A controller read an argument as the wrong type
    #[error("Argument {index} is not a {expected}")]
    ArgumentMismatch {
        /// Positional index
        index: usize,
        /// Requested Rust type
        expected: &'static str,
    },

    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request body could not be parsed
    #[error("Malformed {content_type} body: {reason}")]
    MalformedBody {
        /// Declared content type
        content_type: String,
        /// Parser message
        reason: String,
    },

    /// A request could not be assembled from its parts
    #[error("Invalid request: {reason}")]
    InvalidRequest {
        /// What was wrong
        reason: String,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Declared size, when the client sent a `Content-Length`
        actual: Option<usize>,
    },
}

impl Error {
    /// Whether this error was raised while building a route table
    #[must_use]
    pub const fn is_registration(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedController { .. }
                | Self::UnboundMethod { .. }
                | Self::InvalidRoutePattern { .. }
        )
    }
}
