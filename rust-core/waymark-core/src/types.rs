//! # Declaration Vocabulary
//!
//! The closed sets used by route and parameter declarations: the HTTP verbs
//! a controller method can be bound to and the sources a method argument can
//! be injected from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// HTTP methods a route declaration can bind to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP PATCH
    Patch,
    /// HTTP DELETE
    Delete,
}

impl Method {
    /// All supported methods, in declaration order
    pub const ALL: [Self; 5] = [Self::Get, Self::Post, Self::Put, Self::Patch, Self::Delete];

    /// Upper-case wire name (e.g. `GET`)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a verb outside [`Method::ALL`] is parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported request method: {0}")]
pub struct UnsupportedMethod(pub String);

impl FromStr for Method {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnsupportedMethod(s.to_string()))
    }
}

impl TryFrom<&hyper::Method> for Method {
    type Error = UnsupportedMethod;

    fn try_from(method: &hyper::Method) -> Result<Self, Self::Error> {
        match *method {
            hyper::Method::GET => Ok(Self::Get),
            hyper::Method::POST => Ok(Self::Post),
            hyper::Method::PUT => Ok(Self::Put),
            hyper::Method::PATCH => Ok(Self::Patch),
            hyper::Method::DELETE => Ok(Self::Delete),
            ref other => Err(UnsupportedMethod(other.to_string())),
        }
    }
}

/// Where an injected argument is taken from
///
/// Names outside the known set parse to `Unknown`, which injects `Null`
/// instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// The request body
    Body,
    /// Path parameters
    Params,
    /// Query string mapping
    Query,
    /// The whole request
    Request,
    /// The request context mapping
    RequestContext,
    /// Any kind this version does not know about
    #[serde(other)]
    Unknown,
}

impl ParamKind {
    /// Kinds that carry request data and may be hydrated into a DTO
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Body | Self::Params | Self::Query)
    }

    /// Wire name of the kind
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Params => "params",
            Self::Query => "query",
            Self::Request => "request",
            Self::RequestContext => "request_context",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ParamKind {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "body" => Self::Body,
            "params" => Self::Params,
            "query" => Self::Query,
            "request" => Self::Request,
            "request_context" => Self::RequestContext,
            _ => Self::Unknown,
        }
    }
}
