//! # Router
//!
//! Radix-trie lookup over a built route table using `matchit`, one trie per
//! HTTP method.
//!
//! A path that exists under another method is reported as
//! `Error::MethodNotAllowed` together with the methods that would match, so
//! adapters can answer 405 with an `Allow` header instead of 404.

use crate::error::{Error, Result};
use crate::route::RouteDefinition;
use crate::types::Method;
use matchit::Router as MatchitRouter;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Matched route with extracted path parameters
#[derive(Debug)]
pub struct Match<'a> {
    /// The matched route
    pub route: &'a RouteDefinition,
    /// Path parameters, as strings
    pub params: Map<String, Value>,
}

/// Route lookup over an immutable route table
#[derive(Clone)]
pub struct Router {
    method_routes: HashMap<Method, MatchitRouter<usize>>,
    routes: Vec<RouteDefinition>,
}

impl Router {
    /// Index `routes` for lookup
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if two routes of the same method
    /// conflict or a path is malformed.
    pub fn new(routes: Vec<RouteDefinition>) -> Result<Self> {
        let mut method_routes: HashMap<Method, MatchitRouter<usize>> = HashMap::new();

        for (index, route) in routes.iter().enumerate() {
            method_routes
                .entry(route.method())
                .or_default()
                .insert(route.match_pattern(), index)
                .map_err(|e| Error::InvalidRoutePattern {
                    pattern: route.path().to_string(),
                    reason: e.to_string(),
                })?;
        }

        debug!(routes = routes.len(), "router ready");
        Ok(Self {
            method_routes,
            routes,
        })
    }

    /// The indexed route table
    #[must_use]
    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    /// Find the route for `method` and `path`
    ///
    /// # Errors
    ///
    /// Returns `Error::MethodNotAllowed` if the path is routed only under
    /// other methods, `Error::RouteNotFound` otherwise.
    pub fn match_route<'a>(&'a self, method: &str, path: &str) -> Result<Match<'a>> {
        let matched = method
            .parse::<Method>()
            .ok()
            .and_then(|m| self.method_routes.get(&m))
            .and_then(|router| router.at(path).ok());

        if let Some(matched) = matched {
            let params = matched
                .params
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect();
            return Ok(Match {
                route: &self.routes[*matched.value],
                params,
            });
        }

        let allowed = self.allowed_methods(path);
        if allowed.is_empty() {
            Err(Error::RouteNotFound {
                method: method.to_string(),
                path: path.to_string(),
            })
        } else {
            Err(Error::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
                allowed: allowed.iter().map(ToString::to_string).collect(),
            })
        }
    }

    /// Methods under which `path` is routed
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        Method::ALL
            .into_iter()
            .filter(|m| {
                self.method_routes
                    .get(m)
                    .is_some_and(|router| router.at(path).is_ok())
            })
            .collect()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}
