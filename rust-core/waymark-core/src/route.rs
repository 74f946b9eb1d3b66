//! # Route Definitions
//!
//! The immutable output of a route table build. Each definition pairs a
//! resolved absolute path and verb with the compiled dispatch function of one
//! controller method.
//!
//! Paths are written with `:name` placeholders and an optional trailing
//! `*name` catch-all, as in `/orders/:id` or `/files/*rest`.

use crate::dispatch::{DispatchFn, HandlerFuture};
use crate::metadata::ParamDeclaration;
use crate::registry::ControllerInstance;
use crate::request::Request;
use crate::types::Method;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Trim leading and trailing slashes and collapse empty segments
///
/// Returns `""` when nothing is left, otherwise `/` followed by the
/// remaining segments joined by `/`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        String::new()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Join a controller base path and a route path into an absolute path
///
/// The result always starts with `/` and never contains `//`.
#[must_use]
pub fn resolve_path(base: &str, route: &str) -> String {
    let joined = normalize_path(base) + &normalize_path(route);
    if joined.is_empty() {
        "/".to_string()
    } else {
        joined
    }
}

/// Convert `:name` / `*name` placeholders to matchit's `{name}` / `{*name}`
///
/// Literal braces are escaped so they match themselves.
#[must_use]
pub fn match_pattern(path: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{name}}}")
            } else {
                segment.replace('{', "{{").replace('}', "}}")
            }
        })
        .collect();

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// One entry of the route table
#[derive(Clone)]
pub struct RouteDefinition {
    path: String,
    method: Method,
    method_name: String,
    controller_name: &'static str,
    params: Vec<ParamDeclaration>,
    instance: ControllerInstance,
    dispatch: DispatchFn,
}

impl RouteDefinition {
    pub(crate) fn new(
        path: String,
        method: Method,
        method_name: String,
        controller_name: &'static str,
        params: Vec<ParamDeclaration>,
        instance: ControllerInstance,
        dispatch: DispatchFn,
    ) -> Self {
        Self {
            path,
            method,
            method_name,
            controller_name,
            params,
            instance,
            dispatch,
        }
    }

    /// Resolved absolute path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// HTTP verb
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Name of the controller method
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Short type name of the controller
    #[must_use]
    pub const fn controller_name(&self) -> &'static str {
        self.controller_name
    }

    /// Parameter declarations, in the order they were registered
    #[must_use]
    pub fn params(&self) -> &[ParamDeclaration] {
        &self.params
    }

    /// The controller singleton this route dispatches to
    #[must_use]
    pub fn instance(&self) -> &ControllerInstance {
        &self.instance
    }

    /// Path in matchit syntax
    #[must_use]
    pub fn match_pattern(&self) -> String {
        match_pattern(&self.path)
    }

    /// Run the controller method for `request`
    ///
    /// Hydration, validation and controller failures come back unchanged.
    pub fn dispatch(&self, request: Request) -> HandlerFuture {
        (self.dispatch)(request)
    }

    /// Serializable listing row
    #[must_use]
    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            method: self.method,
            path: self.path.clone(),
            handler: format!("{}.{}", self.controller_name, self.method_name),
        }
    }
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("controller", &self.controller_name)
            .field("handler", &self.method_name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {}.{}",
            self.method, self.path, self.controller_name, self.method_name
        )
    }
}

/// Method, path and handler of one route, for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSummary {
    /// HTTP verb
    pub method: Method,
    /// Resolved path
    pub path: String,
    /// `Controller.method`
    pub handler: String,
}

/// Listing rows for a whole route table, in table order
#[must_use]
pub fn route_summaries(routes: &[RouteDefinition]) -> Vec<RouteSummary> {
    routes.iter().map(RouteDefinition::summary).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerResult;
    use crate::dispatch::{compile_dispatch, Arguments, BoundMethod};
    use crate::error::BoxError;

    fn route(method: Method, path: &str, handler: &str) -> RouteDefinition {
        let bound: BoundMethod = Arc::new(|_args: Arguments| -> HandlerFuture {
            Box::pin(async { Ok::<_, BoxError>(ControllerResult::ok("hit")) })
        });
        RouteDefinition::new(
            path.to_string(),
            method,
            handler.to_string(),
            "OrdersController",
            vec![ParamDeclaration::params(0)],
            Arc::new(()),
            compile_dispatch("OrdersController", handler, bound, vec![ParamDeclaration::params(0)]),
        )
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path("orders"), "/orders");
        assert_eq!(normalize_path("/orders/"), "/orders");
        assert_eq!(normalize_path("//orders//:id//"), "/orders/:id");
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(resolve_path("/orders", "/:id"), "/orders/:id");
        assert_eq!(resolve_path("orders/", ":id/"), "/orders/:id");
        assert_eq!(resolve_path("/orders", ""), "/orders");
        assert_eq!(resolve_path("", "health"), "/health");
        assert_eq!(resolve_path("/", "/"), "/");
        assert_eq!(resolve_path("", ""), "/");
    }

    #[test]
    fn test_resolved_paths_never_double_slash() {
        for (base, path) in [("/a/", "/b"), ("a//", "//b/"), ("/", "x"), ("//", "")] {
            let resolved = resolve_path(base, path);
            assert!(resolved.starts_with('/'));
            assert!(!resolved.contains("//"), "{resolved}");
        }
    }

    #[test]
    fn test_match_pattern() {
        assert_eq!(match_pattern("/"), "/");
        assert_eq!(match_pattern("/orders"), "/orders");
        assert_eq!(match_pattern("/orders/:id"), "/orders/{id}");
        assert_eq!(
            match_pattern("/users/:user_id/posts/:post_id"),
            "/users/{user_id}/posts/{post_id}"
        );
        assert_eq!(match_pattern("/files/*rest"), "/files/{*rest}");
        assert_eq!(match_pattern("/raw/{x}"), "/raw/{{x}}");
    }

    #[test]
    fn test_display_and_summary() {
        let def = route(Method::Get, "/orders/:id", "show");
        assert_eq!(def.to_string(), "GET /orders/:id -> OrdersController.show");

        let summaries = route_summaries(&[def, route(Method::Delete, "/orders/:id", "remove")]);
        assert_eq!(summaries[0].handler, "OrdersController.show");
        assert_eq!(summaries[1].method, Method::Delete);
        assert_eq!(
            serde_json::to_value(&summaries[1]).unwrap(),
            serde_json::json!({
                "method": "delete",
                "path": "/orders/:id",
                "handler": "OrdersController.remove"
            })
        );
    }

    #[test]
    fn test_dispatch_runs_compiled_function() {
        let def = route(Method::Get, "/orders/:id", "show");
        let request = Request::builder("GET", "/orders/1").build();
        let result = tokio_test::block_on(def.dispatch(request)).unwrap();
        assert_eq!(result.data, Some(serde_json::json!("hit")));
    }
}
