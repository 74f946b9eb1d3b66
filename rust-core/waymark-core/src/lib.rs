//! # Waymark Core
//!
//! Declarative HTTP routing for controller types.
//!
//! Controllers declare their routes and parameters once, at registration.
//! A route table builder turns those declarations into immutable route
//! definitions, each carrying a compiled dispatch function that extracts
//! request data, hydrates and validates DTOs and invokes the controller
//! method on a shared singleton.
//!
//! ## Modules
//!
//! - `metadata` - Declaration store keyed by controller identity
//! - `controller` - Controller trait, typed declaration API, results
//! - `registry` - Controller singletons
//! - `builder` - Route table construction
//! - `dispatch` - Parameter injection and method invocation
//! - `route` - Route definitions, path normalization, listings
//! - `request` - Transport independent request snapshot
//! - `dto` - Hydratable, validatable data containers
//! - `validation` - Structured validation errors
//! - `router` - Route lookup using matchit (radix trie)
//! - `server` - HTTP server built on Hyper
//! - `json` - JSON parsing with simd-json
//! - `telemetry` - Tracing subscriber setup
//! - `types` - HTTP verbs and parameter kinds
//! - `error` - Error types and handling
//!
//! ## Example
//!
//! ```ignore
//! use waymark_core::{MetadataStore, RouteTableBuilder, Server};
//!
//! let mut store = MetadataStore::new();
//! store.register::<OrdersController>();
//! let routes = RouteTableBuilder::new(&store).build_all()?;
//! Server::new(routes)?.serve().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod builder;
pub mod controller;
pub mod dispatch;
pub mod dto;
pub mod error;
pub mod json;
pub mod metadata;
pub mod registry;
pub mod request;
pub mod route;
pub mod router;
pub mod server;
pub mod telemetry;
pub mod types;
pub mod validation;

pub use builder::RouteTableBuilder;
pub use controller::{Controller, ControllerDeclaration, ControllerResult, IntoControllerResult};
pub use dispatch::{
    compile_dispatch, Argument, Arguments, BoundMethod, DispatchFn, FromArgument, HandlerFuture,
};
pub use dto::{Dto, DtoType};
pub use error::{BoxError, Error, Result};
pub use json::{parse_json, to_json};
pub use metadata::{ControllerId, MetadataStore, ParamDeclaration, RouteDeclaration};
pub use registry::{ControllerInstance, ControllerRegistry};
pub use request::{HeaderValue, Headers, Request, RequestBuilder};
pub use route::{normalize_path, resolve_path, route_summaries, RouteDefinition, RouteSummary};
pub use router::Router;
pub use server::{ContextSetter, Server, ServerConfig};
pub use telemetry::init_tracing;
pub use types::{Method, ParamKind};
pub use validation::{FieldError, ValidationCode, ValidationErrors, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
