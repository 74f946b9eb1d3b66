//! # Controllers
//!
//! A controller groups route-handling methods behind one shared instance.
//! It describes itself through [`Controller::declare`], which records routes,
//! parameters and one bound handler per method into the
//! [`MetadataStore`]. The `#[controller]` attribute from `waymark-macros`
//! writes that function for you; implementing it by hand is equally valid.

use crate::dispatch::{Arguments, BoundMethod, HandlerFuture};
use crate::error::BoxError;
use crate::metadata::{
    ControllerId, MetadataStore, MethodBinder, ParamDeclaration, RouteDeclaration,
};
use crate::registry::ControllerInstance;
use crate::types::Method;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Uniform outcome of a controller method
///
/// Interpreting it (status line, body encoding) is the adapter's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerResult {
    /// HTTP status, if the controller chose one
    pub status: Option<u16>,
    /// Response payload
    pub data: Option<Value>,
    /// Declared content type, passed through untouched
    pub content_type: Option<String>,
}

impl ControllerResult {
    /// Result carrying `data`
    pub fn ok(data: impl Into<Value>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::default()
        }
    }

    /// Result carrying any serializable payload
    ///
    /// # Errors
    ///
    /// Returns the serialization error if `data` cannot become JSON.
    pub fn json<T: Serialize>(data: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::ok(serde_json::to_value(data)?))
    }

    /// Plain-text result
    pub fn text(text: impl Into<String>) -> Self {
        Self::ok(Value::String(text.into())).with_content_type("text/plain")
    }

    /// Result with a status and no payload
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Result with neither status nor payload
    #[must_use]
    pub fn no_content() -> Self {
        Self::default()
    }

    /// Set the status
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the content type
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Payload to send, treating `Null` as no payload
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.data.as_ref().filter(|data| !data.is_null())
    }

    /// Status an adapter should send
    ///
    /// An explicit status always wins. Otherwise a result with a payload is
    /// a 200 and a result without one is a 204.
    #[must_use]
    pub fn effective_status(&self) -> u16 {
        match (self.status, self.payload()) {
            (Some(status), _) => status,
            (None, Some(_)) => 200,
            (None, None) => 204,
        }
    }
}

/// Conversion from a controller method's return value
pub trait IntoControllerResult {
    /// Convert into the dispatch outcome
    ///
    /// # Errors
    ///
    /// Returns the controller's own failure, boxed.
    fn into_controller_result(self) -> Result<ControllerResult, BoxError>;
}

impl IntoControllerResult for ControllerResult {
    fn into_controller_result(self) -> Result<ControllerResult, BoxError> {
        Ok(self)
    }
}

impl IntoControllerResult for String {
    fn into_controller_result(self) -> Result<ControllerResult, BoxError> {
        Ok(ControllerResult::ok(self))
    }
}

impl IntoControllerResult for &'static str {
    fn into_controller_result(self) -> Result<ControllerResult, BoxError> {
        Ok(ControllerResult::ok(self))
    }
}

impl<E: Into<BoxError>> IntoControllerResult for Result<ControllerResult, E> {
    fn into_controller_result(self) -> Result<ControllerResult, BoxError> {
        self.map_err(Into::into)
    }
}

impl<E: Into<BoxError>> IntoControllerResult for Result<(), E> {
    fn into_controller_result(self) -> Result<ControllerResult, BoxError> {
        self.map(|()| ControllerResult::no_content()).map_err(Into::into)
    }
}

/// A type whose methods handle routes
pub trait Controller: Send + Sync + 'static {
    /// Build the singleton instance
    fn create() -> Self
    where
        Self: Sized;

    /// Record base path, routes, parameters and handlers
    fn declare(controller: &mut ControllerDeclaration<'_, Self>)
    where
        Self: Sized;
}

/// Typed registration API handed to [`Controller::declare`]
pub struct ControllerDeclaration<'a, C> {
    store: &'a mut MetadataStore,
    id: ControllerId,
    _controller: PhantomData<fn() -> C>,
}

impl<'a, C: Controller> ControllerDeclaration<'a, C> {
    pub(crate) fn new(store: &'a mut MetadataStore, id: ControllerId) -> Self {
        Self {
            store,
            id,
            _controller: PhantomData,
        }
    }

    /// Identity of the controller being declared
    #[must_use]
    pub const fn id(&self) -> ControllerId {
        self.id
    }

    /// Set the base path shared by every route
    pub fn base_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.store.set_base_path(self.id, path);
        self
    }

    /// Declare `method_name` as handling `method` on `path`
    pub fn route(&mut self, method: Method, method_name: &str, path: &str) -> &mut Self {
        self.store
            .add_route_declaration(self.id, RouteDeclaration::new(method, method_name, path));
        self
    }

    /// Declare a GET route
    pub fn get(&mut self, method_name: &str, path: &str) -> &mut Self {
        self.route(Method::Get, method_name, path)
    }

    /// Declare a POST route
    pub fn post(&mut self, method_name: &str, path: &str) -> &mut Self {
        self.route(Method::Post, method_name, path)
    }

    /// Declare a PUT route
    pub fn put(&mut self, method_name: &str, path: &str) -> &mut Self {
        self.route(Method::Put, method_name, path)
    }

    /// Declare a PATCH route
    pub fn patch(&mut self, method_name: &str, path: &str) -> &mut Self {
        self.route(Method::Patch, method_name, path)
    }

    /// Declare a DELETE route
    pub fn delete(&mut self, method_name: &str, path: &str) -> &mut Self {
        self.route(Method::Delete, method_name, path)
    }

    /// Declare one parameter of `method_name`
    pub fn param(&mut self, method_name: &str, declaration: ParamDeclaration) -> &mut Self {
        self.store
            .add_parameter_declaration(self.id, method_name, declaration);
        self
    }

    /// Bind the function that invokes `method_name` on the singleton
    ///
    /// The binding is resolved once when a route table is built; requests
    /// never look methods up by name.
    pub fn handler<F, Fut, R>(&mut self, method_name: &str, f: F) -> &mut Self
    where
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoControllerResult,
    {
        let f = Arc::new(f);
        let binder: MethodBinder = Arc::new(move |instance: &ControllerInstance| {
            let controller = Arc::clone(instance).downcast::<C>().ok()?;
            let f = Arc::clone(&f);
            let bound: BoundMethod = Arc::new(move |args: Arguments| -> HandlerFuture {
                let call = f(Arc::clone(&controller), args);
                Box::pin(async move { call.await.into_controller_result() })
            });
            Some(bound)
        });
        self.store.bind_method(self.id, method_name, binder);
        self
    }
}
