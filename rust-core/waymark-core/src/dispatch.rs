//! # Dispatch Pipeline
//!
//! Compiles, once per route, the function that turns a [`Request`] into a
//! controller invocation:
//!
//! 1. every parameter declaration selects its raw value by kind
//! 2. data kinds naming a DTO are hydrated and validated
//! 3. values land at their declared index in a pre-sized argument vector
//! 4. the bound controller method runs exactly once with those arguments
//!
//! Failures from step 2 or step 4 are returned to the caller untouched.
//! Nothing is retried and nothing is caught.

use crate::controller::ControllerResult;
use crate::dto::Dto;
use crate::error::{BoxError, Error};
use crate::metadata::ParamDeclaration;
use crate::request::Request;
use crate::types::ParamKind;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, Instrument};

/// Boxed, sendable future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Future returned by a controller method invocation
pub type HandlerFuture = BoxFuture<'static, Result<ControllerResult, BoxError>>;

/// A controller method bound to its singleton instance
pub type BoundMethod = Arc<dyn Fn(Arguments) -> HandlerFuture + Send + Sync>;

/// Compiled per-route dispatch function
pub type DispatchFn = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync>;

/// One injected argument
pub enum Argument {
    /// Raw data: body, path params, query, context, or `Null`
    Value(Value),
    /// The request itself
    Request(Arc<Request>),
    /// A hydrated and validated DTO
    Dto(Box<dyn Any + Send>),
}

impl Argument {
    /// Argument injected for positions nobody declared, or unknown kinds
    #[must_use]
    pub const fn null() -> Self {
        Self::Value(Value::Null)
    }

    /// Check if this is the `Null` value
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Request(r) => f.debug_tuple("Request").field(&r.path()).finish(),
            Self::Dto(_) => f.write_str("Dto(..)"),
        }
    }
}

/// Positional arguments for one controller invocation
#[derive(Debug)]
pub struct Arguments {
    slots: Vec<Option<Argument>>,
}

impl Arguments {
    /// Arguments with `len` positions, all `Null`
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| Some(Argument::null())).collect(),
        }
    }

    /// Build directly from argument values
    #[must_use]
    pub fn from_vec(arguments: Vec<Argument>) -> Self {
        Self {
            slots: arguments.into_iter().map(Some).collect(),
        }
    }

    /// Number of positional arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the method takes no arguments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Borrow the argument at `index`, if present and not yet taken
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Take the argument at `index` as `T`
    ///
    /// # Errors
    ///
    /// Returns `Error::ArgumentMismatch` if the slot is missing, already
    /// taken, or does not convert into `T`.
    pub fn take<T: FromArgument>(&mut self, index: usize) -> Result<T, Error> {
        let argument = self.take_raw(index, std::any::type_name::<T>())?;
        T::from_argument(argument).ok_or_else(|| mismatch::<T>(index))
    }

    /// Take the hydrated DTO at `index`
    ///
    /// # Errors
    ///
    /// Returns `Error::ArgumentMismatch` if the slot does not hold a `T`.
    pub fn take_dto<T: Dto>(&mut self, index: usize) -> Result<T, Error> {
        match self.take_raw(index, std::any::type_name::<T>())? {
            Argument::Dto(boxed) => boxed
                .downcast::<T>()
                .map(|dto| *dto)
                .map_err(|_| mismatch::<T>(index)),
            _ => Err(mismatch::<T>(index)),
        }
    }

    fn set(&mut self, index: usize, argument: Argument) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(argument);
        }
    }

    fn take_raw(&mut self, index: usize, expected: &'static str) -> Result<Argument, Error> {
        self.slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(Error::ArgumentMismatch { index, expected })
    }
}

fn mismatch<T>(index: usize) -> Error {
    Error::ArgumentMismatch {
        index,
        expected: std::any::type_name::<T>(),
    }
}

/// Conversion from an injected argument into a method parameter type
pub trait FromArgument: Sized {
    /// Convert, or `None` if the argument has another shape
    fn from_argument(argument: Argument) -> Option<Self>;
}

impl FromArgument for Argument {
    fn from_argument(argument: Argument) -> Option<Self> {
        Some(argument)
    }
}

impl FromArgument for Value {
    fn from_argument(argument: Argument) -> Option<Self> {
        match argument {
            Argument::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl FromArgument for Option<Value> {
    fn from_argument(argument: Argument) -> Option<Self> {
        match argument {
            Argument::Value(Value::Null) => Some(None),
            Argument::Value(value) => Some(Some(value)),
            _ => None,
        }
    }
}

impl FromArgument for Map<String, Value> {
    fn from_argument(argument: Argument) -> Option<Self> {
        match argument {
            Argument::Value(Value::Object(map)) => Some(map),
            Argument::Value(Value::Null) => Some(Self::new()),
            _ => None,
        }
    }
}

impl FromArgument for HashMap<String, String> {
    fn from_argument(argument: Argument) -> Option<Self> {
        Map::<String, Value>::from_argument(argument)?
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect()
    }
}

impl FromArgument for String {
    fn from_argument(argument: Argument) -> Option<Self> {
        match argument {
            Argument::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

impl FromArgument for Arc<Request> {
    fn from_argument(argument: Argument) -> Option<Self> {
        match argument {
            Argument::Request(request) => Some(request),
            _ => None,
        }
    }
}

impl FromArgument for Request {
    fn from_argument(argument: Argument) -> Option<Self> {
        Arc::<Request>::from_argument(argument)
            .map(|request| Arc::try_unwrap(request).unwrap_or_else(|shared| (*shared).clone()))
    }
}

/// Raw value for one declaration
fn raw_argument(request: &Arc<Request>, kind: ParamKind) -> Argument {
    match kind {
        ParamKind::Body => Argument::Value(request.body().clone()),
        ParamKind::Params => Argument::Value(Value::Object(request.params().clone())),
        ParamKind::Query => Argument::Value(Value::Object(request.query().clone())),
        ParamKind::Request => Argument::Request(Arc::clone(request)),
        ParamKind::RequestContext => Argument::Value(Value::Object(request.context().clone())),
        ParamKind::Unknown => Argument::null(),
    }
}

/// Build the argument vector for `request`
///
/// # Errors
///
/// Returns the first hydration or validation failure, in index order.
pub fn build_arguments(
    request: &Arc<Request>,
    params: &[ParamDeclaration],
) -> Result<Arguments, BoxError> {
    let len = params.iter().map(|p| p.index + 1).max().unwrap_or(0);
    let mut ordered: Vec<&ParamDeclaration> = params.iter().collect();
    ordered.sort_by_key(|p| p.index);

    let mut arguments = Arguments::with_len(len);
    for param in ordered {
        let raw = raw_argument(request, param.kind);
        let argument = match (param.effective_dto(), raw) {
            (Some(dto), Argument::Value(value)) => Argument::Dto(dto.instantiate(value)?),
            (_, raw) => raw,
        };
        arguments.set(param.index, argument);
    }
    Ok(arguments)
}

/// Compile the dispatch function for one route
///
/// The returned function can be called concurrently; each call builds its
/// own arguments and shares only the bound controller.
pub fn compile_dispatch(
    controller_name: &'static str,
    method_name: &str,
    method: BoundMethod,
    params: Vec<ParamDeclaration>,
) -> DispatchFn {
    let method_name: Arc<str> = Arc::from(method_name);
    let params: Arc<[ParamDeclaration]> = Arc::from(params);

    Arc::new(move |request: Request| -> HandlerFuture {
        let method = Arc::clone(&method);
        let params = Arc::clone(&params);
        let span = tracing::debug_span!(
            "dispatch",
            controller = controller_name,
            handler = %method_name,
            path = %request.path(),
            http_method = %request.method(),
        );
        Box::pin(
            async move {
                let request = Arc::new(request);
                debug!(params = params.len(), "invoking route handler");
                let arguments = build_arguments(&request, &params)?;
                debug!(arguments = arguments.len(), "invoking controller method");
                let result = method(arguments).await;
                debug!(ok = result.is_ok(), "controller returned");
                result
            }
            .instrument(span),
        )
    })
}
