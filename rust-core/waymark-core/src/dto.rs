//! # Data Transfer Objects
//!
//! A DTO is a plain serde type that the dispatch pipeline hydrates from raw
//! request data and validates before handing it to a controller method.
//!
//! Whether a parameter is DTO-backed is decided from its declaration alone:
//! a [`DtoType`] can only be built for a type implementing [`Dto`], so no
//! instance is needed to answer the question.

use crate::error::Error;
use crate::validation::ValidationResult;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::fmt;

/// Hydratable, validatable request data container
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct CreateOrder { quantity: i64 }
///
/// impl Dto for CreateOrder {
///     fn validate(&self) -> ValidationResult<()> {
///         if self.quantity > 0 {
///             Ok(())
///         } else {
///             Err(FieldError::too_small("quantity", 1).into())
///         }
///     }
/// }
/// ```
pub trait Dto: DeserializeOwned + Send + 'static {
    /// Check the hydrated value; accepts everything unless overridden
    ///
    /// # Errors
    ///
    /// Returns the field errors that make this value unacceptable.
    fn validate(&self) -> ValidationResult<()> {
        Ok(())
    }

    /// Build an instance from raw request data
    ///
    /// A `Null` raw value hydrates from an empty object, so DTOs whose
    /// fields all have serde defaults still reach `validate`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Hydration` if the value does not deserialize.
    fn hydrate(raw: Value) -> Result<Self, Error> {
        let raw = if raw.is_null() {
            Value::Object(Map::new())
        } else {
            raw
        };
        serde_json::from_value(raw).map_err(|source| Error::Hydration {
            dto: std::any::type_name::<Self>(),
            source,
        })
    }
}

type HydrateFn = fn(Value) -> Result<Box<dyn Any + Send>, crate::BoxError>;

/// Reference to a DTO type carried by a parameter declaration
#[derive(Clone, Copy)]
pub struct DtoType {
    type_id: TypeId,
    name: &'static str,
    hydrate: HydrateFn,
}

impl DtoType {
    /// Reference the DTO type `T`
    #[must_use]
    pub fn of<T: Dto>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            hydrate: hydrate_and_validate::<T>,
        }
    }

    /// Full type name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Check whether this references `T`
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Hydrate and validate, returning the instance type-erased
    ///
    /// # Errors
    ///
    /// Returns the hydration error or the `ValidationErrors` from `validate`.
    pub fn instantiate(&self, raw: Value) -> Result<Box<dyn Any + Send>, crate::BoxError> {
        (self.hydrate)(raw)
    }
}

fn hydrate_and_validate<T: Dto>(raw: Value) -> Result<Box<dyn Any + Send>, crate::BoxError> {
    let dto = T::hydrate(raw)?;
    dto.validate()?;
    Ok(Box::new(dto))
}

impl PartialEq for DtoType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for DtoType {}

impl fmt::Debug for DtoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DtoType").field(&self.name).finish()
    }
}

impl serde::Serialize for DtoType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}
