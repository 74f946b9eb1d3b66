//! # Metadata Store
//!
//! Append-only record of everything declared about controllers: base path,
//! route declarations in declaration order and parameter declarations per
//! method. Registration also captures the controller factory and one bound
//! handler per method so the route table builder never has to look anything
//! up by name at request time.
//!
//! The store is an ordinary value: build one at startup, register
//! controllers into it, then hand it to a
//! [`RouteTableBuilder`](crate::builder::RouteTableBuilder).

use crate::controller::{Controller, ControllerDeclaration};
use crate::dispatch::BoundMethod;
use crate::dto::{Dto, DtoType};
use crate::registry::ControllerInstance;
use crate::types::{Method, ParamKind};
use serde::Serialize;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

/// Identity of a controller type
#[derive(Clone, Copy)]
pub struct ControllerId {
    type_id: TypeId,
    name: &'static str,
}

impl ControllerId {
    /// Identity of `C`
    #[must_use]
    pub fn of<C: 'static>() -> Self {
        let full = std::any::type_name::<C>();
        Self {
            type_id: TypeId::of::<C>(),
            name: full.rsplit("::").next().unwrap_or(full),
        }
    }

    /// Short type name, used in diagnostics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ControllerId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ControllerId {}

impl Hash for ControllerId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Static pairing of a verb and relative path with a controller method
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDeclaration {
    /// Name of the controller method
    pub method_name: String,
    /// Path relative to the controller base path, may be empty
    pub path: String,
    /// HTTP verb
    pub request_method: Method,
}

impl RouteDeclaration {
    /// Declare `method_name` as handling `request_method` on `path`
    pub fn new(
        request_method: Method,
        method_name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            method_name: method_name.into(),
            path: path.into(),
            request_method,
        }
    }
}

/// Mapping of one method argument position to a request data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamDeclaration {
    /// Positional index of the argument
    pub index: usize,
    /// Source of the value
    #[serde(rename = "type")]
    pub kind: ParamKind,
    /// DTO to hydrate and validate the value into
    pub dto: Option<DtoType>,
}

impl ParamDeclaration {
    /// Raw injection of `kind` at `index`
    #[must_use]
    pub const fn new(index: usize, kind: ParamKind) -> Self {
        Self {
            index,
            kind,
            dto: None,
        }
    }

    /// Request body at `index`
    #[must_use]
    pub const fn body(index: usize) -> Self {
        Self::new(index, ParamKind::Body)
    }

    /// Path parameters at `index`
    #[must_use]
    pub const fn params(index: usize) -> Self {
        Self::new(index, ParamKind::Params)
    }

    /// Query mapping at `index`
    #[must_use]
    pub const fn query(index: usize) -> Self {
        Self::new(index, ParamKind::Query)
    }

    /// The whole request at `index`
    #[must_use]
    pub const fn request(index: usize) -> Self {
        Self::new(index, ParamKind::Request)
    }

    /// The request context at `index`
    #[must_use]
    pub const fn context(index: usize) -> Self {
        Self::new(index, ParamKind::RequestContext)
    }

    /// Hydrate the value into `T` and validate it before injection
    #[must_use]
    pub fn with_dto<T: Dto>(mut self) -> Self {
        self.dto = Some(DtoType::of::<T>());
        self
    }

    /// The DTO to apply, if the kind carries data and a DTO is named
    #[must_use]
    pub fn effective_dto(&self) -> Option<&DtoType> {
        self.dto.as_ref().filter(|_| self.kind.is_data())
    }
}

pub(crate) type Factory = Arc<dyn Fn() -> ControllerInstance + Send + Sync>;
pub(crate) type MethodBinder =
    Arc<dyn Fn(&ControllerInstance) -> Option<BoundMethod> + Send + Sync>;

/// Everything known about one controller
#[derive(Default)]
struct ControllerRecord {
    base_path: Option<String>,
    routes: Vec<RouteDeclaration>,
    params: HashMap<String, Vec<ParamDeclaration>>,
    factory: Option<Factory>,
    methods: HashMap<String, MethodBinder>,
}

/// Declarations keyed by controller identity
#[derive(Default)]
pub struct MetadataStore {
    records: HashMap<ControllerId, ControllerRecord>,
    order: Vec<ControllerId>,
}

impl MetadataStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `C`, running its declarations against this store
    ///
    /// Registering the same controller twice is a no-op.
    pub fn register<C: Controller>(&mut self) -> ControllerId {
        let id = ControllerId::of::<C>();
        if self.is_registered(id) {
            return id;
        }
        let factory: Factory = Arc::new(|| Arc::new(C::create()) as ControllerInstance);
        self.record_mut(id).factory = Some(factory);
        C::declare(&mut ControllerDeclaration::new(self, id));
        debug!(controller = %id, "registered controller");
        id
    }

    /// Check whether `id` has a factory
    #[must_use]
    pub fn is_registered(&self, id: ControllerId) -> bool {
        self.records.get(&id).is_some_and(|r| r.factory.is_some())
    }

    /// Registered controllers, in registration order
    #[must_use]
    pub fn controllers(&self) -> Vec<ControllerId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.is_registered(*id))
            .collect()
    }

    /// Set the base path of a controller
    pub fn set_base_path(&mut self, id: ControllerId, path: impl Into<String>) {
        let path = path.into();
        debug!(controller = %id, base_path = %path, "set base path");
        self.record_mut(id).base_path = Some(path);
    }

    /// Base path of a controller, if one was set
    #[must_use]
    pub fn base_path(&self, id: ControllerId) -> Option<&str> {
        self.records.get(&id)?.base_path.as_deref()
    }

    /// Append a route declaration
    pub fn add_route_declaration(&mut self, id: ControllerId, declaration: RouteDeclaration) {
        debug!(
            controller = %id,
            method = %declaration.request_method,
            path = %declaration.path,
            handler = %declaration.method_name,
            "add route"
        );
        self.record_mut(id).routes.push(declaration);
    }

    /// Route declarations in declaration order (empty if none)
    #[must_use]
    pub fn route_declarations(&self, id: ControllerId) -> &[RouteDeclaration] {
        self.records
            .get(&id)
            .map(|r| r.routes.as_slice())
            .unwrap_or_default()
    }

    /// Append a parameter declaration for `method_name`
    pub fn add_parameter_declaration(
        &mut self,
        id: ControllerId,
        method_name: &str,
        declaration: ParamDeclaration,
    ) {
        debug!(
            controller = %id,
            handler = %method_name,
            index = declaration.index,
            kind = %declaration.kind,
            "add parameter"
        );
        self.record_mut(id)
            .params
            .entry(method_name.to_string())
            .or_default()
            .push(declaration);
    }

    /// Parameter declarations of a method, in registration order (empty if none)
    #[must_use]
    pub fn parameter_declarations(
        &self,
        id: ControllerId,
        method_name: &str,
    ) -> &[ParamDeclaration] {
        self.records
            .get(&id)
            .and_then(|r| r.params.get(method_name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Remove everything recorded for a controller
    pub fn clear(&mut self, id: ControllerId) {
        self.records.remove(&id);
        self.order.retain(|existing| *existing != id);
    }

    pub(crate) fn bind_method(
        &mut self,
        id: ControllerId,
        method_name: &str,
        binder: MethodBinder,
    ) {
        self.record_mut(id)
            .methods
            .insert(method_name.to_string(), binder);
    }

    pub(crate) fn factory(&self, id: ControllerId) -> Option<&Factory> {
        self.records.get(&id)?.factory.as_ref()
    }

    pub(crate) fn method_binder(
        &self,
        id: ControllerId,
        method_name: &str,
    ) -> Option<&MethodBinder> {
        self.records.get(&id)?.methods.get(method_name)
    }

    fn record_mut(&mut self, id: ControllerId) -> &mut ControllerRecord {
        if !self.records.contains_key(&id) {
            self.order.push(id);
        }
        self.records.entry(id).or_default()
    }
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStore")
            .field("controllers", &self.order)
            .finish_non_exhaustive()
    }
}
