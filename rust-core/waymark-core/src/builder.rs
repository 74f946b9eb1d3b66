//! # Route Table Builder
//!
//! Turns registered controllers into a flat, immutable route table.
//!
//! For every controller, in the order given: resolve its singleton through
//! the [`ControllerRegistry`], then for every route declaration, in declared
//! order, join the paths, bind the handler and compile the dispatch function.
//! A missing factory or handler aborts the whole build.

use crate::dispatch::compile_dispatch;
use crate::error::{Error, Result};
use crate::metadata::{ControllerId, MetadataStore};
use crate::registry::ControllerRegistry;
use crate::route::{resolve_path, RouteDefinition};
use std::sync::Arc;
use tracing::debug;

/// Builds route tables from a [`MetadataStore`]
///
/// Building never mutates the store. Builders sharing a registry share
/// controller singletons.
#[derive(Debug)]
pub struct RouteTableBuilder<'a> {
    store: &'a MetadataStore,
    registry: ControllerRegistry,
}

impl<'a> RouteTableBuilder<'a> {
    /// Builder with a fresh singleton registry
    #[must_use]
    pub fn new(store: &'a MetadataStore) -> Self {
        Self::with_registry(store, ControllerRegistry::new())
    }

    /// Builder reusing the singletons of `registry`
    #[must_use]
    pub fn with_registry(store: &'a MetadataStore, registry: ControllerRegistry) -> Self {
        Self { store, registry }
    }

    /// The registry holding this builder's singletons
    #[must_use]
    pub const fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    /// Build the route table for every registered controller
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn build_all(&self) -> Result<Vec<RouteDefinition>> {
        self.build(&self.store.controllers())
    }

    /// Build the route table for `controllers`, in order
    ///
    /// # Errors
    ///
    /// Returns `Error::UnresolvedController` if a controller was never
    /// registered and `Error::UnboundMethod` if a route names a method
    /// without a bound handler. No partial table is returned.
    pub fn build(&self, controllers: &[ControllerId]) -> Result<Vec<RouteDefinition>> {
        let mut routes = Vec::new();

        for &id in controllers {
            let factory = self
                .store
                .factory(id)
                .ok_or(Error::UnresolvedController { controller: id.name() })?;
            let instance = self.registry.get_or_create(id, || factory());
            let base = self.store.base_path(id).unwrap_or_default();

            for declaration in self.store.route_declarations(id) {
                let params = self
                    .store
                    .parameter_declarations(id, &declaration.method_name)
                    .to_vec();
                let unbound = || Error::UnboundMethod {
                    controller: id.name(),
                    method: declaration.method_name.clone(),
                };
                let bound = self
                    .store
                    .method_binder(id, &declaration.method_name)
                    .ok_or_else(unbound)
                    .and_then(|binder| binder(&instance).ok_or_else(unbound))?;

                let path = resolve_path(base, &declaration.path);
                debug!(
                    controller = %id,
                    method = %declaration.request_method,
                    path = %path,
                    handler = %declaration.method_name,
                    "compiled route"
                );

                let dispatch =
                    compile_dispatch(id.name(), &declaration.method_name, bound, params.clone());
                routes.push(RouteDefinition::new(
                    path,
                    declaration.request_method,
                    declaration.method_name.clone(),
                    id.name(),
                    params,
                    Arc::clone(&instance),
                    dispatch,
                ));
            }
        }

        debug!(routes = routes.len(), "route table built");
        Ok(routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Controller, ControllerDeclaration, ControllerResult};
    use crate::dispatch::Arguments;
    use crate::metadata::ParamDeclaration;
    use crate::request::Request;
    use crate::types::Method;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Orders {
        prefix: &'static str,
    }

    impl Controller for Orders {
        fn create() -> Self {
            Self { prefix: "order" }
        }

        fn declare(c: &mut ControllerDeclaration<'_, Self>) {
            c.base_path("/orders")
                .get("show", "/:id")
                .param("show", ParamDeclaration::params(0))
                .handler("show", |this: Arc<Self>, mut args: Arguments| async move {
                    let params: Value = args.take(0)?;
                    let id = params["id"].as_str().unwrap_or_default();
                    Ok::<_, Error>(ControllerResult::ok(json!({
                        "label": format!("{}-{}", this.prefix, id),
                    })))
                })
                .post("create", "")
                .handler("create", |_this: Arc<Self>, _args: Arguments| async {
                    ControllerResult::status(201)
                });
        }
    }

    struct Health;

    impl Controller for Health {
        fn create() -> Self {
            Self
        }

        fn declare(c: &mut ControllerDeclaration<'_, Self>) {
            c.get("check", "/").handler("check", |_this: Arc<Self>, _args: Arguments| async {
                ControllerResult::text("ok")
            });
        }
    }

    static TALLY_CREATED: AtomicUsize = AtomicUsize::new(0);

    struct Tally;

    impl Controller for Tally {
        fn create() -> Self {
            TALLY_CREATED.fetch_add(1, Ordering::SeqCst);
            Self
        }

        fn declare(c: &mut ControllerDeclaration<'_, Self>) {
            c.base_path("/tally")
                .get("a", "/a")
                .handler("a", |_this: Arc<Self>, _args: Arguments| async {
                    ControllerResult::ok(1)
                })
                .get("b", "/b")
                .handler("b", |_this: Arc<Self>, _args: Arguments| async {
                    ControllerResult::ok(2)
                });
        }
    }

    struct Broken;

    impl Controller for Broken {
        fn create() -> Self {
            Self
        }

        fn declare(c: &mut ControllerDeclaration<'_, Self>) {
            c.base_path("broken").get("missing", "/");
        }
    }

    #[test]
    fn test_build_resolves_paths_in_order() {
        let mut store = MetadataStore::new();
        let orders = store.register::<Orders>();
        let health = store.register::<Health>();

        let routes = RouteTableBuilder::new(&store).build(&[orders, health]).unwrap();
        let listing: Vec<String> = routes.iter().map(ToString::to_string).collect();
        assert_eq!(
            listing,
            [
                "GET /orders/:id -> Orders.show",
                "POST /orders -> Orders.create",
                "GET / -> Health.check",
            ]
        );
        assert_eq!(routes[0].method(), Method::Get);
        assert_eq!(routes[0].params().len(), 1);
    }

    #[test]
    fn test_singleton_shared_and_created_once() {
        let mut store = MetadataStore::new();
        store.register::<Tally>();

        let registry = ControllerRegistry::new();
        let first = RouteTableBuilder::with_registry(&store, registry.clone()).build_all().unwrap();
        let second = RouteTableBuilder::with_registry(&store, registry.clone())
            .build_all()
            .unwrap();

        assert_eq!(TALLY_CREATED.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(first[0].instance(), first[1].instance()));
        assert!(Arc::ptr_eq(first[0].instance(), second[0].instance()));
        assert!(registry.get_typed::<Tally>().is_some());
    }

    #[test]
    fn test_unregistered_controller_is_fatal() {
        let store = MetadataStore::new();
        let err = RouteTableBuilder::new(&store)
            .build(&[ControllerId::of::<Orders>()])
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedController { controller: "Orders" }));
    }

    #[test]
    fn test_unbound_method_aborts_build() {
        let mut store = MetadataStore::new();
        let orders = store.register::<Orders>();
        let broken = store.register::<Broken>();

        let err = RouteTableBuilder::new(&store).build(&[orders, broken]).unwrap_err();
        assert!(matches!(
            err,
            Error::UnboundMethod { controller: "Broken", ref method } if method == "missing"
        ));
    }

    #[test]
    fn test_build_leaves_store_untouched() {
        let mut store = MetadataStore::new();
        let id = store.register::<Orders>();
        let before = store.route_declarations(id).to_vec();

        RouteTableBuilder::new(&store).build_all().unwrap();
        assert_eq!(store.route_declarations(id), before.as_slice());
    }

    #[test]
    fn test_built_route_dispatches_through_singleton() {
        let mut store = MetadataStore::new();
        store.register::<Orders>();
        let routes = RouteTableBuilder::new(&store).build_all().unwrap();

        let request = Request::builder("GET", "/orders/7").param("id", "7").build();
        let result = tokio_test::block_on(routes[0].dispatch(request)).unwrap();
        assert_eq!(result.data, Some(json!({"label": "order-7"})));

        let request = Request::builder("POST", "/orders").build();
        let created = tokio_test::block_on(routes[1].dispatch(request)).unwrap();
        assert_eq!(created.effective_status(), 201);
    }
}
