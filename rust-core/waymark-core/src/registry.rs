//! # Controller Registry
//!
//! Arena of controller singletons keyed by controller identity.
//!
//! Each controller is instantiated at most once per registry, on first use,
//! and the same `Arc` is handed to every route that belongs to it. The
//! registry is cheap to clone; clones share the same arena, so several
//! route table builds can reuse one set of singletons while tests keep
//! independent registries apart.

use crate::metadata::ControllerId;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Type-erased controller singleton
pub type ControllerInstance = Arc<dyn Any + Send + Sync>;

/// Shared arena of controller singletons
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    instances: Arc<Mutex<HashMap<ControllerId, ControllerInstance>>>,
}

impl ControllerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the singleton for `id`, creating it with `create` on first use
    ///
    /// The lock is held while `create` runs, so concurrent callers never
    /// build two instances of the same controller.
    pub fn get_or_create<F>(&self, id: ControllerId, create: F) -> ControllerInstance
    where
        F: FnOnce() -> ControllerInstance,
    {
        let mut instances = self.lock();
        Arc::clone(instances.entry(id).or_insert_with(|| {
            debug!(controller = %id, "instantiating controller singleton");
            create()
        }))
    }

    /// The singleton for `id`, if it was already created
    #[must_use]
    pub fn get(&self, id: ControllerId) -> Option<ControllerInstance> {
        self.lock().get(&id).map(Arc::clone)
    }

    /// The singleton for `C`, downcast to its concrete type
    #[must_use]
    pub fn get_typed<C: Any + Send + Sync>(&self) -> Option<Arc<C>> {
        self.get(ControllerId::of::<C>())
            .and_then(|instance| instance.downcast::<C>().ok())
    }

    /// Check if a singleton exists for `id`
    #[must_use]
    pub fn contains(&self, id: ControllerId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of instantiated controllers
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing was instantiated yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ControllerId, ControllerInstance>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("controllers", &self.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}
