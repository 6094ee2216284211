//! Explicit name stores for actions, scenarios and process-wide hooks.
//!
//! A [`Registry`] is a cheap, cloneable handle. Every clone sees the same
//! stores, so a suite can hand it to each case it builds. Registering a name
//! twice keeps the latest definition.

use crate::action::Action;
use crate::callback::{Callback, StaticCallbacks, hooks};
use crate::scenario::Scenario;
use crate::story::Story;
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Builds a fresh action for a registered action type.
pub type ActionFactory = Arc<dyn Fn() -> Action + Send + Sync>;

#[derive(Default)]
struct Stores {
    actions: IndexMap<String, Action>,
    scenarios: IndexMap<String, Scenario>,
    action_types: IndexMap<String, ActionFactory>,
    statics: StaticCallbacks,
}

/// Shared name → definition lookup.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<Stores>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stores = self.read();
        f.debug_struct("Registry")
            .field("actions", &stores.actions.keys().collect::<Vec<_>>())
            .field("scenarios", &stores.scenarios.keys().collect::<Vec<_>>())
            .field("action_types", &stores.action_types.keys().collect::<Vec<_>>())
            .field("statics", &stores.statics)
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Stores> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Stores> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `action` under its name and hand it back.
    pub fn remember_action(&self, action: Action) -> Action {
        debug!(action = action.name(), "registering action");
        self.write()
            .actions
            .insert(action.name().to_owned(), action.clone());
        action
    }

    /// Fetch a copy of the action registered as `name`.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<Action> {
        self.read().actions.get(name).cloned()
    }

    /// Report whether an action is registered as `name`.
    #[must_use]
    pub fn has_action(&self, name: &str) -> bool {
        self.read().actions.contains_key(name)
    }

    /// Store `scenario` under its name and hand it back.
    pub fn remember_scenario(&self, scenario: Scenario) -> Scenario {
        debug!(scenario = scenario.name(), "registering scenario");
        self.write()
            .scenarios
            .insert(scenario.name().to_owned(), scenario.clone());
        scenario
    }

    /// Fetch the scenario registered as `name`.
    #[must_use]
    pub fn scenario(&self, name: &str) -> Option<Scenario> {
        self.read().scenarios.get(name).cloned()
    }

    /// Report whether a scenario is registered as `name`.
    #[must_use]
    pub fn has_scenario(&self, name: &str) -> bool {
        self.read().scenarios.contains_key(name)
    }

    /// Register a constructible action type; references naming it build a
    /// new action from `factory` instead of reading the name store.
    pub fn register_action_type<F>(&self, type_name: impl Into<String>, factory: F)
    where
        F: Fn() -> Action + Send + Sync + 'static,
    {
        self.write()
            .action_types
            .insert(type_name.into(), Arc::new(factory));
    }

    /// Build an action from the type registered as `type_name`.
    #[must_use]
    pub fn construct_action(&self, type_name: &str) -> Option<Action> {
        let factory = self.read().action_types.get(type_name).cloned()?;
        Some(factory())
    }

    /// Set or clear (`None`) the `name` hook for the scope type `S`.
    pub fn set_static_callback<S: ?Sized + 'static>(&self, name: &str, callback: Option<Callback>) {
        self.write().statics.set::<S>(name, callback);
    }

    /// Fetch the `name` hook for the scope type `S`.
    #[must_use]
    pub fn static_callback<S: ?Sized + 'static>(&self, name: &str) -> Option<Callback> {
        self.read().statics.get::<S>(name)
    }

    /// Report whether the scope type `S` has a `name` hook.
    #[must_use]
    pub fn has_static_callback<S: ?Sized + 'static>(&self, name: &str) -> bool {
        self.read().statics.has::<S>(name)
    }

    /// Replace the authenticator for every story with `callback`, or restore
    /// it with `None`.
    pub fn acting_as(&self, callback: Option<Callback>) {
        self.set_static_callback::<Story>(hooks::ACTING_AS, callback);
    }

    /// Forget every registration.
    pub fn clear(&self) {
        let mut stores = self.write();
        stores.actions.clear();
        stores.scenarios.clear();
        stores.action_types.clear();
        stores.statics.clear();
    }
}
