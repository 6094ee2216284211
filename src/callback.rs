//! Named lifecycle callbacks and the argument-injecting invoker.
//!
//! Every story-scoped callback receives an [`Invocation`]: the merged argument
//! map (story data bag, then declared arguments, then caller-supplied
//! literals) plus a mutable handle to the running [`Case`]. Callbacks pull the
//! parameters they need by name with [`Invocation::arg`].
//!
//! [`CallbackMap`] is the per-node store of hooks such as `before` and
//! `after`; [`StaticCallbacks`] holds process-wide hooks scoped to a concrete
//! type rather than an instance.

use crate::data::{self, DataBag};
use crate::error::StoryError;
use crate::story::Case;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Result type returned by every callback.
pub type CallbackResult = anyhow::Result<Value>;

/// Signature of a story-scoped callback.
pub type StoryFn = dyn Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync;

/// Shared handle to a story-scoped callback.
pub type Callback = Arc<StoryFn>;

/// Wrap a closure as a [`Callback`].
#[must_use]
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Well-known callback names.
pub mod hooks {
    /// Runs before a story's actions, or before each action iteration.
    pub const BEFORE: &str = "before";
    /// Runs after a story's task, or after each action iteration.
    pub const AFTER: &str = "after";
    /// Runs when an action is about to execute inside a story.
    pub const BOOTING: &str = "booting";
    /// Runs when a case is handed to the test registrar.
    pub const REGISTERING: &str = "registering";
    /// First step of a story's perform phase.
    pub const SET_UP: &str = "setUp";
    /// Last step of a story's perform phase; also run on timeout.
    pub const TEAR_DOWN: &str = "tearDown";
    /// The story's task under test.
    pub const TASK: &str = "task";
    /// Check run for stories expected to succeed.
    pub const CAN: &str = "can";
    /// Check run for stories expected to fail.
    pub const CANNOT: &str = "cannot";
    /// Static hook overriding the authentication adapter.
    pub const ACTING_AS: &str = "actingAs";
    /// Timer hook run when the deadline fires.
    pub const TIMEDOUT: &str = "timedout";
    /// Timer hook run when the task completes in time.
    pub const FINISHED: &str = "finished";
    /// Timer hook run when the task fails.
    pub const ERRORED: &str = "errored";
}

/// Named values injected into a callback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: IndexMap<String, Value>,
}

impl Arguments {
    /// Create an empty argument map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` under `name`, returning the updated map.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert `value` under `name`, replacing any previous entry.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Fetch the raw value bound to `name`; dotted names descend into objects.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        data::lookup(&self.values, name)
    }

    /// Overlay `other` onto this map; entries in `other` win.
    pub fn extend(&mut self, other: &Self) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    /// Iterate over the bound names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Report whether nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge a data bag with declared and caller-supplied arguments.
    pub(crate) fn merged(data: &DataBag, layers: &[&Self]) -> Self {
        let mut merged = Self {
            values: data.all().clone(),
        };
        for layer in layers {
            merged.extend(layer);
        }
        merged
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut arguments = Self::new();
        for (name, value) in iter {
            arguments.insert(name, value);
        }
        arguments
    }
}

/// A single callback dispatch.
pub struct Invocation<'a> {
    case: &'a mut Case,
    arguments: Arguments,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(case: &'a mut Case, arguments: Arguments) -> Self {
        Self { case, arguments }
    }

    /// Deserialise the argument bound to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::MissingArgument`] when nothing is bound to
    /// `name`, or [`StoryError::InvalidArgument`] when the bound value does
    /// not convert to `T`.
    pub fn arg<T: DeserializeOwned>(&self, name: &str) -> Result<T, StoryError> {
        let value = self
            .arguments
            .get(name)
            .ok_or_else(|| StoryError::MissingArgument {
                name: name.to_owned(),
            })?;
        serde_json::from_value(value.clone()).map_err(|source| StoryError::InvalidArgument {
            name: name.to_owned(),
            source,
        })
    }

    /// Deserialise the argument bound to `name` if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::InvalidArgument`] when the bound value does not
    /// convert to `T`.
    pub fn optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoryError> {
        self.arguments
            .get(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|source| {
                    StoryError::InvalidArgument {
                        name: name.to_owned(),
                        source,
                    }
                })
            })
            .transpose()
    }

    /// Borrow the raw value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Borrow every injected argument.
    #[must_use]
    pub const fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Borrow the running story case.
    #[must_use]
    pub fn story(&self) -> &Case {
        &*self.case
    }

    /// Mutably borrow the running story case.
    pub fn story_mut(&mut self) -> &mut Case {
        &mut *self.case
    }

    /// Name of the test this invocation belongs to.
    #[must_use]
    pub fn test_name(&self) -> &str {
        self.case.name()
    }
}

/// Named callbacks attached to one node.
pub struct CallbackMap<F: ?Sized = StoryFn> {
    entries: IndexMap<String, Arc<F>>,
}

impl<F: ?Sized> Default for CallbackMap<F> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<F: ?Sized> Clone for CallbackMap<F> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<F: ?Sized> fmt::Debug for CallbackMap<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl<F: ?Sized> CallbackMap<F> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `callback` under `name`, replacing any earlier entry.
    pub fn set(&mut self, name: impl Into<String>, callback: Arc<F>) -> &mut Self {
        self.entries.insert(name.into(), callback);
        self
    }

    /// Store `callback` when present; `None` leaves the map untouched.
    pub fn set_optional(&mut self, name: impl Into<String>, callback: Option<Arc<F>>) -> &mut Self {
        if let Some(found) = callback {
            self.set(name, found);
        }
        self
    }

    /// Fetch the callback registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<F>> {
        self.entries.get(name).cloned()
    }

    /// Report whether `name` has a callback.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterate over registered names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Overlay `other` onto this map; entries in `other` win.
    pub fn overlay(&mut self, other: &Self) {
        for (name, callback) in &other.entries {
            self.entries.insert(name.clone(), Arc::clone(callback));
        }
    }

    /// Merge `levels` root-first so the nearest definition of each name wins.
    pub fn inherit<'a, I>(levels: I) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
        F: 'a,
    {
        let mut merged = Self::new();
        for level in levels {
            merged.overlay(level);
        }
        merged
    }
}

/// Process-wide callbacks keyed by a concrete type and a hook name.
#[derive(Default, Clone)]
pub struct StaticCallbacks {
    entries: HashMap<(TypeId, String), Callback>,
}

impl fmt::Debug for StaticCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl StaticCallbacks {
    /// Store or clear (`None`) the `name` hook for scope `S`.
    pub fn set<S: ?Sized + 'static>(&mut self, name: &str, callback: Option<Callback>) {
        let key = (TypeId::of::<S>(), name.to_owned());
        match callback {
            Some(found) => {
                self.entries.insert(key, found);
            }
            None => {
                self.entries.remove(&key);
            }
        }
    }

    /// Fetch the `name` hook for scope `S`.
    #[must_use]
    pub fn get<S: ?Sized + 'static>(&self, name: &str) -> Option<Callback> {
        self.entries
            .get(&(TypeId::of::<S>(), name.to_owned()))
            .cloned()
    }

    /// Report whether scope `S` has a `name` hook.
    #[must_use]
    pub fn has<S: ?Sized + 'static>(&self, name: &str) -> bool {
        self.entries
            .contains_key(&(TypeId::of::<S>(), name.to_owned()))
    }

    /// Drop every hook.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
