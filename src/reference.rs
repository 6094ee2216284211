//! Uniform coercion of name, instance, inline and deferred references.
//!
//! Every API that accepts an action or scenario takes a [`Reference`]. The
//! reference stays lazy until the story boots, so an unregistered name only
//! fails when the owning case resolves it.

use crate::action::Action;
use crate::callback::Callback;
use crate::error::{ComponentKind, StoryError};
use crate::registry::Registry;
use crate::scenario::Scenario;
use std::fmt;
use std::sync::Arc;

/// Length of the random suffix given to anonymous components.
const SUFFIX_LEN: usize = 8;

/// A concrete component produced by a deferred reference.
#[derive(Clone, Debug)]
pub enum Component {
    /// An action.
    Action(Action),
    /// A scenario.
    Scenario(Scenario),
}

impl Component {
    fn describe(&self) -> String {
        match self {
            Self::Action(action) => format!("the `{}` action", action.name()),
            Self::Scenario(scenario) => format!("the `{}` scenario", scenario.name()),
        }
    }
}

/// A pending call resolved when the owning story boots.
pub type Deferral = Arc<dyn Fn(&Registry) -> anyhow::Result<Component> + Send + Sync>;

/// A reference to an action or scenario in any accepted form.
pub enum Reference<T> {
    /// A registered name, or the name of a registered action type.
    Name(String),
    /// A concrete instance.
    Instance(T),
    /// A bare callback wrapped into an anonymous instance on attachment.
    Inline(Callback),
    /// A pending call yielding a component of some kind.
    Deferred {
        /// Stable key used for inheritance overlays.
        key: String,
        /// Produces the component.
        resolve: Deferral,
    },
}

impl<T: Clone> Clone for Reference<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Name(name) => Self::Name(name.clone()),
            Self::Instance(item) => Self::Instance(item.clone()),
            Self::Inline(callback) => Self::Inline(Arc::clone(callback)),
            Self::Deferred { key, resolve } => Self::Deferred {
                key: key.clone(),
                resolve: Arc::clone(resolve),
            },
        }
    }
}

impl<T: Registered> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Self::Instance(item) => f.debug_tuple("Instance").field(&item.component_name()).finish(),
            Self::Inline(_) => f.write_str("Inline"),
            Self::Deferred { key, .. } => f.debug_struct("Deferred").field("key", key).finish(),
        }
    }
}

/// Components that can be looked up by name and coerced from references.
pub trait Registered: Clone + Sized {
    /// The kind reported in lookup errors.
    const KIND: ComponentKind;

    /// The component's registry name.
    fn component_name(&self) -> &str;

    /// Instantiate a registered constructible type called `name`.
    fn construct(_registry: &Registry, _name: &str) -> Option<Self> {
        None
    }

    /// Fetch the instance registered under `name`.
    fn fetch(registry: &Registry, name: &str) -> Option<Self>;

    /// Wrap a bare callback into an anonymous instance.
    fn from_inline(callback: Callback) -> Self;

    /// Extract this kind from a deferred component.
    ///
    /// # Errors
    ///
    /// Hands the component back when it is of another kind.
    fn from_component(component: Component) -> Result<Self, Component>;
}

impl<T: Registered> Reference<T> {
    /// Reference a bare callback.
    pub fn inline(callback: Callback) -> Self {
        Self::Inline(callback)
    }

    /// Reference a pending call evaluated at boot time.
    pub fn deferred<F>(resolve: F) -> Self
    where
        F: Fn(&Registry) -> anyhow::Result<Component> + Send + Sync + 'static,
    {
        Self::Deferred {
            key: anonymous_name("deferred"),
            resolve: Arc::new(resolve),
        }
    }

    /// Turn an inline callback into its anonymous instance so the reference
    /// keeps one stable identity from attachment onwards.
    #[must_use]
    pub fn settle(self) -> Self {
        match self {
            Self::Inline(callback) => Self::Instance(T::from_inline(callback)),
            settled @ (Self::Name(_) | Self::Instance(_) | Self::Deferred { .. }) => settled,
        }
    }

    /// The key this reference occupies in an inheritance overlay.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Name(name) => name.clone(),
            Self::Instance(item) => item.component_name().to_owned(),
            Self::Inline(callback) => format!("inline@{:p}", Arc::as_ptr(callback)),
            Self::Deferred { key, .. } => key.clone(),
        }
    }

    /// Coerce the reference into a concrete component.
    ///
    /// Deferred calls are evaluated first; names are tried as constructible
    /// types before the plain name store; bare callbacks become anonymous
    /// instances.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::InvalidReference`] when a deferred call yields
    /// the wrong kind, [`StoryError::NotFound`] when a name is unknown, or
    /// whatever the deferred call itself raised.
    pub fn resolve(&self, registry: &Registry) -> anyhow::Result<T> {
        match self {
            Self::Deferred { resolve, .. } => {
                let component = resolve(registry)?;
                T::from_component(component).map_err(|other| {
                    StoryError::InvalidReference {
                        expected: T::KIND,
                        found: other.describe(),
                    }
                    .into()
                })
            }
            Self::Name(name) => T::construct(registry, name)
                .or_else(|| T::fetch(registry, name))
                .ok_or_else(|| StoryError::not_found(T::KIND, name.as_str()).into()),
            Self::Instance(item) => Ok(item.clone()),
            Self::Inline(callback) => Ok(T::from_inline(Arc::clone(callback))),
        }
    }
}

impl<T> From<&str> for Reference<T> {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl<T> From<String> for Reference<T> {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl<T> From<Callback> for Reference<T> {
    fn from(callback: Callback) -> Self {
        Self::Inline(callback)
    }
}

impl From<Action> for Reference<Action> {
    fn from(action: Action) -> Self {
        Self::Instance(action)
    }
}

impl From<Scenario> for Reference<Scenario> {
    fn from(scenario: Scenario) -> Self {
        Self::Instance(scenario)
    }
}

/// Build `<prefix>@<8 hex chars>` for components created without a name.
pub(crate) fn anonymous_name(prefix: &str) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SUFFIX_LEN)
        .collect();
    format!("{prefix}@{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::callback;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn registry() -> Registry {
        let registry = Registry::new();
        registry.remember_scenario(Scenario::new("as_admin").generator(|_| Ok(json!("admin"))));
        registry.remember_action(Action::new("create_product"));
        registry
    }

    #[rstest]
    fn names_resolve_through_the_registry(registry: Registry) {
        let scenario = Reference::<Scenario>::from("as_admin")
            .resolve(&registry)
            .expect("registered scenario");
        assert_eq!(scenario.name(), "as_admin");
    }

    #[rstest]
    fn unknown_names_fail_with_not_found(registry: Registry) {
        let err = Reference::<Action>::from("missing")
            .resolve(&registry)
            .expect_err("unregistered action");
        assert_eq!(err.to_string(), "The `missing` action could not be found.");
    }

    #[rstest]
    fn constructible_types_win_over_the_name_store(registry: Registry) {
        registry.register_action_type("create_product", || {
            Action::new("create_product").variable("built")
        });
        let action = Reference::<Action>::from("create_product")
            .resolve(&registry)
            .expect("constructed action");
        assert_eq!(action.variable_name(), "built");
    }

    #[rstest]
    fn deferred_calls_must_yield_the_right_kind(registry: Registry) {
        let reference = Reference::<Action>::deferred(|registry| {
            registry
                .scenario("as_admin")
                .map(Component::Scenario)
                .ok_or_else(|| anyhow::anyhow!("not registered"))
        });
        let err = reference.resolve(&registry).expect_err("scenario is not an action");
        let story_err = err.downcast_ref::<StoryError>().expect("story error");
        assert!(matches!(
            story_err,
            StoryError::InvalidReference {
                expected: ComponentKind::Action,
                ..
            }
        ));
    }

    #[rstest]
    fn inline_callbacks_settle_into_anonymous_instances() {
        let reference = Reference::<Action>::inline(callback(|_| Ok(json!(1)))).settle();
        let key = reference.key();
        assert!(key.starts_with("inline@"), "unexpected key {key}");
        assert_eq!(key.len(), "inline@".len() + SUFFIX_LEN);
        assert_eq!(reference.key(), key);
    }
}
