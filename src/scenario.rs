//! Named, ordered setup routines whose results land in the story data bag.

use crate::callback::{Arguments, Callback, CallbackResult, Invocation};
use crate::capability::Nameable;
use crate::error::{ComponentKind, StoryError};
use crate::reference::{self, Component, Registered};
use crate::registry::Registry;
use crate::story::Case;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Whether, and how, a scenario contributes to the story's display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AppendName {
    /// The scenario leaves the name alone.
    #[default]
    Off,
    /// Append the scenario's own name with underscores read as spaces.
    Own,
    /// Append the given text verbatim.
    Custom(String),
}

/// A reusable setup routine.
#[derive(Clone)]
pub struct Scenario {
    name: String,
    generator: Option<Callback>,
    variable: Option<String>,
    order: i64,
    append: AppendName,
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("variable", &self.variable_name())
            .field("order", &self.order)
            .field("append", &self.append)
            .field("has_generator", &self.generator.is_some())
            .finish()
    }
}

impl Scenario {
    /// Declare a scenario called `name` with no generator yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generator: None,
            variable: None,
            order: 0,
            append: AppendName::Off,
        }
    }

    /// Declare a scenario whose generator is `generator`.
    pub fn with_generator(name: impl Into<String>, generator: Callback) -> Self {
        Self {
            generator: Some(generator),
            ..Self::new(name)
        }
    }

    /// Set the generator.
    #[must_use]
    pub fn generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.generator = Some(Arc::new(generator));
        self
    }

    /// Store the generator's result under `variable` instead of the name.
    #[must_use]
    pub fn variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    /// Set the ordering key; lower keys boot first.
    #[must_use]
    pub const fn order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    /// Append the scenario's own name to the story name.
    #[must_use]
    pub fn append_name(mut self) -> Self {
        self.append = AppendName::Own;
        self
    }

    /// Append `text` to the story name.
    #[must_use]
    pub fn append_custom_name(mut self, text: impl Into<String>) -> Self {
        self.append = AppendName::Custom(text.into());
        self
    }

    /// The registry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The data bag key the result is stored under.
    #[must_use]
    pub fn variable_name(&self) -> &str {
        self.variable.as_deref().unwrap_or(&self.name)
    }

    /// The ordering key.
    #[must_use]
    pub const fn order_key(&self) -> i64 {
        self.order
    }

    /// The append-name setting.
    #[must_use]
    pub const fn append_setting(&self) -> &AppendName {
        &self.append
    }

    /// The fragment this scenario adds to a story name, if any.
    #[must_use]
    pub fn appended_name(&self) -> Option<String> {
        match &self.append {
            AppendName::Off => None,
            AppendName::Own => Some(self.name.replace('_', " ")),
            AppendName::Custom(text) => Some(text.clone()),
        }
    }

    /// Report whether a generator is assigned.
    #[must_use]
    pub const fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Run the generator against `case` and store its result.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::GeneratorMissing`] when no generator is assigned,
    /// or the generator's own error.
    pub fn boot(&self, case: &mut Case, arguments: &Arguments) -> anyhow::Result<Value> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| StoryError::GeneratorMissing {
                name: self.name.clone(),
            })?;
        debug!(scenario = %self.name, variable = self.variable_name(), "booting scenario");
        let value = case.invoke(generator, &[arguments])?;
        case.data_mut().set(self.variable_name(), value.clone());
        Ok(value)
    }
}

impl Nameable for Scenario {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Registered for Scenario {
    const KIND: ComponentKind = ComponentKind::Scenario;

    fn component_name(&self) -> &str {
        &self.name
    }

    fn fetch(registry: &Registry, name: &str) -> Option<Self> {
        registry.scenario(name)
    }

    fn from_inline(callback: Callback) -> Self {
        Self::with_generator(reference::anonymous_name("inline"), callback)
    }

    fn from_component(component: Component) -> Result<Self, Component> {
        match component {
            Component::Scenario(scenario) => Ok(scenario),
            other @ Component::Action(_) => Err(other),
        }
    }
}

/// Sort `scenarios` by order key, keeping attachment order on ties.
pub fn sort_by_order<A>(scenarios: &mut [(Scenario, A)]) {
    scenarios.sort_by_key(|(scenario, _)| scenario.order_key());
}
