//! Story trees and their fluent configuration.
//!
//! A [`Story`] owns its children. Leaves become runnable [`Case`]s once the
//! tree is walked; each case carries everything it inherited from its
//! ancestors, so a story never needs a pointer back to its parent.

mod case;
mod inherit;

pub use case::{Case, EXCEPTION_ARGUMENT, USER_ARGUMENT};

use crate::action::Action;
use crate::callback::{Arguments, CallbackMap, CallbackResult, Invocation, StoryFn, hooks};
use crate::capability::{CallbackHost, Nameable, TimeoutBound};
use crate::data::DataBag;
use crate::performer::{Authenticator, NullAuthenticator};
use crate::reference::Reference;
use crate::registry::Registry;
use crate::scenario::Scenario;
use crate::timeout::Timeout;
use crate::timer::TimerUnit;
use crate::walker;
use indexmap::IndexMap;
use itertools::Itertools;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Outcome a story is expected to reach, shown as a name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// The actor is expected to succeed; runs the `can` check.
    Can,
    /// The actor is expected to be refused; runs the `cannot` check.
    Cannot,
}

impl Expectation {
    /// The prefix added to test names.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Can => "[Can]",
            Self::Cannot => "[Cannot]",
        }
    }

    /// The callback run as this expectation's check.
    #[must_use]
    pub const fn hook(self) -> &'static str {
        match self {
            Self::Can => hooks::CAN,
            Self::Cannot => hooks::CANNOT,
        }
    }
}

/// A scenario attached to a story with its declared arguments.
#[derive(Clone, Debug)]
pub struct ScenarioAttachment {
    pub(crate) reference: Reference<Scenario>,
    pub(crate) arguments: Arguments,
}

/// An action attached to a story with its arguments and result variable.
#[derive(Clone, Debug)]
pub struct ActionAttachment {
    pub(crate) reference: Reference<Action>,
    pub(crate) arguments: Arguments,
    pub(crate) variable: Option<String>,
}

/// A node in the story tree.
#[derive(Clone, Default)]
pub struct Story {
    name: Option<String>,
    scenarios: Vec<ScenarioAttachment>,
    actions: Vec<ActionAttachment>,
    callbacks: CallbackMap,
    data: DataBag,
    timeout: Timeout,
    expectation: Option<Expectation>,
    children: Vec<Self>,
}

impl fmt::Debug for Story {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Story")
            .field("name", &self.name)
            .field("scenarios", &self.scenarios)
            .field("actions", &self.actions)
            .field("callbacks", &self.callbacks)
            .field("data", &self.data)
            .field("timeout", &self.timeout)
            .field("expectation", &self.expectation)
            .field("children", &self.children)
            .finish()
    }
}

impl Story {
    /// Create an unnamed story.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a story whose name fragment is `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().name(name)
    }

    /// Set the name fragment.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a scenario.
    #[must_use]
    pub fn scenario(self, scenario: impl Into<Reference<Scenario>>) -> Self {
        self.scenario_with(scenario, Arguments::new())
    }

    /// Attach a scenario with declared arguments for its generator.
    #[must_use]
    pub fn scenario_with(
        mut self,
        scenario: impl Into<Reference<Scenario>>,
        arguments: Arguments,
    ) -> Self {
        self.scenarios.push(ScenarioAttachment {
            reference: scenario.into().settle(),
            arguments,
        });
        self
    }

    /// Attach an action.
    #[must_use]
    pub fn action(self, action: impl Into<Reference<Action>>) -> Self {
        self.action_with(action, Arguments::new(), None)
    }

    /// Attach an action with literal arguments and an optional result
    /// variable overriding the action's own.
    #[must_use]
    pub fn action_with(
        mut self,
        action: impl Into<Reference<Action>>,
        arguments: Arguments,
        variable: Option<&str>,
    ) -> Self {
        self.actions.push(ActionAttachment {
            reference: action.into().settle(),
            arguments,
            variable: variable.map(str::to_owned),
        });
        self
    }

    /// Register the hook run before the story's actions.
    #[must_use]
    pub fn before<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::BEFORE, f)
    }

    /// Register the hook run after the story's task.
    #[must_use]
    pub fn after<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::AFTER, f)
    }

    /// Register the first step of the perform phase.
    #[must_use]
    pub fn set_up<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::SET_UP, f)
    }

    /// Register the last step of the perform phase.
    ///
    /// After a timeout it receives the failure message as `exception`.
    #[must_use]
    pub fn tear_down<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::TEAR_DOWN, f)
    }

    /// Register the hook run when a leaf is handed to the registrar.
    #[must_use]
    pub fn registering<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::REGISTERING, f)
    }

    /// Register the hook run once the leaf starts executing actions.
    #[must_use]
    pub fn booting<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::BOOTING, f)
    }

    /// Register the task under test.
    #[must_use]
    pub fn task<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::TASK, f)
    }

    /// Register the checks run for `[Can]` and `[Cannot]` leaves.
    #[must_use]
    pub fn check<F, G>(self, can: F, cannot: G) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
        G: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::CAN, can).hook(hooks::CANNOT, cannot)
    }

    /// Register one check for both expectations.
    #[must_use]
    pub fn assert<F>(self, check: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        let shared: Arc<StoryFn> = Arc::new(check);
        let mut story = self;
        story.callbacks.set(hooks::CAN, Arc::clone(&shared));
        story.callbacks.set(hooks::CANNOT, shared);
        story
    }

    /// Expect the actor to succeed.
    #[must_use]
    pub const fn can(mut self) -> Self {
        self.expectation = Some(Expectation::Can);
        self
    }

    /// Expect the actor to be refused.
    #[must_use]
    pub const fn cannot(mut self) -> Self {
        self.expectation = Some(Expectation::Cannot);
        self
    }

    /// Limit each leaf run to `amount` of `unit`.
    #[must_use]
    pub const fn timeout(mut self, amount: u64, unit: TimerUnit) -> Self {
        self.timeout = Timeout::of(amount, unit);
        self
    }

    /// Remove any inherited limit.
    #[must_use]
    pub const fn no_timeout(mut self) -> Self {
        self.timeout = Timeout::Disabled;
        self
    }

    /// Seed the data bag with `value` under `key`.
    #[must_use]
    pub fn set_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.set(key, value.into());
        self
    }

    /// Append `children` as child stories.
    #[must_use]
    pub fn stories(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children.extend(children);
        self
    }

    /// Append one child story.
    #[must_use]
    pub fn story(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    fn hook<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.callbacks.set(name, Arc::new(f));
        self
    }

    /// The story's own name fragment.
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The child stories.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// Report whether the story has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The story's own data, without inherited entries.
    #[must_use]
    pub const fn data(&self) -> &DataBag {
        &self.data
    }

    /// The story's own expectation marker.
    #[must_use]
    pub const fn expectation(&self) -> Option<Expectation> {
        self.expectation
    }

    /// Scenarios attached directly to this story.
    #[must_use]
    pub fn scenario_attachments(&self) -> &[ScenarioAttachment] {
        &self.scenarios
    }

    /// Actions attached directly to this story.
    #[must_use]
    pub fn action_attachments(&self) -> &[ActionAttachment] {
        &self.actions
    }

    /// Flatten the tree into leaf cases keyed by their full names.
    ///
    /// Leaves sharing a full name collapse to the last one.
    #[must_use]
    pub fn all_stories(&self, registry: &Registry) -> IndexMap<String, Case> {
        let authenticator: Arc<dyn Authenticator> = Arc::new(NullAuthenticator);
        walker::walk(self, registry, &authenticator)
            .into_iter()
            .map(|case| (case.name().to_owned(), case))
            .collect()
    }
}

impl Nameable for Story {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl CallbackHost for Story {
    type Hook = StoryFn;

    fn callbacks(&self) -> &CallbackMap {
        &self.callbacks
    }

    fn callbacks_mut(&mut self) -> &mut CallbackMap {
        &mut self.callbacks
    }
}

impl TimeoutBound for Story {
    fn timeout_setting(&self) -> Timeout {
        self.timeout
    }
}

/// Join `fragments` behind the expectation prefix, skipping empty parts.
pub(crate) fn compose_name<I>(expectation: Option<Expectation>, fragments: I) -> String
where
    I: IntoIterator<Item = String>,
{
    expectation
        .map(|marker| marker.prefix().to_owned())
        .into_iter()
        .chain(fragments)
        .map(|fragment| fragment.trim().to_owned())
        .filter(|fragment| !fragment.is_empty())
        .join(" ")
}

#[cfg(test)]
mod tests;
