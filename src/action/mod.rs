//! Named, repeatable units of work executed inside a story.
//!
//! An [`Action`] runs its required sub-actions, then its own callback, and
//! stores the callback's result in the story data bag. Actions are cloned
//! fresh for every story before they run, so repeat counters and timers are
//! never shared between cases.

mod repeat;

pub use repeat::Repeat;

use crate::callback::{Arguments, Callback, CallbackMap, CallbackResult, Invocation, hooks};
use crate::capability::{CallbackHost, Nameable, Repeatable, TimeoutBound};
use crate::error::ComponentKind;
use crate::reference::{self, Component, Reference, Registered};
use crate::registry::Registry;
use crate::story::Case;
use crate::timeout::Timeout;
use crate::timer::{TimerSettings, TimerUnit};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Name of the argument through which an action callback sees its action.
pub const ACTION_ARGUMENT: &str = "action";

/// Default body for actions defined as types rather than closures.
pub trait Invokable: Send + Sync {
    /// Perform the action's work and return the value to store.
    ///
    /// # Errors
    ///
    /// Any error aborts the story run.
    fn invoke(&self, invocation: &mut Invocation<'_>) -> CallbackResult;
}

/// A repeatable, composable step.
#[derive(Clone)]
pub struct Action {
    name: String,
    variable: Option<String>,
    callback: Option<Callback>,
    invokable: Option<Arc<dyn Invokable>>,
    actions: Vec<Reference<Self>>,
    repeat: Repeat,
    timer: TimerSettings,
    callbacks: CallbackMap,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("variable", &self.variable_name())
            .field("actions", &self.actions)
            .field("repeat", &self.repeat)
            .field("timeout", &self.timer.timeout_setting())
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

impl Action {
    /// Declare an action called `name` with no callback.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variable: None,
            callback: None,
            invokable: None,
            actions: Vec::new(),
            repeat: Repeat::once(),
            timer: TimerSettings::default(),
            callbacks: CallbackMap::new(),
        }
    }

    /// Declare an action with a generated `action@<suffix>` name.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(reference::anonymous_name("action"))
    }

    /// Declare an action called `name` that runs `callback`.
    pub fn with_callback(name: impl Into<String>, callback: Callback) -> Self {
        Self {
            callback: Some(callback),
            ..Self::new(name)
        }
    }

    /// Declare an action whose default body is `invokable`.
    pub fn invokable<I: Invokable + 'static>(name: impl Into<String>, invokable: I) -> Self {
        Self {
            invokable: Some(Arc::new(invokable)),
            ..Self::new(name)
        }
    }

    /// Replace the callback run on every iteration.
    #[must_use]
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Rename the action.
    #[must_use]
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Store results under `variable` instead of the action name.
    #[must_use]
    pub fn variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    /// Require `action` to run before this action's own callback.
    #[must_use]
    pub fn action(mut self, action: impl Into<Reference<Self>>) -> Self {
        self.actions.push(action.into().settle());
        self
    }

    /// Run `times` iterations per story; zero skips the body entirely.
    #[must_use]
    pub const fn repeat(mut self, times: u32) -> Self {
        self.repeat = Repeat::times(times);
        self
    }

    /// Run exactly once per story.
    #[must_use]
    pub const fn dont_repeat(self) -> Self {
        self.repeat(1)
    }

    /// Bound every run of this action to `amount` of `unit`.
    #[must_use]
    pub fn timeout(mut self, amount: u64, unit: TimerUnit) -> Self {
        self.timer = self.timer.timeout(amount, unit);
        self
    }

    /// Disable the per-run limit.
    #[must_use]
    pub fn no_timeout(mut self) -> Self {
        self.timer = self.timer.no_timeout();
        self
    }

    /// Replace the timer configuration wholesale.
    #[must_use]
    pub fn timer(mut self, settings: TimerSettings) -> Self {
        self.timer = settings;
        self
    }

    /// Register the hook run before each iteration.
    #[must_use]
    pub fn before<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::BEFORE, f)
    }

    /// Register the hook run after each iteration.
    #[must_use]
    pub fn after<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::AFTER, f)
    }

    /// Register the hook run when a story is about to run this action.
    #[must_use]
    pub fn booting<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::BOOTING, f)
    }

    /// Register the hook run when a story using this action is registered.
    #[must_use]
    pub fn registering<F>(self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::REGISTERING, f)
    }

    fn hook<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.callbacks.set(name, Arc::new(f));
        self
    }

    /// The registry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The data bag key results are stored under.
    #[must_use]
    pub fn variable_name(&self) -> &str {
        self.variable.as_deref().unwrap_or(&self.name)
    }

    /// Required sub-actions in attachment order.
    #[must_use]
    pub fn actions(&self) -> &[Reference<Self>] {
        &self.actions
    }

    /// The configured per-run timer.
    #[must_use]
    pub const fn timer_settings(&self) -> &TimerSettings {
        &self.timer
    }

    /// A copy for one story, with the repeat counter reset.
    #[must_use]
    pub fn fresh(&self) -> Self {
        let mut copy = self.clone();
        copy.repeat.reset();
        copy
    }

    /// Run the action against `case`.
    ///
    /// `arguments` are the literal values supplied by the attachment and
    /// `variable` overrides where the result is stored.
    ///
    /// # Errors
    ///
    /// Propagates failures from hooks, sub-actions and the callback; with a
    /// configured limit, an overrun raises [`crate::StoryError::Timeout`]
    /// according to the timer's rethrow policy. A failure aborts the
    /// remaining iterations.
    pub fn run(
        &mut self,
        case: &mut Case,
        arguments: &Arguments,
        variable: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut timer = self.timer.measure();
        if let Some(active) = timer.as_mut() {
            active.start();
        }

        let mut outcome = Ok(Value::Null);
        while self.repeats() {
            self.repeats_increment();
            if let Err(err) = self.process(case, arguments, variable) {
                outcome = Err(err);
                break;
            }
        }

        match timer.as_mut() {
            Some(active) => {
                active.end();
                active.check(outcome)?;
            }
            None => {
                outcome?;
            }
        }
        Ok(())
    }

    fn process(
        &self,
        case: &mut Case,
        arguments: &Arguments,
        variable: Option<&str>,
    ) -> anyhow::Result<()> {
        debug!(
            action = %self.name,
            iteration = self.times_run(),
            "running action"
        );
        self.run_hook(case, hooks::BEFORE)?;

        for required in &self.actions {
            let mut sub_action = required.resolve(case.registry())?.fresh();
            sub_action.run(case, &Arguments::new(), None)?;
        }

        let context = Arguments::new().with(ACTION_ARGUMENT, self.name.clone());
        let value = match (&self.callback, &self.invokable) {
            (Some(callback), _) => case.invoke(callback, &[&context, arguments])?,
            (None, Some(invokable)) => {
                let invokable = Arc::clone(invokable);
                case.invoke_with(&[&context, arguments], |invocation| {
                    invokable.invoke(invocation)
                })?
            }
            (None, None) => Value::Null,
        };
        let key = variable.unwrap_or_else(|| self.variable_name());
        case.data_mut().set(key, value);

        self.run_hook(case, hooks::AFTER)
    }

    fn run_hook(&self, case: &mut Case, name: &str) -> anyhow::Result<()> {
        let Some(hook) = self.callbacks.get(name) else {
            return Ok(());
        };
        debug!(action = %self.name, hook = name, "running action callback");
        let context = Arguments::new().with(ACTION_ARGUMENT, self.name.clone());
        case.invoke(&hook, &[&context])?;
        Ok(())
    }
}

impl Nameable for Action {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl CallbackHost for Action {
    type Hook = crate::callback::StoryFn;

    fn callbacks(&self) -> &CallbackMap {
        &self.callbacks
    }

    fn callbacks_mut(&mut self) -> &mut CallbackMap {
        &mut self.callbacks
    }
}

impl Repeatable for Action {
    fn repeat_policy(&self) -> &Repeat {
        &self.repeat
    }

    fn repeat_policy_mut(&mut self) -> &mut Repeat {
        &mut self.repeat
    }
}

impl TimeoutBound for Action {
    fn timeout_setting(&self) -> Timeout {
        self.timer.timeout_setting()
    }
}

impl Registered for Action {
    const KIND: ComponentKind = ComponentKind::Action;

    fn component_name(&self) -> &str {
        &self.name
    }

    fn construct(registry: &Registry, name: &str) -> Option<Self> {
        registry.construct_action(name)
    }

    fn fetch(registry: &Registry, name: &str) -> Option<Self> {
        registry.action(name)
    }

    fn from_inline(callback: Callback) -> Self {
        Self::with_callback(reference::anonymous_name("inline"), callback)
    }

    fn from_component(component: Component) -> Result<Self, Component> {
        match component {
            Component::Action(action) => Ok(action),
            other @ Component::Scenario(_) => Err(other),
        }
    }
}
