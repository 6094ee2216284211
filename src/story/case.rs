//! A resolved leaf story, ready to boot and run as one test.

use super::{ActionAttachment, Expectation, ScenarioAttachment, Story, compose_name, inherit};
use crate::action::{ACTION_ARGUMENT, Action};
use crate::callback::{Arguments, Callback, CallbackMap, CallbackResult, Invocation, hooks};
use crate::capability::{self, CallbackHost};
use crate::data::DataBag;
use crate::performer::Authenticator;
use crate::registry::Registry;
use crate::scenario::{self, Scenario};
use crate::timeout::Timeout;
use crate::error::StoryError;
use crate::timer::{CancelToken, Timer};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Argument handed to `tearDown` describing why the run stopped early.
pub const EXCEPTION_ARGUMENT: &str = "exception";

/// Argument handed to the `actingAs` hook.
pub const USER_ARGUMENT: &str = "user";

/// One executable test: a leaf story with everything it inherited.
#[derive(Clone)]
pub struct Case {
    name: String,
    label: String,
    registry: Registry,
    authenticator: Arc<dyn Authenticator>,
    scenarios: Vec<ScenarioAttachment>,
    actions: Vec<ActionAttachment>,
    callbacks: CallbackMap,
    data: DataBag,
    timeout: Timeout,
    expectation: Option<Expectation>,
    user: Option<Value>,
    booted: bool,
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("scenarios", &self.scenarios)
            .field("actions", &self.actions)
            .field("callbacks", &self.callbacks)
            .field("data", &self.data)
            .field("timeout", &self.timeout)
            .field("user", &self.user)
            .field("booted", &self.booted)
            .finish_non_exhaustive()
    }
}

impl Case {
    /// Resolve the leaf at the end of `chain` (root first).
    pub(crate) fn from_chain(
        chain: &[&Story],
        registry: &Registry,
        authenticator: &Arc<dyn Authenticator>,
    ) -> Self {
        let resolved = inherit::resolve(chain);
        let appended = appended_names(&resolved.scenarios, registry);
        let descendants = chain.get(1..).unwrap_or_default();
        let name = compose_name(
            resolved.expectation,
            std::iter::once(resolved.fragments).chain(appended.iter().cloned()),
        );
        let label = compose_name(
            resolved.expectation,
            std::iter::once(capability::inherit_name(descendants)).chain(appended),
        );
        Self {
            name,
            label,
            registry: registry.clone(),
            authenticator: Arc::clone(authenticator),
            scenarios: resolved.scenarios,
            actions: resolved.actions,
            callbacks: resolved.callbacks,
            data: resolved.data,
            timeout: resolved.timeout,
            expectation: resolved.expectation,
            user: None,
            booted: false,
        }
    }

    /// The full test name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name without the root story's fragment, used as a dataset label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The shared data bag.
    #[must_use]
    pub const fn data(&self) -> &DataBag {
        &self.data
    }

    /// Mutably borrow the shared data bag.
    pub const fn data_mut(&mut self) -> &mut DataBag {
        &mut self.data
    }

    /// Read `key` from the data bag.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// The registry references are resolved against.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The resolved timeout.
    #[must_use]
    pub const fn timeout(&self) -> Timeout {
        self.timeout
    }

    /// The inherited expectation.
    #[must_use]
    pub const fn expectation(&self) -> Option<Expectation> {
        self.expectation
    }

    /// The resolved callbacks.
    #[must_use]
    pub const fn callbacks(&self) -> &CallbackMap {
        &self.callbacks
    }

    /// Report whether the scenarios have run.
    #[must_use]
    pub const fn is_booted(&self) -> bool {
        self.booted
    }

    /// The user the story is acting as.
    #[must_use]
    pub const fn user(&self) -> Option<&Value> {
        self.user.as_ref()
    }

    pub(crate) const fn apply_default_timeout(&mut self, fallback: Timeout) {
        self.timeout = self.timeout.or(fallback);
    }

    /// Act as `user`, or as nobody with `None`.
    ///
    /// A registered `actingAs` hook replaces the authenticator entirely.
    ///
    /// # Errors
    ///
    /// Propagates failures from the hook or the authenticator.
    pub fn set_user(&mut self, user: Option<Value>) -> anyhow::Result<()> {
        self.user.clone_from(&user);
        if let Some(hook) = self.registry.static_callback::<Story>(hooks::ACTING_AS) {
            debug!(case = %self.name, "running actingAs override");
            let arguments = Arguments::new().with(USER_ARGUMENT, user.unwrap_or(Value::Null));
            self.invoke(&hook, &[&arguments])?;
            return Ok(());
        }
        match user {
            Some(found) => self.authenticator.login(&found),
            None => self.authenticator.logout(),
        }
    }

    /// Invoke `callback` with the data bag overlaid by `layers`.
    ///
    /// # Errors
    ///
    /// Returns whatever the callback returns.
    pub fn invoke(&mut self, callback: &Callback, layers: &[&Arguments]) -> CallbackResult {
        self.invoke_with(layers, |invocation| callback(invocation))
    }

    pub(crate) fn invoke_with<F>(&mut self, layers: &[&Arguments], call: F) -> CallbackResult
    where
        F: FnOnce(&mut Invocation<'_>) -> CallbackResult,
    {
        let arguments = Arguments::merged(&self.data, layers);
        let mut invocation = Invocation::new(self, arguments);
        call(&mut invocation)
    }

    /// Run the resolved `name` callback, if any.
    ///
    /// # Errors
    ///
    /// Returns whatever the callback returns.
    pub fn run_callback(&mut self, name: &str, extra: &Arguments) -> anyhow::Result<Option<Value>> {
        let Some(callback) = self.callbacks.get(name) else {
            return Ok(None);
        };
        debug!(case = %self.name, hook = name, "running story callback");
        self.invoke(&callback, &[extra]).map(Some)
    }

    /// Run the `registering` hooks of the story and of every attached action.
    ///
    /// Actions that do not resolve yet are skipped; they fail at boot.
    ///
    /// # Errors
    ///
    /// Propagates failures from the hooks.
    pub fn register(&mut self) -> anyhow::Result<()> {
        info!(case = %self.name, "registering story");
        self.run_callback(hooks::REGISTERING, &Arguments::new())?;
        for attachment in self.actions.clone() {
            let Ok(action) = attachment.reference.resolve(&self.registry) else {
                continue;
            };
            self.run_action_hook(&action, hooks::REGISTERING)?;
        }
        Ok(())
    }

    /// Run every resolved scenario once, lowest order key first.
    ///
    /// Repeat calls after a successful boot do nothing. A failed boot is not
    /// remembered, so a retry runs every scenario again.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoryError::NotFound`] before any scenario runs when
    /// one does not resolve, [`crate::StoryError::GeneratorMissing`] when a
    /// scenario has no generator, or a generator's own error.
    pub fn boot(&mut self) -> anyhow::Result<()> {
        self.boot_until(&CancelToken::default())
    }

    fn boot_until(&mut self, token: &CancelToken) -> anyhow::Result<()> {
        if self.booted {
            return Ok(());
        }
        info!(case = %self.name, "booting story");

        let mut ordered: Vec<(Scenario, Arguments)> = self
            .scenarios
            .iter()
            .map(|attachment| {
                attachment
                    .reference
                    .resolve(&self.registry)
                    .map(|found| (found, attachment.arguments.clone()))
            })
            .collect::<anyhow::Result<_>>()?;
        scenario::sort_by_order(&mut ordered);

        for (found, arguments) in &ordered {
            still_running(token)?;
            found.boot(self, arguments)?;
        }
        self.booted = true;
        Ok(())
    }

    /// Boot, then run the story's steps.
    ///
    /// `tearDown` runs even when an earlier step fails, receiving the failure
    /// message as `exception`.
    ///
    /// # Errors
    ///
    /// Returns the first failure, or the `tearDown` failure when every earlier
    /// step succeeded.
    pub fn perform(&mut self) -> anyhow::Result<()> {
        self.perform_until(&CancelToken::default())
    }

    /// Like [`Case::perform`], stopping before the next step once `token`
    /// is cancelled. A cancelled run skips `tearDown`; the timer's
    /// `timedout` hook owns it.
    fn perform_until(&mut self, token: &CancelToken) -> anyhow::Result<()> {
        self.boot_until(token)?;
        let outcome = self.perform_steps(token);
        if token.is_cancelled() {
            debug!(case = %self.name, "deadline passed; abandoning remaining steps");
            return outcome;
        }
        let mut extra = Arguments::new();
        if let Err(err) = &outcome {
            extra.insert(EXCEPTION_ARGUMENT, err.to_string());
        }
        let teardown = self.run_callback(hooks::TEAR_DOWN, &extra);
        outcome?;
        teardown?;
        Ok(())
    }

    fn perform_steps(&mut self, token: &CancelToken) -> anyhow::Result<()> {
        let none = Arguments::new();
        for hook in [hooks::SET_UP, hooks::BEFORE] {
            still_running(token)?;
            self.run_callback(hook, &none)?;
        }

        for attachment in self.actions.clone() {
            still_running(token)?;
            let mut action = attachment.reference.resolve(&self.registry)?.fresh();
            self.run_action_hook(&action, hooks::BOOTING)?;
            action.run(self, &attachment.arguments, attachment.variable.as_deref())?;
        }

        let check = self.expectation.map(Expectation::hook);
        for hook in [Some(hooks::TASK), Some(hooks::AFTER), check].into_iter().flatten() {
            still_running(token)?;
            self.run_callback(hook, &none)?;
        }
        Ok(())
    }

    fn run_action_hook(&mut self, action: &Action, name: &str) -> anyhow::Result<()> {
        let Some(hook) = action.callbacks().get(name) else {
            return Ok(());
        };
        debug!(case = %self.name, action = action.name(), hook = name, "running action callback");
        let context = Arguments::new().with(ACTION_ARGUMENT, action.name());
        self.invoke(&hook, &[&context])?;
        Ok(())
    }

    /// Boot and perform the case, under a deadline when one is configured.
    ///
    /// When the deadline fires, `tearDown` runs against a snapshot of the case
    /// taken before it started, with `exception` describing the timeout. The
    /// worker keeps whatever it already changed but stops before its next
    /// step and never runs `tearDown` itself.
    ///
    /// # Errors
    ///
    /// Returns the first failure, or [`crate::StoryError::Timeout`].
    ///
    /// # Panics
    ///
    /// Re-raises panics from callbacks, such as failed assertions.
    pub fn run(mut self) -> anyhow::Result<()> {
        let Some(limit) = self.timeout.limit() else {
            return self.perform();
        };
        info!(case = %self.name, timeout = ?limit, "running story under a deadline");

        let snapshot = Arc::new(Mutex::new(self.clone()));
        let mut timer = Timer::new(move |token| self.perform_until(token).map(|()| Value::Null))
            .with_timeout(limit)
            .timedout(move |report| {
                let mut case = snapshot.lock().unwrap_or_else(PoisonError::into_inner);
                let exception = report.error.map(ToString::to_string).unwrap_or_default();
                case.run_callback(
                    hooks::TEAR_DOWN,
                    &Arguments::new().with(EXCEPTION_ARGUMENT, exception),
                )?;
                Ok(Value::Null)
            });
        timer.run()?;
        Ok(())
    }
}

fn still_running(token: &CancelToken) -> Result<(), StoryError> {
    if token.is_cancelled() {
        Err(StoryError::Abandoned)
    } else {
        Ok(())
    }
}

/// Names contributed by the resolved scenarios, in boot order.
///
/// Scenarios that do not resolve contribute nothing here; they fail at boot.
fn appended_names(attachments: &[ScenarioAttachment], registry: &Registry) -> Vec<String> {
    let mut resolved: Vec<(Scenario, ())> = attachments
        .iter()
        .filter_map(|attachment| attachment.reference.resolve(registry).ok())
        .map(|found| (found, ()))
        .collect();
    scenario::sort_by_order(&mut resolved);
    resolved
        .iter()
        .filter_map(|(found, ())| found.appended_name())
        .collect()
}
