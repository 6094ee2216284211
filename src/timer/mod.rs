//! Single-use, deadline-bounded execution of one task.
//!
//! [`Timer::run`] executes its task on a worker thread and races it against
//! the configured deadline. When the deadline wins, the worker's
//! [`CancelToken`] is tripped and the worker is abandoned: its late result is
//! discarded and any side effects it already applied are left in place.
//! Code that blocks in the kernel cannot be interrupted from outside, so the
//! token is the only signal such a worker receives; cooperative tasks should
//! poll it.
//!
//! Whatever the outcome, the typed hooks run in order: exactly one of
//! `finished`, `timedout` or `errored`, then `after`.
//!
//! [`Timer::start`], [`Timer::end`] and [`Timer::check`] measure a span that
//! ran on the caller's thread instead. They route the outcome through the same
//! hooks without preempting anything.

mod unit;

pub use unit::TimerUnit;

use crate::callback::{CallbackMap, CallbackResult, hooks};
use crate::capability::{CallbackHost, TimeoutBound};
use crate::error::{self, StoryError};
use crate::timeout::Timeout;
use anyhow::anyhow;
use serde_json::Value;
use std::any::Any;
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Signature of a timer hook.
pub type TimerFn = dyn Fn(&TimerReport<'_>) -> CallbackResult + Send + Sync;

/// Shared handle to a timer hook.
pub type TimerCallback = Arc<TimerFn>;

/// The unit of work bounded by a [`Timer`].
pub type Task = Box<dyn FnOnce(&CancelToken) -> CallbackResult + Send>;

/// Terminal state of a timer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// The task completed inside the deadline.
    Passed,
    /// The deadline expired first.
    TimedOut,
    /// The task failed or panicked.
    Errored,
}

/// Context handed to every timer hook.
#[derive(Debug)]
pub struct TimerReport<'a> {
    /// How the run ended.
    pub outcome: TimerOutcome,
    /// The captured error, for timed-out and errored runs.
    pub error: Option<&'a anyhow::Error>,
    /// The configured limit.
    pub timeout: Duration,
    /// Elapsed time between start and end.
    pub taken: Option<Duration>,
    /// Signed microseconds left when the task ended.
    pub remaining: Option<i64>,
}

/// Cancellation flag shared with a timed worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Report whether the deadline has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Reusable timer configuration carried by actions.
#[derive(Clone, Debug)]
pub struct TimerSettings {
    timeout: Timeout,
    rethrow: bool,
    callbacks: CallbackMap<TimerFn>,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            timeout: Timeout::Inherit,
            rethrow: true,
            callbacks: CallbackMap::new(),
        }
    }
}

impl TimerSettings {
    /// Limit runs to `amount` of `unit`.
    #[must_use]
    pub const fn timeout(mut self, amount: u64, unit: TimerUnit) -> Self {
        self.timeout = Timeout::of(amount, unit);
        self
    }

    /// Explicitly disable the limit.
    #[must_use]
    pub const fn no_timeout(mut self) -> Self {
        self.timeout = Timeout::Disabled;
        self
    }

    /// Keep captured errors to the hooks instead of returning them.
    #[must_use]
    pub const fn dont_rethrow(mut self) -> Self {
        self.rethrow = false;
        self
    }

    /// Register the `timedout` hook.
    #[must_use]
    pub fn timedout<F>(self, f: F) -> Self
    where
        F: Fn(&TimerReport<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::TIMEDOUT, f)
    }

    /// Register the `errored` hook.
    #[must_use]
    pub fn errored<F>(self, f: F) -> Self
    where
        F: Fn(&TimerReport<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::ERRORED, f)
    }

    /// Register the `finished` hook.
    #[must_use]
    pub fn finished<F>(self, f: F) -> Self
    where
        F: Fn(&TimerReport<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::FINISHED, f)
    }

    /// Register the `after` hook.
    #[must_use]
    pub fn after<F>(self, f: F) -> Self
    where
        F: Fn(&TimerReport<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.hook(hooks::AFTER, f)
    }

    fn hook<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&TimerReport<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.callbacks.set(name, Arc::new(f));
        self
    }

    /// Build a measuring timer when a limit is configured.
    #[must_use]
    pub fn measure(&self) -> Option<Timer> {
        self.timeout.limit().map(|limit| Timer {
            callbacks: self.callbacks.clone(),
            rethrow: self.rethrow,
            ..Timer::measuring(limit)
        })
    }
}

impl TimeoutBound for TimerSettings {
    fn timeout_setting(&self) -> Timeout {
        self.timeout
    }
}

enum Settled {
    Completed(CallbackResult),
    TimedOut,
    Panicked(Box<dyn Any + Send>),
}

/// Wraps one task with a deadline and outcome hooks.
pub struct Timer {
    task: Option<Task>,
    callbacks: CallbackMap<TimerFn>,
    timeout: Duration,
    rethrow: bool,
    ran: bool,
    started: Option<Instant>,
    ended: Option<Instant>,
    taken: Option<Duration>,
    remaining: Option<i64>,
    exception: Option<anyhow::Error>,
    outcome: Option<TimerOutcome>,
    value: Option<Value>,
}

impl Timer {
    /// Wrap `task` with the default 60 second deadline.
    pub fn new<F>(task: F) -> Self
    where
        F: FnOnce(&CancelToken) -> CallbackResult + Send + 'static,
    {
        Self {
            task: Some(Box::new(task)),
            ..Self::measuring(DEFAULT_TIMEOUT)
        }
    }

    /// Create a task-less timer for [`Timer::start`]/[`Timer::end`]/[`Timer::check`].
    #[must_use]
    pub fn measuring(timeout: Duration) -> Self {
        Self {
            task: None,
            callbacks: CallbackMap::new(),
            timeout,
            rethrow: true,
            ran: false,
            started: None,
            ended: None,
            taken: None,
            remaining: None,
            exception: None,
            outcome: None,
            value: None,
        }
    }

    /// Set the deadline to `amount` of `unit`.
    #[must_use]
    pub const fn timeout(mut self, amount: u64, unit: TimerUnit) -> Self {
        self.timeout = unit.to_duration(amount);
        self
    }

    /// Set the deadline directly.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Return captured errors to the caller (the default).
    #[must_use]
    pub const fn rethrow(mut self) -> Self {
        self.rethrow = true;
        self
    }

    /// Keep captured errors to the hooks.
    #[must_use]
    pub const fn dont_rethrow(mut self) -> Self {
        self.rethrow = false;
        self
    }

    /// Register the `timedout` hook.
    #[must_use]
    pub fn timedout<F>(mut self, f: F) -> Self
    where
        F: Fn(&TimerReport<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.set_callback(hooks::TIMEDOUT, Arc::new(f));
        self
    }

    /// Register the `finished` hook; its return value becomes the run's response.
    #[must_use]
    pub fn finished<F>(mut self, f: F) -> Self
    where
        F: Fn(&TimerReport<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.set_callback(hooks::FINISHED, Arc::new(f));
        self
    }

    /// Register the `errored` hook.
    #[must_use]
    pub fn errored<F>(mut self, f: F) -> Self
    where
        F: Fn(&TimerReport<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.set_callback(hooks::ERRORED, Arc::new(f));
        self
    }

    /// Register the `after` hook, run for every outcome.
    #[must_use]
    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&TimerReport<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.set_callback(hooks::AFTER, Arc::new(f));
        self
    }

    /// Run the task against the deadline.
    ///
    /// Only the first call does anything; later calls return `Ok(None)`.
    /// On success the `finished` hook's value is returned.
    ///
    /// # Errors
    ///
    /// With rethrow enabled, returns [`StoryError::Timeout`] when the deadline
    /// fired and the task's own error when it failed. A `timedout` hook that
    /// itself returns the timeout forces the timeout to be returned even with
    /// rethrow disabled. Errors raised by hooks are returned as-is.
    ///
    /// # Panics
    ///
    /// Resumes the worker's panic after the hooks run when rethrow is
    /// enabled, so assertion failures inside the task surface unchanged.
    pub fn run(&mut self) -> anyhow::Result<Option<Value>> {
        if self.ran {
            debug!("timer already ran; ignoring repeat run");
            return Ok(None);
        }
        self.ran = true;
        let Some(task) = self.task.take() else {
            return Ok(None);
        };

        let token = CancelToken::default();
        let worker_token = token.clone();
        let (sender, receiver) = mpsc::channel();
        self.start();
        let handle = thread::Builder::new()
            .name("storyboard-timer".to_owned())
            .spawn(move || {
                // The receiver is gone once the deadline fired; a late result
                // is dropped.
                drop(sender.send(task(&worker_token)));
            })
            .map_err(|source| StoryError::Spawn { source })?;

        let settled = match receiver.recv_timeout(self.timeout) {
            Ok(result) => {
                self.end();
                drop(handle.join());
                Settled::Completed(result)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.end();
                token.cancel();
                warn!(timeout = ?self.timeout, "timed task exceeded its deadline; abandoning worker");
                Settled::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.end();
                match handle.join() {
                    Err(payload) => Settled::Panicked(payload),
                    Ok(()) => Settled::Completed(Err(anyhow!(
                        "timed task exited without reporting a result"
                    ))),
                }
            }
        };
        self.settle(settled)
    }

    /// Record the start of a measured span.
    pub fn start(&mut self) -> &mut Self {
        self.started = Some(Instant::now());
        self.ended = None;
        self
    }

    /// Record the end of a measured span and compute the timings.
    pub fn end(&mut self) -> &mut Self {
        let now = Instant::now();
        self.ended = Some(now);
        if let Some(started) = self.started {
            let taken = now.saturating_duration_since(started);
            self.taken = Some(taken);
            self.remaining = Some(micros(self.timeout).saturating_sub(micros(taken)));
        }
        self
    }

    /// Evaluate a measured span whose work produced `outcome`.
    ///
    /// An `Err` outcome routes through `errored`; a span that overran the
    /// deadline routes through `timedout`. Like [`Timer::run`], this only
    /// acts once.
    ///
    /// # Errors
    ///
    /// Follows the same rethrow rules as [`Timer::run`].
    pub fn check(&mut self, outcome: CallbackResult) -> anyhow::Result<Option<Value>> {
        if self.ran {
            debug!("timer already evaluated; ignoring repeat check");
            return Ok(None);
        }
        self.ran = true;
        if self.ended.is_none() {
            self.end();
        }
        self.settle(Settled::Completed(outcome))
    }

    fn settle(&mut self, settled: Settled) -> anyhow::Result<Option<Value>> {
        let mut force_rethrow = false;
        let mut panic_payload = None;
        let (response, hook_error) = match settled {
            Settled::Completed(Ok(value)) if self.remaining.is_some_and(|left| left < 0) => {
                self.value = Some(value);
                self.expire(&mut force_rethrow)
            }
            Settled::Completed(Ok(value)) => {
                self.value = Some(value);
                self.outcome = Some(TimerOutcome::Passed);
                match self.dispatch(hooks::FINISHED) {
                    Ok(response) => (response, None),
                    // A failing `finished` hook fails the run.
                    Err(err) => self.fail(err),
                }
            }
            Settled::Completed(Err(err)) => self.fail(err),
            Settled::TimedOut => self.expire(&mut force_rethrow),
            Settled::Panicked(payload) => {
                let message = panic_message(payload.as_ref());
                panic_payload = Some(payload);
                self.fail(StoryError::WorkerPanicked { message }.into())
            }
        };

        let after = self.dispatch(hooks::AFTER);
        if let Some(err) = hook_error {
            return Err(err);
        }
        after?;

        if !(self.rethrow || force_rethrow) {
            return Ok(response);
        }
        if let Some(payload) = panic_payload {
            panic::resume_unwind(payload);
        }
        match self.outcome {
            Some(TimerOutcome::TimedOut) => Err(self.timeout_error().into()),
            Some(TimerOutcome::Errored) => self.exception.take().map_or(Ok(response), Err),
            Some(TimerOutcome::Passed) | None => Ok(response),
        }
    }

    /// Run `timedout`; returns `true` when the hook re-raised the timeout.
    fn timed_out(&mut self) -> anyhow::Result<bool> {
        self.outcome = Some(TimerOutcome::TimedOut);
        self.exception = Some(self.timeout_error().into());
        match self.dispatch(hooks::TIMEDOUT) {
            Ok(_) => Ok(false),
            Err(err) if error::is_timeout(&err) => Ok(true),
            Err(err) => Err(err),
        }
    }

    fn expire(&mut self, force_rethrow: &mut bool) -> (Option<Value>, Option<anyhow::Error>) {
        match self.timed_out() {
            Ok(forced) => {
                *force_rethrow = forced;
                (None, None)
            }
            Err(err) => (None, Some(err)),
        }
    }

    /// Record `err` and run `errored`, keeping any hook failure for later.
    fn fail(&mut self, err: anyhow::Error) -> (Option<Value>, Option<anyhow::Error>) {
        self.outcome = Some(TimerOutcome::Errored);
        self.exception = Some(err);
        match self.dispatch(hooks::ERRORED) {
            Ok(response) => (response, None),
            Err(hook_err) => (None, Some(hook_err)),
        }
    }

    fn dispatch(&self, name: &str) -> anyhow::Result<Option<Value>> {
        let Some(hook) = self.callbacks.get(name) else {
            return Ok(None);
        };
        debug!(hook = name, "running timer callback");
        hook(&self.report()).map(Some)
    }

    fn report(&self) -> TimerReport<'_> {
        TimerReport {
            outcome: self.outcome.unwrap_or(TimerOutcome::Passed),
            error: self.exception.as_ref(),
            timeout: self.timeout,
            taken: self.taken,
            remaining: self.remaining,
        }
    }

    fn timeout_error(&self) -> StoryError {
        StoryError::Timeout {
            timeout: self.timeout,
            taken: self.taken.unwrap_or_default(),
        }
    }

    /// The configured deadline.
    #[must_use]
    pub const fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    /// The configured deadline in microseconds.
    #[must_use]
    pub fn timeout_micros(&self) -> i64 {
        micros(self.timeout)
    }

    /// When the run started.
    #[must_use]
    pub const fn started_at(&self) -> Option<Instant> {
        self.started
    }

    /// When the run ended.
    #[must_use]
    pub const fn ended_at(&self) -> Option<Instant> {
        self.ended
    }

    /// Time the task took.
    #[must_use]
    pub const fn time_taken(&self) -> Option<Duration> {
        self.taken
    }

    /// Microseconds left on the deadline when the task ended; negative when
    /// the task overran.
    #[must_use]
    pub const fn time_remaining(&self) -> Option<i64> {
        self.remaining
    }

    /// The error captured during the run, unless it was handed to the caller.
    #[must_use]
    pub const fn exception(&self) -> Option<&anyhow::Error> {
        self.exception.as_ref()
    }

    /// How the run ended.
    #[must_use]
    pub const fn outcome(&self) -> Option<TimerOutcome> {
        self.outcome
    }

    /// The task's own return value, when it completed.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Report whether the timer has already run or been checked.
    #[must_use]
    pub const fn has_run(&self) -> bool {
        self.ran
    }
}

impl CallbackHost for Timer {
    type Hook = TimerFn;

    fn callbacks(&self) -> &CallbackMap<TimerFn> {
        &self.callbacks
    }

    fn callbacks_mut(&mut self) -> &mut CallbackMap<TimerFn> {
        &mut self.callbacks
    }
}

fn micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

#[cfg(test)]
mod tests;
