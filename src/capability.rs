//! Narrow capability traits shared by stories, actions, scenarios and timers.
//!
//! Each concrete type implements the subset it needs; the inheritance
//! helpers below are written against the traits so the same overlay logic
//! serves every node type.

use crate::action::Repeat;
use crate::callback::CallbackMap;
use crate::timeout::Timeout;
use itertools::Itertools;
use std::sync::Arc;

/// Something with an optional display name or name fragment.
pub trait Nameable {
    /// The name, if one has been assigned.
    fn name(&self) -> Option<&str>;

    /// The name, or an empty string when unnamed.
    fn name_string(&self) -> String {
        self.name().unwrap_or_default().to_owned()
    }
}

/// Something that owns a map of named callbacks.
pub trait CallbackHost {
    /// The callback signature stored by this host.
    type Hook: ?Sized;

    /// Borrow the callback map.
    fn callbacks(&self) -> &CallbackMap<Self::Hook>;

    /// Mutably borrow the callback map.
    fn callbacks_mut(&mut self) -> &mut CallbackMap<Self::Hook>;

    /// Store `callback` under `name`, replacing any earlier entry.
    fn set_callback(&mut self, name: &str, callback: Arc<Self::Hook>) {
        self.callbacks_mut().set(name, callback);
    }

    /// Fetch the callback registered under `name`.
    fn callback(&self, name: &str) -> Option<Arc<Self::Hook>> {
        self.callbacks().get(name)
    }

    /// Report whether `name` has a callback.
    fn has_callback(&self, name: &str) -> bool {
        self.callbacks().has(name)
    }
}

/// Something run under a repeat-count policy.
pub trait Repeatable {
    /// Borrow the repeat state.
    fn repeat_policy(&self) -> &Repeat;

    /// Mutably borrow the repeat state.
    fn repeat_policy_mut(&mut self) -> &mut Repeat;

    /// Report whether another iteration should run.
    fn repeats(&self) -> bool {
        self.repeat_policy().should_run()
    }

    /// Count the iteration that is about to run.
    fn repeats_increment(&mut self) {
        self.repeat_policy_mut().increment();
    }

    /// Number of iterations started so far.
    fn times_run(&self) -> u32 {
        self.repeat_policy().times_run()
    }
}

/// Something carrying an explicit, implicit, or disabled timeout.
pub trait TimeoutBound {
    /// The timeout as configured on this node alone.
    fn timeout_setting(&self) -> Timeout;
}

/// Overlay the callback maps of `chain` (root first) so nearer nodes win.
pub fn inherit_callbacks<H: CallbackHost>(chain: &[&H]) -> CallbackMap<H::Hook> {
    CallbackMap::inherit(chain.iter().map(|host| host.callbacks()))
}

/// Join the non-empty names of `chain` (root first) with spaces.
pub fn inherit_name<N: Nameable>(chain: &[&N]) -> String {
    chain
        .iter()
        .filter_map(|node| node.name())
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .join(" ")
}

/// Resolve the timeout for `chain` (root first).
///
/// Nodes are visited nearest first; the first one that explicitly set a
/// limit or explicitly disabled the timeout decides. Untouched nodes are
/// skipped.
pub fn inherit_timeout<T: TimeoutBound>(chain: &[&T]) -> Timeout {
    chain
        .iter()
        .rev()
        .map(|node| node.timeout_setting())
        .find(Timeout::is_explicit)
        .unwrap_or_default()
}
