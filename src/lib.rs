//! Storyboard core library.
//!
//! Builds trees of [`Story`] nodes that inherit scenarios, actions, callbacks
//! and data from their ancestors, and turns every leaf into one runnable
//! [`Case`]. A [`Suite`] owns the [`Registry`] of named components and hands
//! resolved cases to a [`TestRegistrar`].
//!
//! ```
//! use serde_json::json;
//! use storyboard::{Scenario, Story, Suite};
//!
//! let mut suite = Suite::new();
//! suite.scenario(Scenario::new("as_admin").generator(|_| Ok(json!("admin"))));
//! let story = Story::named("create a product")
//!     .scenario("as_admin")
//!     .can()
//!     .task(|call| Ok(json!(format!("{} created", call.arg::<String>("as_admin")?))))
//!     .assert(|call| {
//!         anyhow::ensure!(call.story().get("as_admin") == Some(&json!("admin")));
//!         Ok(json!(null))
//!     });
//! suite.test(&story)?;
//! let outcomes = suite.collector_mut().run_all();
//! assert!(outcomes.iter().all(|outcome| outcome.passed()));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod action;
pub mod callback;
pub mod capability;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod performer;
pub mod reference;
pub mod registrar;
pub mod registry;
pub mod scenario;
pub mod story;
pub mod suite;
pub mod timeout;
pub mod timer;
pub mod walker;

pub use action::{Action, Invokable, Repeat};
pub use callback::{Arguments, Callback, CallbackMap, CallbackResult, Invocation};
pub use config::SuiteConfig;
pub use data::DataBag;
pub use error::{ComponentKind, StoryError};
pub use performer::{Authenticator, NullAuthenticator};
pub use reference::{Component, Reference};
pub use registrar::{CollectingRegistrar, TestOutcome, TestRegistrar, TestStatus};
pub use registry::Registry;
pub use scenario::{AppendName, Scenario};
pub use story::{Case, Expectation, Story};
pub use suite::Suite;
pub use timeout::Timeout;
pub use timer::{Timer, TimerOutcome, TimerSettings, TimerUnit};
