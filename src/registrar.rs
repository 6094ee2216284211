//! Hand-off between resolved cases and whatever runs tests.
//!
//! The host test runner is abstracted as a [`TestRegistrar`]. The built-in
//! [`CollectingRegistrar`] stores bodies and runs them on demand, which is how
//! a plain `#[test]` function drives a whole story tree.

use crate::story::Case;
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// One registered test body.
pub type TestBody = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Body shared by every entry of a dataset.
pub type DatasetBody = Arc<dyn Fn(Case) -> anyhow::Result<()> + Send + Sync>;

/// Accepts tests produced from story trees.
pub trait TestRegistrar: Send {
    /// Register a single test called `name`.
    fn register(&mut self, name: &str, body: TestBody);

    /// Register `name` once per dataset entry.
    ///
    /// The default expands the dataset into one test per label.
    fn register_dataset(&mut self, name: &str, dataset: IndexMap<String, Case>, body: DatasetBody) {
        for (label, case) in dataset {
            let run = Arc::clone(&body);
            self.register(
                &dataset_test_name(name, &label),
                Box::new(move || run(case)),
            );
        }
    }
}

/// Name given to one expanded dataset entry.
#[must_use]
pub fn dataset_test_name(name: &str, label: &str) -> String {
    format!("{name} with dataset \"{label}\"")
}

/// How a collected test ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestStatus {
    /// The body returned `Ok`.
    Passed,
    /// The body returned an error, rendered with its causes.
    Failed(String),
    /// The body panicked with the given message.
    Panicked(String),
}

/// Result of running one collected test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    /// The registered test name.
    pub name: String,
    /// How it ended.
    pub status: TestStatus,
}

impl TestOutcome {
    /// Report whether the test passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self.status, TestStatus::Passed)
    }
}

/// Stores registered tests so they can be listed and run later.
#[derive(Default)]
pub struct CollectingRegistrar {
    tests: Vec<(String, TestBody)>,
    datasets: IndexMap<String, Vec<String>>,
}

impl fmt::Debug for CollectingRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectingRegistrar")
            .field("tests", &self.names())
            .field("datasets", &self.datasets)
            .finish()
    }
}

impl CollectingRegistrar {
    /// Create an empty registrar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the collected tests in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tests.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Dataset labels registered under the test `name`.
    #[must_use]
    pub fn dataset(&self, name: &str) -> Option<&[String]> {
        self.datasets.get(name).map(Vec::as_slice)
    }

    /// Number of collected tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Report whether nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Drop every collected test.
    pub fn clear(&mut self) {
        self.tests.clear();
        self.datasets.clear();
    }

    /// Run and drain every collected test in registration order.
    ///
    /// Panicking bodies are caught and reported, so one failure does not
    /// stop the rest.
    pub fn run_all(&mut self) -> Vec<TestOutcome> {
        self.tests
            .drain(..)
            .map(|(name, body)| {
                debug!(test = %name, "running collected test");
                let status = match panic::catch_unwind(AssertUnwindSafe(body)) {
                    Ok(Ok(())) => TestStatus::Passed,
                    Ok(Err(err)) => TestStatus::Failed(format!("{err:#}")),
                    Err(payload) => TestStatus::Panicked(panic_text(payload.as_ref())),
                };
                if !matches!(status, TestStatus::Passed) {
                    warn!(test = %name, ?status, "collected test failed");
                }
                TestOutcome { name, status }
            })
            .collect()
    }
}

impl TestRegistrar for CollectingRegistrar {
    fn register(&mut self, name: &str, body: TestBody) {
        self.tests.push((name.to_owned(), body));
    }

    fn register_dataset(&mut self, name: &str, dataset: IndexMap<String, Case>, body: DatasetBody) {
        self.datasets
            .insert(name.to_owned(), dataset.keys().cloned().collect());
        for (label, case) in dataset {
            let run = Arc::clone(&body);
            self.register(
                &dataset_test_name(name, &label),
                Box::new(move || run(case)),
            );
        }
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_default()
}
