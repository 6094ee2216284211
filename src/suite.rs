//! The suite context that owns the registry and hands stories to registrars.

use crate::action::Action;
use crate::config::SuiteConfig;
use crate::error::{ComponentKind, StoryError};
use crate::performer::{Authenticator, NullAuthenticator};
use crate::registrar::{CollectingRegistrar, DatasetBody, TestRegistrar};
use crate::registry::Registry;
use crate::scenario::Scenario;
use crate::story::{Case, Story};
use crate::walker;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Name of the built-in registrar.
pub const DEFAULT_TEST_FUNCTION: &str = "test";

/// Owns everything shared by the stories of one test run.
pub struct Suite {
    config: SuiteConfig,
    registry: Registry,
    authenticator: Arc<dyn Authenticator>,
    collector: CollectingRegistrar,
    registrars: IndexMap<String, Box<dyn TestRegistrar>>,
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("collector", &self.collector)
            .field("registrars", &self.registrars.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for Suite {
    fn default() -> Self {
        Self::with_config(SuiteConfig::default())
    }
}

impl Suite {
    /// Create a suite with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a suite with `config`.
    #[must_use]
    pub fn with_config(config: SuiteConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
            authenticator: Arc::new(NullAuthenticator),
            collector: CollectingRegistrar::new(),
            registrars: IndexMap::new(),
        }
    }

    /// Create a suite configured from defaults and `STORYBOARD_*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Config`] when an override is malformed.
    pub fn from_env() -> Result<Self, StoryError> {
        SuiteConfig::load().map(Self::with_config)
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// The registry shared with every case.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register `action` by name and hand it back.
    pub fn action(&self, action: Action) -> Action {
        self.registry.remember_action(action)
    }

    /// Register `scenario` by name and hand it back.
    pub fn scenario(&self, scenario: Scenario) -> Scenario {
        self.registry.remember_scenario(scenario)
    }

    /// Log users in through `authenticator`.
    pub fn set_authenticator(&mut self, authenticator: impl Authenticator + 'static) {
        self.authenticator = Arc::new(authenticator);
    }

    /// Make `registrar` selectable under `name`.
    pub fn add_registrar(&mut self, name: impl Into<String>, registrar: impl TestRegistrar + 'static) {
        self.registrars.insert(name.into(), Box::new(registrar));
    }

    /// Select the registrar tests are handed to; `None` restores the default.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::NotFound`] when no registrar is called `name`.
    pub fn set_test_function(&mut self, name: Option<&str>) -> Result<(), StoryError> {
        match name {
            None | Some(DEFAULT_TEST_FUNCTION) => self.config.test_function = None,
            Some(found) if self.registrars.contains_key(found) => {
                self.config.test_function = Some(found.to_owned());
            }
            Some(missing) => {
                return Err(StoryError::not_found(ComponentKind::TestFunction, missing));
            }
        }
        Ok(())
    }

    /// Name of the registrar tests are handed to.
    #[must_use]
    pub fn test_function(&self) -> &str {
        self.config
            .test_function
            .as_deref()
            .unwrap_or(DEFAULT_TEST_FUNCTION)
    }

    /// Register each story tree as one test with a dataset per leaf.
    pub const fn enable_datasets(&mut self) {
        self.config.datasets = true;
    }

    /// Register one test per leaf.
    pub const fn disable_datasets(&mut self) {
        self.config.datasets = false;
    }

    /// Report whether dataset registration is on.
    #[must_use]
    pub const fn datasets_enabled(&self) -> bool {
        self.config.datasets
    }

    /// Resolve the leaves of `story` with the suite's registry, authenticator
    /// and default timeout.
    #[must_use]
    pub fn cases(&self, story: &Story) -> Vec<Case> {
        let fallback = self.config.default_timeout();
        let mut cases = walker::walk(story, &self.registry, &self.authenticator);
        for case in &mut cases {
            case.apply_default_timeout(fallback);
        }
        cases
    }

    /// Register `story` with the selected registrar.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::NotFound`] when the selected registrar is gone,
    /// or a failure from a `registering` hook.
    pub fn test(&mut self, story: &Story) -> anyhow::Result<()> {
        // Fail on a stale registrar name before any hook runs.
        self.active_registrar()?;
        let mut cases = self.cases(story);
        for case in &mut cases {
            case.register()?;
        }

        let datasets = self.config.datasets;
        let registrar = self.active_registrar()?;
        if datasets {
            let name = story.fragment().unwrap_or_default().to_owned();
            let dataset: IndexMap<String, Case> = cases
                .into_iter()
                .map(|case| (case.label().to_owned(), case))
                .collect();
            info!(test = %name, entries = dataset.len(), "registering story dataset");
            let body: DatasetBody = Arc::new(Case::run);
            registrar.register_dataset(&name, dataset, body);
        } else {
            for case in cases {
                let name = case.name().to_owned();
                info!(test = %name, "registering story test");
                registrar.register(&name, Box::new(move || case.run()));
            }
        }
        Ok(())
    }

    fn active_registrar(&mut self) -> Result<&mut (dyn TestRegistrar + 'static), StoryError> {
        match self.config.test_function.as_deref() {
            None | Some(DEFAULT_TEST_FUNCTION) => Ok(&mut self.collector),
            Some(name) => self
                .registrars
                .get_mut(name)
                .map(|registrar| &mut **registrar)
                .ok_or_else(|| StoryError::not_found(ComponentKind::TestFunction, name)),
        }
    }

    /// Borrow the built-in registrar.
    #[must_use]
    pub const fn collector(&self) -> &CollectingRegistrar {
        &self.collector
    }

    /// Mutably borrow the built-in registrar, e.g. to run what it collected.
    pub const fn collector_mut(&mut self) -> &mut CollectingRegistrar {
        &mut self.collector
    }

    /// Forget registered components and collected tests, and restore the
    /// default registrar.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.collector.clear();
        self.config.test_function = None;
    }
}
