//! Suite configuration layered from defaults and the environment.
//!
//! Values are read from serialized defaults, then overridden by
//! `STORYBOARD_*` environment variables, e.g. `STORYBOARD_DATASETS=true` or
//! `STORYBOARD_DEFAULT_TIMEOUT_MS=250`.

use crate::error::StoryError;
use crate::timeout::Timeout;
use ortho_config::figment::Figment;
use ortho_config::figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "STORYBOARD_";

/// Settings shared by every story registered through a suite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Register each story tree as one test with a dataset per leaf.
    pub datasets: bool,
    /// Alternative registrar to hand tests to, by name.
    pub test_function: Option<String>,
    /// Limit applied to cases whose ancestors never configure a timeout.
    pub default_timeout_ms: Option<u64>,
}

impl SuiteConfig {
    /// The configuration layers: defaults, then the environment.
    #[must_use]
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load the configuration from the default layers.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Config`] when an override has the wrong type.
    pub fn load() -> Result<Self, StoryError> {
        Self::from_figment(&Self::figment())
    }

    /// Extract the configuration from `figment`.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Config`] when a layer has the wrong type.
    pub fn from_figment(figment: &Figment) -> Result<Self, StoryError> {
        figment
            .extract()
            .map_err(|err| StoryError::Config(Box::new(err)))
    }

    /// The configured fallback timeout.
    #[must_use]
    pub const fn default_timeout(&self) -> Timeout {
        match self.default_timeout_ms {
            Some(millis) => Timeout::Limit(Duration::from_millis(millis)),
            None => Timeout::Inherit,
        }
    }
}
