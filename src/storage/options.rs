use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::primitives::store::MemStoreOptions;
use crate::types::{Result, SessionError};

use super::metrics::AttributeMetrics;

/// Default number of cascade worker threads.
pub const DEFAULT_CASCADE_WORKERS: usize = 4;
/// Default prefix for cascade worker thread names.
pub const DEFAULT_CASCADE_THREAD_NAME: &str = "session-cascade";

/// Runtime options supplied when opening a session attributes factory.
#[derive(Clone)]
pub struct FactoryOptions {
    /// Worker threads used for cascading attribute evictions.
    pub cascade_workers: usize,
    /// Thread name prefix for cascade workers.
    pub cascade_thread_name: String,
    /// Optional metrics collection implementation.
    pub metrics: Option<Arc<dyn AttributeMetrics>>,
}

impl Default for FactoryOptions {
    fn default() -> Self {
        Self {
            cascade_workers: DEFAULT_CASCADE_WORKERS,
            cascade_thread_name: DEFAULT_CASCADE_THREAD_NAME.to_owned(),
            metrics: None,
        }
    }
}

impl FactoryOptions {
    /// Sets the cascade worker count.
    pub fn cascade_workers(mut self, workers: usize) -> Self {
        self.cascade_workers = workers;
        self
    }

    /// Sets the cascade worker thread name prefix.
    pub fn cascade_thread_name(mut self, name: impl Into<String>) -> Self {
        self.cascade_thread_name = name.into();
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn AttributeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.cascade_workers == 0 {
            return Err(SessionError::Config(
                "cascade_workers must be at least 1".into(),
            ));
        }
        if self.cascade_thread_name.is_empty() {
            return Err(SessionError::Config(
                "cascade_thread_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// `[factory]` section of a configuration file.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FactorySection {
    /// Worker threads used for cascading attribute evictions.
    pub cascade_workers: usize,
    /// Thread name prefix for cascade workers.
    pub cascade_thread_name: String,
}

impl Default for FactorySection {
    fn default() -> Self {
        Self {
            cascade_workers: DEFAULT_CASCADE_WORKERS,
            cascade_thread_name: DEFAULT_CASCADE_THREAD_NAME.to_owned(),
        }
    }
}

impl FactorySection {
    /// Converts the section into runtime options.
    pub fn to_options(&self) -> FactoryOptions {
        FactoryOptions::default()
            .cascade_workers(self.cascade_workers)
            .cascade_thread_name(self.cascade_thread_name.clone())
    }
}

/// `[stores.*]` sections of a configuration file.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSections {
    /// Session metadata store.
    pub metadata: MemStoreOptions,
    /// Names index store.
    pub names: MemStoreOptions,
    /// Attribute store.
    pub attributes: MemStoreOptions,
}

/// Configuration file contents.
///
/// ```toml
/// [factory]
/// cascade_workers = 2
///
/// [stores.attributes]
/// capacity = 1024
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Factory options.
    pub factory: FactorySection,
    /// Store options.
    pub stores: StoreSections,
}

impl Config {
    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|err| SessionError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| SessionError::Config(err.to_string()))
    }

    /// Checks every section.
    pub fn validate(&self) -> Result<()> {
        self.factory.to_options().validate()?;
        self.stores.metadata.validate()?;
        self.stores.names.validate()?;
        self.stores.attributes.validate()
    }
}
