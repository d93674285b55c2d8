//! Rule manager configuration.

use std::rc::Rc;
use std::time::Duration;

use csp_styles_core::Executor;

use crate::host::Document;
use crate::keyframes::{DEFAULT_NAME_PREFIX, validate_prefix};
use crate::manager::RuleManager;
use crate::rules::{DEFAULT_MARKER, DEFAULT_MEDIA_TYPE};
use crate::{Error, Result};

/// When a collection pass runs after a rule's count reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionDelay {
    /// At the next microtask checkpoint, after the current synchronous turn.
    #[default]
    Microtask,
    /// After a short timer, which also lets rules survive back-to-back
    /// transitions separated by a frame or two.
    Timer(Duration),
}

/// Configuration for creating a [`RuleManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Title that marks the managed stylesheet.
    pub marker: String,
    /// Media type of the managed stylesheet.
    pub media_type: String,
    /// Prefix of generated rule names. Must start a CSS identifier.
    pub name_prefix: String,
    /// When released rules are collected.
    pub collection: CollectionDelay,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            collection: CollectionDelay::default(),
        }
    }
}

impl ManagerConfig {
    /// Create a configuration with the given marker.
    pub fn with_marker(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            ..Default::default()
        }
    }

    /// Check the configuration for values the manager cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.marker.trim().is_empty() {
            return Err(Error::Config("stylesheet marker is empty".into()));
        }
        if self.media_type.trim().is_empty() {
            return Err(Error::Config("stylesheet media type is empty".into()));
        }
        validate_prefix(&self.name_prefix)
    }
}

/// Builder for creating RuleManagers with custom configuration.
#[derive(Debug, Default)]
pub struct ManagerBuilder {
    config: ManagerConfig,
}

impl ManagerBuilder {
    /// Create a new ManagerBuilder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the managed stylesheet's marker title.
    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.config.marker = marker.into();
        self
    }

    /// Set the managed stylesheet's media type.
    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.config.media_type = media_type.into();
        self
    }

    /// Set the rule name prefix.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.name_prefix = prefix.into();
        self
    }

    /// Collect released rules after `delay`.
    pub fn collect_after(mut self, delay: Duration) -> Self {
        self.config.collection = CollectionDelay::Timer(delay);
        self
    }

    /// Collect released rules at the next microtask checkpoint.
    pub fn collect_on_microtask(mut self) -> Self {
        self.config.collection = CollectionDelay::Microtask;
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Validate the configuration and build the manager.
    pub fn build<D: Document + 'static>(
        self,
        document: D,
        executor: Rc<dyn Executor>,
    ) -> Result<RuleManager<D>> {
        RuleManager::with_config(document, executor, self.config)
    }
}
