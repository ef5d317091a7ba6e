//! ConfigLoader: assembles the configuration layers and deserializes them.

use super::merge::merge_policy;
use super::sources::{explicit_file, global_file};
use super::AskpipeConfig;
use crate::error::ApiError;
use config::Environment;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_PREFIX: &str = "ASKPIPE";
const ENV_SEPARATOR: &str = "__";

/// Loads [`AskpipeConfig`] from defaults, files and the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    skip_global: bool,
    env: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer an explicit config file over the global one.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Ignore the user's global config file.
    pub fn without_global(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Read overrides from `vars` instead of the process environment.
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    /// Build the layered configuration. The result is not validated.
    pub fn load(&self) -> Result<AskpipeConfig, ApiError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        if !self.skip_global {
            builder = global_file::add_to_builder(builder)?;
        }
        if let Some(path) = self.file.as_deref() {
            debug!(config_path = %path.display(), "loading configuration file");
            builder = explicit_file::add_to_builder(builder, path)?;
        }
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .source(self.env.clone());
        let config = builder.add_source(environment).build()?;
        Ok(config.try_deserialize::<AskpipeConfig>()?)
    }

    /// Load the global file, `path` when given, and the environment.
    pub fn load_from(path: Option<&Path>) -> Result<AskpipeConfig, ApiError> {
        let loader = match path {
            Some(path) => Self::new().with_file(path),
            None => Self::new(),
        };
        loader.load()
    }
}
