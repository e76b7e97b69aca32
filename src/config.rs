//! Engine configuration
//!
//! Layered, lowest precedence first: built-in defaults, a TOML file,
//! `SKETCHVM_*` environment variables, explicit builder overrides.

use crate::executor::stdlib::{Catalog, CatalogError};
use crate::executor::vm::Limits;
use crate::gateway::IoContract;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SKETCHVM";
const CONFIG_PATH_ENV: &str = "SKETCHVM_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "sketchvm.toml";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_loop_iterations must be greater than 0")]
    ZeroLoopIterations,

    #[error("max_call_depth must be greater than 0")]
    ZeroCallDepth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many times `loop()` runs before the run ends
    pub max_loop_iterations: u32,

    pub io_contract: IoContract,

    /// Suspend-resume only: how long a pending request may wait
    pub response_timeout_ms: u64,

    pub max_call_depth: usize,

    pub max_commands: usize,

    /// Step budget; a sketch stuck in an inner `while (true)` fails
    /// with a resource error instead of spinning forever
    pub max_steps: u64,

    /// External capability catalog (TOML or JSON); the bundled Arduino
    /// catalog when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_loop_iterations: limits.max_loop_iterations,
            io_contract: IoContract::Blocking,
            response_timeout_ms: 5000,
            max_call_depth: limits.max_call_depth,
            max_commands: limits.max_commands,
            max_steps: limits.max_steps,
            catalog_path: None,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default file and environment
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// Parse a TOML document; unset fields keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_loop_iterations == 0 {
            return Err(ConfigError::ZeroLoopIterations);
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::ZeroCallDepth);
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_loop_iterations: self.max_loop_iterations,
            max_call_depth: self.max_call_depth,
            max_commands: self.max_commands,
            max_steps: self.max_steps,
        }
    }

    /// The catalog this configuration names
    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => Catalog::load(path),
            None => Catalog::arduino(),
        }
    }
}

/* ===================== Builder ===================== */

#[derive(Debug, Default, Clone)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    max_loop_iterations: Option<u32>,
    io_contract: Option<IoContract>,
    response_timeout_ms: Option<u64>,
    catalog_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Explicit config file; unlike the default file it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn max_loop_iterations(mut self, n: Option<u32>) -> Self {
        self.max_loop_iterations = n;
        self
    }

    pub fn io_contract(mut self, contract: Option<IoContract>) -> Self {
        self.io_contract = contract;
        self
    }

    pub fn response_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.response_timeout_ms = ms;
        self
    }

    pub fn catalog_path(mut self, path: Option<PathBuf>) -> Self {
        self.catalog_path = path;
        self
    }

    pub fn build(self) -> Result<Config> {
        dotenvy::dotenv().ok();

        let (file, required) = match self.config_path.clone() {
            Some(path) => (path, true),
            None => match std::env::var(CONFIG_PATH_ENV) {
                Ok(path) => (PathBuf::from(path), true),
                Err(_) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
            },
        };

        let layered = config::Config::builder()
            .add_source(
                config::Config::try_from(&Config::default())
                    .context("Failed to encode default configuration")?,
            )
            .add_source(file_source(&file, required))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("Failed to load configuration from {}", file.display()))?;

        let mut config: Config = layered
            .try_deserialize()
            .context("Invalid configuration")?;

        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Overrides on top of `base`, skipping files and environment
    pub fn build_from(self, mut base: Config) -> Result<Config, ConfigError> {
        self.apply(&mut base);
        base.validate()?;
        Ok(base)
    }

    fn apply(self, config: &mut Config) {
        if let Some(n) = self.max_loop_iterations {
            config.max_loop_iterations = n;
        }
        if let Some(contract) = self.io_contract {
            config.io_contract = contract;
        }
        if let Some(ms) = self.response_timeout_ms {
            config.response_timeout_ms = ms;
        }
        if let Some(path) = self.catalog_path {
            config.catalog_path = Some(path);
        }
    }
}

fn file_source(path: &Path, required: bool) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path)
        .format(config::FileFormat::Toml)
        .required(required)
}
