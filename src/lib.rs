//! SketchVM core: executes parsed Arduino sketch trees and records every
//! hardware effect as a command log.

pub mod cli;
pub mod config;
pub mod engine;
pub mod executor;
pub mod gateway;
pub mod host;
pub mod types;

// Re-export main types
pub use config::{Config, ConfigBuilder, ConfigError};
pub use engine::{run, Engine, EngineError};
pub use executor::{Catalog, CatalogError, Command, CommandRecord, ErrorInfo, ErrorKind, Program, Val};
pub use gateway::{
    DataSource, DataSourceError, DeterministicSource, IoContract, IoRequest, PendingRequest, ScriptedSource,
};
pub use types::{ExecutionResult, ExecutionState, RunStatus, Termination};
