//! Capability catalog
//!
//! A declarative table of the library surface a sketch may call. Each entry
//! pairs a call signature (receiver, name, arity range) with a simulation
//! rule. The table is data; swapping catalogs changes what a sketch can do
//! without touching the executor.

use super::builtins::BuiltinOp;
use crate::executor::errors::{ErrorInfo, ErrorKind};
use crate::executor::types::Val;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ARDUINO_CATALOG: &str = include_str!("../../../catalog/arduino.toml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML catalog: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid catalog entry '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Record kinds an `emit` rule can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    PinMode,
    DigitalWrite,
    AnalogWrite,
    Delay,
    DelayMicroseconds,
    Tone,
    NoTone,
    /// Generic library invocation (`Serial.println`, `myServo.write`)
    FunctionCall,
}

/// External quantities a `read` rule can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    AnalogRead,
    DigitalRead,
    Millis,
    Micros,
    PulseIn,
    LibrarySensor,
}

/// What happens when an entry matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    Emit {
        record: RecordKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        returns: Option<Val>,
    },
    Read {
        request: RequestKind,
    },
    Builtin {
        op: BuiltinOp,
    },
    /// Constructor of a library class; positional arguments fill `fields`
    Construct {
        #[serde(default)]
        fields: Vec<String>,
    },
    Halt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Class or static object name; `None` for free functions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    pub name: String,
    #[serde(default)]
    pub min_args: usize,
    /// Defaults to `min_args`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_args: Option<usize>,
    pub rule: Rule,
}

impl CatalogEntry {
    pub fn admits(&self, argc: usize) -> bool {
        argc >= self.min_args && argc <= self.max_args.unwrap_or(self.min_args)
    }

    fn arity_text(&self) -> String {
        match self.max_args {
            Some(max) if max != self.min_args => format!("{}..={}", self.min_args, max),
            _ => self.min_args.to_string(),
        }
    }
}

type EntryKey = (Option<String>, String);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Named constants visible to every sketch (`HIGH`, `A0`, `PI`)
    #[serde(default)]
    pub constants: IndexMap<String, Val>,
    /// Receivers that exist without a declaration (`Serial`)
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default, rename = "function")]
    pub functions: Vec<CatalogEntry>,
    #[serde(skip)]
    index: HashMap<EntryKey, Vec<usize>>,
}

impl Catalog {
    /// The catalog shipped with the crate: Arduino core, Serial, Servo,
    /// CapacitiveSensor and `String`
    pub fn arduino() -> Result<Catalog, CatalogError> {
        Self::from_toml_str(ARDUINO_CATALOG)
    }

    pub fn from_toml_str(source: &str) -> Result<Catalog, CatalogError> {
        let catalog: Catalog = toml::from_str(source)?;
        catalog.indexed()
    }

    pub fn from_json_str(source: &str) -> Result<Catalog, CatalogError> {
        let catalog: Catalog = serde_json::from_str(source)?;
        catalog.indexed()
    }

    /// Load a catalog file; `.json` files are JSON, anything else TOML
    pub fn load(path: &Path) -> Result<Catalog, CatalogError> {
        let source = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_toml_str(&source),
        }
    }

    fn indexed(mut self) -> Result<Catalog, CatalogError> {
        self.index.clear();
        for (i, entry) in self.functions.iter().enumerate() {
            if let Some(max) = entry.max_args {
                if max < entry.min_args {
                    return Err(CatalogError::Invalid {
                        name: entry.name.clone(),
                        reason: format!("max_args {} is below min_args {}", max, entry.min_args),
                    });
                }
            }
            self.index
                .entry((entry.receiver.clone(), entry.name.clone()))
                .or_default()
                .push(i);
        }
        Ok(self)
    }

    /// Find the entry for a call with `argc` arguments
    ///
    /// Entries are tried in file order; the first one whose arity range admits
    /// the call wins.
    pub fn lookup(
        &self,
        receiver: Option<&str>,
        name: &str,
        argc: usize,
    ) -> Result<&CatalogEntry, ErrorInfo> {
        let key = (receiver.map(str::to_string), name.to_string());
        let display = match receiver {
            Some(r) => format!("{r}.{name}"),
            None => name.to_string(),
        };
        let candidates = self
            .index
            .get(&key)
            .ok_or_else(|| ErrorInfo::unknown_call(&display))?;

        candidates
            .iter()
            .map(|&i| &self.functions[i])
            .find(|entry| entry.admits(argc))
            .ok_or_else(|| {
                let expected = candidates
                    .iter()
                    .map(|&i| self.functions[i].arity_text())
                    .collect::<Vec<_>>()
                    .join(" or ");
                ErrorInfo::new(
                    ErrorKind::ArityMismatch,
                    format!("'{display}' expects {expected} argument(s), got {argc}"),
                )
            })
    }

    pub fn constant(&self, name: &str) -> Option<&Val> {
        self.constants.get(name)
    }

    pub fn is_object(&self, name: &str) -> bool {
        self.objects.iter().any(|o| o == name)
    }

    /// A library class is a free function entry with a `construct` rule
    pub fn is_class(&self, name: &str) -> bool {
        self.index
            .get(&(None, name.to_string()))
            .map(|entries| {
                entries
                    .iter()
                    .any(|&i| matches!(self.functions[i].rule, Rule::Construct { .. }))
            })
            .unwrap_or(false)
    }
}
