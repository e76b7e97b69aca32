//! Runtime error kinds
//!
//! Every fault the engine can raise while executing a sketch. A fault stops
//! execution and is reported as exactly one `ERROR` record.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Name declared twice in the same scope frame
    #[serde(rename = "RedeclarationError")]
    Redeclaration,
    /// Read or write of a name no visible frame declares
    #[serde(rename = "UndeclaredVariableError")]
    UndeclaredVariable,
    /// Operation applied to a value of the wrong type
    #[serde(rename = "TypeMismatchError")]
    TypeMismatch,
    /// Call that is neither user-defined nor in the catalog
    #[serde(rename = "UnknownCallError")]
    UnknownCall,
    /// Missing data source, response timeout, bad request ordering
    #[serde(rename = "ConfigurationError")]
    Configuration,
    #[serde(rename = "LoopBoundExceededError")]
    LoopBoundExceeded,
    /// Call depth, command count or step budget exhausted
    #[serde(rename = "ResourceExhaustionError")]
    ResourceExhaustion,
    #[serde(rename = "ArityMismatchError")]
    ArityMismatch,
    #[serde(rename = "IndexOutOfRangeError")]
    IndexOutOfRange,
    #[serde(rename = "DivisionByZeroError")]
    DivisionByZero,
    /// `break`/`continue` outside a loop or switch
    #[serde(rename = "InvalidControlFlowError")]
    InvalidControlFlow,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Redeclaration => "RedeclarationError",
            ErrorKind::UndeclaredVariable => "UndeclaredVariableError",
            ErrorKind::TypeMismatch => "TypeMismatchError",
            ErrorKind::UnknownCall => "UnknownCallError",
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::LoopBoundExceeded => "LoopBoundExceededError",
            ErrorKind::ResourceExhaustion => "ResourceExhaustionError",
            ErrorKind::ArityMismatch => "ArityMismatchError",
            ErrorKind::IndexOutOfRange => "IndexOutOfRangeError",
            ErrorKind::DivisionByZero => "DivisionByZeroError",
            ErrorKind::InvalidControlFlow => "InvalidControlFlowError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload carried by `Control::Throw` and the final `ERROR` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    /// 1-based source line of the innermost statement, when the tree has spans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    pub fn redeclaration(name: &str) -> Self {
        Self::new(
            ErrorKind::Redeclaration,
            format!("'{name}' is already declared in this scope"),
        )
    }

    pub fn undeclared(name: &str) -> Self {
        Self::new(
            ErrorKind::UndeclaredVariable,
            format!("'{name}' was not declared in this scope"),
        )
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    pub fn unknown_call(name: &str) -> Self {
        Self::new(ErrorKind::UnknownCall, format!("no function named '{name}'"))
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn arity(name: &str, expected: impl fmt::Display, got: usize) -> Self {
        Self::new(
            ErrorKind::ArityMismatch,
            format!("'{name}' expects {expected} argument(s), got {got}"),
        )
    }
}
