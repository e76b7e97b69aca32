//! # Sketch Executor - Resumable Stack-Driven Interpreter
//!
//! Runs an Arduino sketch tree (`setup()`, `loop()`, globals, helper
//! functions) and records every hardware effect as a [`Command`].
//!
//! ## Core Principles
//!
//! 1. **Stack-driven execution**: All state in `frames: Vec<Frame>`, no recursion
//! 2. **Expressions are frames too**: An I/O read nested anywhere suspends cleanly
//! 3. **Centralized control flow**: `Control` enum manages break/continue/return/throw
//! 4. **Pure executor**: No clock, no async - just runs until suspend or complete
//!
//! The engine in [`crate::engine`] decides how suspended reads get answered.

pub mod calls;
pub mod errors;
pub mod exec_loop;
pub mod expressions;
pub mod lifecycle;
pub mod outbox;
pub mod scope;
pub mod statements;
pub mod stdlib;
pub mod types;
pub mod values;
pub mod vm;

#[cfg(test)]
pub(crate) mod tests;

// Re-export commonly used items
pub use errors::{ErrorInfo, ErrorKind};
pub use exec_loop::{run_until_blocked, step};
pub use outbox::{Command, CommandRecord, EndReason, Outbox};
pub use scope::{Binding, ScopeKind, ScopeStack};
pub use stdlib::{Catalog, CatalogError};
pub use types::{Control, Expr, IntKind, Program, Stmt, Val, ValueType};
pub use vm::{Limits, ProgramIndex, Step, VM};
