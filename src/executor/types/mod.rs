//! Type definitions for the executor
//!
//! This module contains all the core types used by the executor:
//! - AST nodes (Program, Stmt, Expr)
//! - Runtime values (Val, ValueType)
//! - Control flow (Control, Frame, FrameKind)
//! - Execution phases for each frame kind

pub mod ast;
pub mod control;
pub mod phase;
pub mod values;

// Re-export all types for convenient access
pub use ast::*;
pub use control::{Control, Frame, FrameKind, Node};
pub use phase::*;
pub use values::{IntKind, StructVal, Val, ValueType};
