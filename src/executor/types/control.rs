//! Control flow and execution frame types

use super::ast::{Expr, Stmt};
use super::phase::{
    BlockPhase, CallPhase, ExprPhase, IfPhase, LoopPhase, ProgramPhase, SwitchPhase,
};
use super::values::Val;
use crate::executor::errors::ErrorInfo;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/* ===================== Control Flow ===================== */

/// Control flow state
///
/// When control != None, the VM unwinds the stack to find the appropriate handler.
/// For Suspend, the VM stops with all frames intact until a value is supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Control {
    None,
    Break,
    Continue,
    Return(Val),
    Throw(ErrorInfo),
    /// Waiting on the external request with this id
    Suspend(String),
    /// `exit()` was called
    Halt,
}

/* ===================== Frames ===================== */

/// Frame kind - the type and state of the construct being executed
#[derive(Debug, Clone)]
pub enum FrameKind {
    Program { phase: ProgramPhase },
    Call { phase: CallPhase, function: String, args: Vec<Val> },
    Block { phase: BlockPhase, idx: usize },
    VarDecl { idx: usize, operands: Vec<Val> },
    If { phase: IfPhase },
    While { phase: LoopPhase },
    DoWhile { phase: LoopPhase },
    For { phase: LoopPhase },
    Switch { phase: SwitchPhase, value: Option<Val>, default: Option<usize> },
    Return { phase: ExprPhase },
    ExprStmt { phase: ExprPhase },
    Break,
    Continue,
    Empty,
    /// Expression evaluation; `operands` holds child results gathered so far
    Expr { operands: Vec<Val> },
}

impl FrameKind {
    /// Frames that catch `break`
    pub fn is_breakable(&self) -> bool {
        matches!(
            self,
            FrameKind::While { .. }
                | FrameKind::DoWhile { .. }
                | FrameKind::For { .. }
                | FrameKind::Switch { .. }
        )
    }

    /// Frames at which `break`, `continue` and `return` stop propagating
    pub fn is_boundary(&self) -> bool {
        matches!(self, FrameKind::Call { .. } | FrameKind::Program { .. })
    }
}

/// The AST node a frame executes
#[derive(Debug, Clone)]
pub enum Node {
    Stmt(Arc<Stmt>),
    Expr(Arc<Expr>),
    /// Program and call frames look their code up by name
    None,
}

impl Node {
    pub fn line(&self) -> Option<usize> {
        match self {
            Node::Stmt(stmt) => stmt.span().line(),
            Node::Expr(expr) => expr.span().line(),
            Node::None => None,
        }
    }
}

/// Execution frame
///
/// The frame stack replaces the system call stack, so a suspended run is
/// nothing more than this stack plus the scope stack.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,

    /// Scope depth when this frame was pushed; popping the frame
    /// truncates the scope stack back to it
    pub scope_base: usize,

    pub node: Node,
}
