//! Virtual Machine state
//!
//! The VM holds all execution state:
//! - frames: Stack of active statements and expressions
//! - control: Current control flow state (return, break, suspend, ...)
//! - scope: Variable bindings
//! - outbox: The command log
//! - acc: Result of the frame that just finished, waiting for its parent
//!
//! Suspending is nothing more than returning from `step()` with the stack
//! left as it is. Resuming puts the external value into `acc` and carries on.

use super::errors::{ErrorInfo, ErrorKind};
use super::outbox::{Command, EndReason, Outbox};
use super::scope::ScopeStack;
use super::stdlib::Catalog;
use super::types::{
    BlockPhase, CallPhase, Control, Expr, ExprPhase, Frame, FrameKind, FunctionDef, IfPhase,
    Item, LoopPhase, Node, Program, ProgramPhase, Stmt, StructDef, SwitchPhase, Val,
};
use super::values::coerce;
use crate::gateway::{IoRequest, RequestId};
use crate::types::Termination;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/* ===================== Program Index ===================== */

/// The program tree, indexed for execution
#[derive(Debug, Clone)]
pub struct ProgramIndex {
    pub functions: HashMap<String, Arc<FunctionDef>>,
    pub structs: HashMap<String, StructDef>,
    pub globals: Vec<Arc<Stmt>>,
    /// SHA-256 of the tree's JSON form
    pub hash: String,
    /// First function defined twice, reported when the run starts
    pub duplicate: Option<String>,
}

impl ProgramIndex {
    pub fn build(program: &Program) -> Self {
        let mut functions = HashMap::new();
        let mut structs = HashMap::new();
        let mut globals = Vec::new();
        let mut duplicate = None;

        for item in &program.items {
            match item {
                Item::Function(def) => {
                    if functions
                        .insert(def.name.clone(), Arc::new(def.clone()))
                        .is_some()
                    {
                        duplicate.get_or_insert_with(|| def.name.clone());
                    }
                }
                Item::Struct(def) => {
                    if structs.insert(def.name.clone(), def.clone()).is_some() {
                        duplicate.get_or_insert_with(|| def.name.clone());
                    }
                }
                Item::Global { decl, .. } => globals.push(Arc::new(decl.clone())),
            }
        }

        let json = serde_json::to_vec(program).unwrap_or_default();
        let hash = format!("{:x}", Sha256::digest(&json));

        Self {
            functions,
            structs,
            globals,
            hash,
            duplicate,
        }
    }
}

/* ===================== VM ===================== */

/// Execution bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_loop_iterations: u32,
    pub max_call_depth: usize,
    pub max_commands: usize,
    pub max_steps: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_loop_iterations: 3,
            max_call_depth: 256,
            max_commands: 100_000,
            max_steps: 10_000_000,
        }
    }
}

/// The request a suspended VM is waiting on
#[derive(Debug, Clone, PartialEq)]
pub struct Awaiting {
    pub id: RequestId,
    pub request: IoRequest,
}

#[derive(Debug, Clone)]
pub struct VM {
    /// Stack of execution frames
    pub frames: Vec<Frame>,

    /// Current control flow state
    pub control: Control,

    pub scope: ScopeStack,

    pub outbox: Outbox,

    /// Value produced by the last popped frame
    pub acc: Option<Val>,

    pub awaiting: Option<Awaiting>,

    /// Set once the run is over; no record is emitted after this
    pub termination: Option<Termination>,

    pub program: Arc<ProgramIndex>,

    pub catalog: Arc<Catalog>,

    pub limits: Limits,

    pub call_depth: usize,

    pub steps: u64,

    request_seq: u64,
}

impl VM {
    /// Create a VM positioned at the start of `program`
    pub fn new(program: &Program, catalog: Arc<Catalog>, limits: Limits) -> Self {
        let mut vm = VM {
            frames: vec![],
            control: Control::None,
            scope: ScopeStack::new(),
            outbox: Outbox::new(limits.max_commands),
            acc: None,
            awaiting: None,
            termination: None,
            program: Arc::new(ProgramIndex::build(program)),
            catalog,
            limits,
            call_depth: 0,
            steps: 0,
            request_seq: 0,
        };

        vm.frames.push(Frame {
            kind: FrameKind::Program {
                phase: ProgramPhase::Start,
            },
            scope_base: 1,
            node: Node::None,
        });

        vm
    }

    pub fn emit(&mut self, command: Command) -> Result<(), ErrorInfo> {
        self.outbox.emit(command)
    }

    /// Phase of the root program frame, while the run is live
    pub fn program_phase(&self) -> Option<ProgramPhase> {
        match self.frames.first() {
            Some(Frame {
                kind: FrameKind::Program { phase },
                ..
            }) => Some(*phase),
            _ => None,
        }
    }

    /// Announce an external request and suspend on it
    pub fn begin_request(&mut self, request: IoRequest) -> Result<(), ErrorInfo> {
        if let Some(pending) = &self.awaiting {
            return Err(ErrorInfo::configuration(format!(
                "request {} is still pending",
                pending.id
            )));
        }
        let id = format!("{}_{}", request.name(), self.request_seq);
        self.request_seq += 1;
        self.emit(request.to_command(id.clone()))?;
        debug!(request_id = %id, "suspending on external request");
        self.control = Control::Suspend(id.clone());
        self.awaiting = Some(Awaiting { id, request });
        Ok(())
    }

    /// Deliver the answer to the pending request
    ///
    /// Returns false if the VM was not waiting. A value of the wrong type
    /// fails the run on the next step.
    pub fn resume(&mut self, value: Val) -> bool {
        if !matches!(self.control, Control::Suspend(_)) {
            return false;
        }
        let Some(awaiting) = self.awaiting.take() else {
            return false;
        };
        match coerce(value, &awaiting.request.result_type()) {
            Ok(v) => {
                self.acc = Some(v);
                self.control = Control::None;
            }
            Err(err) => {
                self.control = Control::Throw(err);
            }
        }
        true
    }

    /// End the run with `err` as its single `ERROR` record
    pub fn fail(&mut self, mut err: ErrorInfo) {
        if self.termination.is_some() {
            return;
        }
        if err.line.is_none() {
            err.line = self.frames.iter().rev().find_map(|f| f.node.line());
        }
        warn!(kind = %err.kind, message = %err.message, "sketch execution failed");
        self.unwind_all();
        self.outbox.emit_final(Command::from(&err));
        self.control = Control::Throw(err.clone());
        self.termination = Some(Termination::Failed { error: err });
    }

    /// End the run through the halt primitive
    pub fn halt(&mut self) {
        if self.termination.is_some() {
            return;
        }
        self.unwind_all();
        if let Err(err) = self.emit(Command::ProgramEnd {
            reason: EndReason::Halted,
        }) {
            self.fail(err);
            return;
        }
        debug!("sketch halted");
        self.control = Control::Halt;
        self.termination = Some(Termination::Halted);
    }

    fn unwind_all(&mut self) {
        self.frames.clear();
        self.scope.truncate(1);
        self.call_depth = 0;
        self.awaiting = None;
        self.acc = None;
    }

    pub fn is_finished(&self) -> bool {
        self.termination.is_some()
    }
}

/* ===================== Frame Management ===================== */

/// Push a new frame for a statement onto the stack
pub fn push_stmt(vm: &mut VM, stmt: Arc<Stmt>) {
    let kind = match stmt.as_ref() {
        Stmt::Block { .. } => FrameKind::Block {
            phase: BlockPhase::Enter,
            idx: 0,
        },
        Stmt::VarDecl { .. } => FrameKind::VarDecl {
            idx: 0,
            operands: Vec::new(),
        },
        Stmt::If { .. } => FrameKind::If {
            phase: IfPhase::Eval,
        },
        Stmt::While { .. } => FrameKind::While {
            phase: LoopPhase::EvalTest,
        },
        Stmt::DoWhile { .. } => FrameKind::DoWhile {
            phase: LoopPhase::Body,
        },
        Stmt::For { .. } => FrameKind::For {
            phase: LoopPhase::Init,
        },
        Stmt::Switch { .. } => FrameKind::Switch {
            phase: SwitchPhase::Eval,
            value: None,
            default: None,
        },
        Stmt::Return { .. } => FrameKind::Return {
            phase: ExprPhase::Eval,
        },
        Stmt::Expr { .. } => FrameKind::ExprStmt {
            phase: ExprPhase::Eval,
        },
        Stmt::Break { .. } => FrameKind::Break,
        Stmt::Continue { .. } => FrameKind::Continue,
        Stmt::Empty { .. } => FrameKind::Empty,
    };

    vm.frames.push(Frame {
        kind,
        scope_base: vm.scope.depth(),
        node: Node::Stmt(stmt),
    });
}

/// Push a frame that evaluates `expr` into `acc`
pub fn push_expr(vm: &mut VM, expr: &Expr) {
    vm.frames.push(Frame {
        kind: FrameKind::Expr {
            operands: Vec::new(),
        },
        scope_base: vm.scope.depth(),
        node: Node::Expr(Arc::new(expr.clone())),
    });
}

/// Push a user function call
pub fn push_call(vm: &mut VM, function: String, args: Vec<Val>) -> Result<(), ErrorInfo> {
    if vm.call_depth >= vm.limits.max_call_depth {
        return Err(ErrorInfo::new(
            ErrorKind::ResourceExhaustion,
            format!(
                "call depth exceeded {} calling '{function}'",
                vm.limits.max_call_depth
            ),
        ));
    }
    vm.call_depth += 1;
    vm.frames.push(Frame {
        kind: FrameKind::Call {
            phase: CallPhase::Enter,
            function,
            args,
        },
        scope_base: vm.scope.depth(),
        node: Node::None,
    });
    Ok(())
}

/// Pop the top frame and release every scope frame it opened
pub fn pop_frame(vm: &mut VM) {
    if let Some(frame) = vm.frames.pop() {
        vm.scope.truncate(frame.scope_base);
        if matches!(frame.kind, FrameKind::Call { .. }) {
            vm.call_depth = vm.call_depth.saturating_sub(1);
        }
    }
}

/// Replace the state of the top frame
pub fn set_top(vm: &mut VM, kind: FrameKind) {
    if let Some(frame) = vm.frames.last_mut() {
        frame.kind = kind;
    }
}

/// Raise a runtime error; the next step unwinds it
pub fn throw(vm: &mut VM, err: ErrorInfo) -> Step {
    vm.control = Control::Throw(err);
    Step::Continue
}

/// Propagate an `ErrorInfo` out of a frame handler as a thrown error
macro_rules! try_step {
    ($vm:expr, $e:expr) => {
        match $e {
            Ok(v) => v,
            Err(err) => return $crate::executor::vm::throw($vm, err),
        }
    };
}
pub(crate) use try_step;

/* ===================== Step Result ===================== */

/// Result of executing one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Continue to next step
    Continue,
    /// Waiting on an external value
    Suspend,
    /// Execution complete
    Done,
}
