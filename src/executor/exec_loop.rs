//! Core execution loop
//!
//! This module contains the step() function - the heart of the interpreter.
//! It processes one frame at a time, advancing execution phases and managing the frame stack.
//!
//! ## Function Organization
//! Functions are ordered by importance/call hierarchy:
//! 1. run_until_blocked() - Top-level driver (calls step repeatedly)
//! 2. step() - Main execution loop (dispatches to frame handlers)
//! 3. unwind() - Routes break/continue/return/throw to their handlers

use super::calls::{complete_call, execute_call_frame};
use super::errors::{ErrorInfo, ErrorKind};
use super::expressions::execute_expr;
use super::lifecycle::execute_program;
use super::statements::execute_stmt;
use super::types::{Control, Frame, FrameKind, LoopPhase, Node};
use super::vm::{pop_frame, throw, Step, VM};
use std::mem;

/* ===================== Public API ===================== */

/// Run the VM until it suspends on an external request or finishes
///
/// Returns the step that stopped it: `Step::Suspend` or `Step::Done`.
pub fn run_until_blocked(vm: &mut VM) -> Step {
    loop {
        match step(vm) {
            Step::Continue => continue,
            other => return other,
        }
    }
}

/// Execute one step of the VM
///
/// 1. Checks for active control flow and unwinds if needed
/// 2. Gets the top frame
/// 3. Dispatches on frame kind
pub fn step(vm: &mut VM) -> Step {
    if vm.termination.is_some() {
        return Step::Done;
    }

    match vm.control {
        Control::None => {}
        Control::Suspend(_) => return Step::Suspend,
        _ => return unwind(vm),
    }

    vm.steps += 1;
    if vm.steps > vm.limits.max_steps {
        return throw(
            vm,
            ErrorInfo::new(
                ErrorKind::ResourceExhaustion,
                format!("execution exceeded {} steps", vm.limits.max_steps),
            ),
        );
    }

    let Some(frame_idx) = vm.frames.len().checked_sub(1) else {
        return Step::Done;
    };

    // Operand buffers move out of the frame; handlers put them back when
    // the frame stays live
    let (kind, node) = {
        let f = &mut vm.frames[frame_idx];
        (take_kind(&mut f.kind), f.node.clone())
    };

    match (kind, node) {
        (FrameKind::Program { phase }, _) => execute_program(vm, phase),
        (FrameKind::Call {
            phase,
            function,
            args,
        }, _) => execute_call_frame(vm, phase, function, args),
        (FrameKind::Expr { operands }, Node::Expr(expr)) => execute_expr(vm, &expr, operands),
        (kind, Node::Stmt(stmt)) => execute_stmt(vm, kind, &stmt),
        (kind, _) => throw(
            vm,
            ErrorInfo::type_mismatch(format!("frame {kind:?} has no node to execute")),
        ),
    }
}

fn take_kind(kind: &mut FrameKind) -> FrameKind {
    match kind {
        FrameKind::Expr { operands } => FrameKind::Expr {
            operands: mem::take(operands),
        },
        FrameKind::VarDecl { idx, operands } => FrameKind::VarDecl {
            idx: *idx,
            operands: mem::take(operands),
        },
        FrameKind::Call {
            phase,
            function,
            args,
        } => FrameKind::Call {
            phase: *phase,
            function: function.clone(),
            args: mem::take(args),
        },
        other => other.clone(),
    }
}

/* ===================== Control Flow ===================== */

/// Unwind the stack when control flow is active
///
/// - Throw ends the run with one `ERROR` record
/// - Return pops to the nearest call frame
/// - Break pops to the nearest loop or switch
/// - Continue pops to the nearest loop and restarts its test
///
/// `break`, `continue` and `return` never cross a call or program frame.
fn unwind(vm: &mut VM) -> Step {
    let control = mem::replace(&mut vm.control, Control::None);

    match control {
        Control::Throw(err) => {
            vm.fail(err);
            Step::Done
        }

        Control::Halt => {
            vm.halt();
            Step::Done
        }

        Control::Return(v) => match vm.frames.last().map(|f| &f.kind) {
            Some(FrameKind::Call { function, .. }) => {
                let function = function.clone();
                complete_call(vm, &function, v)
            }
            Some(kind) if !kind.is_boundary() => {
                pop_frame(vm);
                vm.control = Control::Return(v);
                Step::Continue
            }
            _ => throw(
                vm,
                ErrorInfo::new(
                    ErrorKind::InvalidControlFlow,
                    "return statement outside of a function",
                ),
            ),
        },

        Control::Break => match vm.frames.last().map(|f| &f.kind) {
            Some(kind) if kind.is_breakable() => {
                pop_frame(vm);
                Step::Continue
            }
            Some(kind) if !kind.is_boundary() => {
                pop_frame(vm);
                vm.control = Control::Break;
                Step::Continue
            }
            _ => throw(
                vm,
                ErrorInfo::new(
                    ErrorKind::InvalidControlFlow,
                    "break statement not within loop or switch",
                ),
            ),
        },

        Control::Continue => match vm.frames.last_mut() {
            Some(Frame {
                kind: FrameKind::While { phase } | FrameKind::DoWhile { phase },
                ..
            }) => {
                *phase = LoopPhase::EvalTest;
                Step::Continue
            }
            Some(Frame {
                kind: FrameKind::For { phase },
                ..
            }) => {
                *phase = LoopPhase::Update;
                Step::Continue
            }
            Some(frame) if !frame.kind.is_boundary() => {
                pop_frame(vm);
                vm.control = Control::Continue;
                Step::Continue
            }
            _ => throw(
                vm,
                ErrorInfo::new(
                    ErrorKind::InvalidControlFlow,
                    "continue statement not within a loop",
                ),
            ),
        },

        Control::None => Step::Continue,

        Control::Suspend(id) => {
            vm.control = Control::Suspend(id);
            Step::Suspend
        }
    }
}
