//! Statement execution handlers
//!
//! Each statement type has its own handler function that processes
//! the statement based on its current execution phase.

use super::errors::ErrorInfo;
use super::outbox::Command;
use super::scope::ScopeKind;
use super::stdlib;
use super::types::{
    BinaryOp, BlockPhase, Control, Declarator, Expr, ExprPhase, FrameKind, IfPhase, LoopPhase,
    Stmt, SwitchCase, SwitchPhase, TypeSpec, Val, ValueType,
};
use super::values::{binary, coerce, default_value, struct_from_list, to_index};
use super::vm::{pop_frame, push_expr, push_stmt, set_top, throw, try_step, Step, VM};
use std::sync::Arc;

/* ===================== Dispatch ===================== */

/// Execute the statement frame on top of the stack
pub fn execute_stmt(vm: &mut VM, kind: FrameKind, stmt: &Stmt) -> Step {
    match (kind, stmt) {
        (FrameKind::Block { phase, idx }, Stmt::Block { body, .. }) => {
            execute_block(vm, phase, idx, body)
        }
        (FrameKind::VarDecl { idx, operands }, Stmt::VarDecl { ty, declarators, .. }) => {
            execute_var_decl(vm, ty, declarators, idx, operands)
        }
        (FrameKind::If { phase }, Stmt::If {
            test,
            then_s,
            else_s,
            ..
        }) => execute_if(vm, phase, test, then_s, else_s.as_deref()),
        (FrameKind::While { phase }, Stmt::While { test, body, .. }) => {
            execute_while(vm, phase, test, body)
        }
        (FrameKind::DoWhile { phase }, Stmt::DoWhile { body, test, .. }) => {
            execute_do_while(vm, phase, test, body)
        }
        (FrameKind::For { phase }, Stmt::For {
            init,
            test,
            update,
            body,
            ..
        }) => execute_for(vm, phase, init.as_deref(), test.as_ref(), update.as_ref(), body),
        (FrameKind::Switch {
            phase,
            value,
            default,
        }, Stmt::Switch {
            discriminant,
            cases,
            ..
        }) => execute_switch(vm, phase, value, default, discriminant, cases),
        (FrameKind::Return { phase }, Stmt::Return { value, .. }) => {
            execute_return(vm, phase, value.as_ref())
        }
        (FrameKind::ExprStmt { phase }, Stmt::Expr { expr, .. }) => {
            execute_expr_stmt(vm, phase, expr)
        }
        (FrameKind::Break, Stmt::Break { .. }) => {
            pop_frame(vm);
            vm.control = Control::Break;
            Step::Continue
        }
        (FrameKind::Continue, Stmt::Continue { .. }) => {
            pop_frame(vm);
            vm.control = Control::Continue;
            Step::Continue
        }
        (FrameKind::Empty, Stmt::Empty { .. }) => {
            pop_frame(vm);
            Step::Continue
        }
        (kind, _) => throw(
            vm,
            ErrorInfo::type_mismatch(format!("frame {kind:?} does not match its statement")),
        ),
    }
}

fn child(stmt: &Stmt) -> Arc<Stmt> {
    Arc::new(stmt.clone())
}

/* ===================== Statement Handlers ===================== */

/// Execute Block statement
pub fn execute_block(vm: &mut VM, phase: BlockPhase, idx: usize, body: &[Stmt]) -> Step {
    match phase {
        BlockPhase::Enter => {
            vm.scope.push_frame(ScopeKind::Block);
            set_top(
                vm,
                FrameKind::Block {
                    phase: BlockPhase::Execute,
                    idx,
                },
            );
            Step::Continue
        }
        BlockPhase::Execute => {
            let Some(next) = body.get(idx) else {
                // Block complete; popping releases its scope
                pop_frame(vm);
                return Step::Continue;
            };
            set_top(
                vm,
                FrameKind::Block {
                    phase: BlockPhase::Execute,
                    idx: idx + 1,
                },
            );
            push_stmt(vm, child(next));
            Step::Continue
        }
    }
}

/// Execute If statement
pub fn execute_if(
    vm: &mut VM,
    phase: IfPhase,
    test: &Expr,
    then_s: &Stmt,
    else_s: Option<&Stmt>,
) -> Step {
    match phase {
        IfPhase::Eval => {
            set_top(
                vm,
                FrameKind::If {
                    phase: IfPhase::Branch,
                },
            );
            push_expr(vm, test);
            Step::Continue
        }
        IfPhase::Branch => {
            let truthy = vm.acc.take().map(|v| v.is_truthy()).unwrap_or(false);
            pop_frame(vm);
            let branch = if truthy { Some(then_s) } else { else_s };
            if let Some(branch) = branch {
                push_stmt(vm, child(branch));
            }
            Step::Continue
        }
    }
}

fn set_loop_phase(vm: &mut VM, phase: LoopPhase) {
    if let Some(frame) = vm.frames.last_mut() {
        match &mut frame.kind {
            FrameKind::While { phase: p }
            | FrameKind::DoWhile { phase: p }
            | FrameKind::For { phase: p } => *p = phase,
            _ => {}
        }
    }
}

/// Execute While statement
pub fn execute_while(vm: &mut VM, phase: LoopPhase, test: &Expr, body: &Stmt) -> Step {
    match phase {
        LoopPhase::EvalTest => {
            vm.acc = None;
            set_loop_phase(vm, LoopPhase::Test);
            push_expr(vm, test);
            Step::Continue
        }
        LoopPhase::Test => {
            if !vm.acc.take().is_some_and(|v| v.is_truthy()) {
                pop_frame(vm);
                return Step::Continue;
            }
            set_loop_phase(vm, LoopPhase::EvalTest);
            push_stmt(vm, child(body));
            Step::Continue
        }
        LoopPhase::Init | LoopPhase::Body | LoopPhase::Update => {
            set_loop_phase(vm, LoopPhase::EvalTest);
            Step::Continue
        }
    }
}

/// Execute DoWhile statement
pub fn execute_do_while(vm: &mut VM, phase: LoopPhase, test: &Expr, body: &Stmt) -> Step {
    match phase {
        LoopPhase::Body => {
            set_loop_phase(vm, LoopPhase::EvalTest);
            push_stmt(vm, child(body));
            Step::Continue
        }
        _ => execute_while(vm, phase, test, body),
    }
}

/// Execute For statement
///
/// The loop owns one scope for its initializer; the body gets a fresh
/// block scope on every iteration.
pub fn execute_for(
    vm: &mut VM,
    phase: LoopPhase,
    init: Option<&Stmt>,
    test: Option<&Expr>,
    update: Option<&Expr>,
    body: &Stmt,
) -> Step {
    match phase {
        LoopPhase::Init => {
            vm.scope.push_frame(ScopeKind::Block);
            set_loop_phase(vm, LoopPhase::EvalTest);
            if let Some(init) = init {
                push_stmt(vm, child(init));
            }
            Step::Continue
        }
        LoopPhase::EvalTest => {
            vm.acc = None;
            match test {
                Some(test) => {
                    set_loop_phase(vm, LoopPhase::Test);
                    push_expr(vm, test);
                }
                None => {
                    set_loop_phase(vm, LoopPhase::Update);
                    push_stmt(vm, child(body));
                }
            }
            Step::Continue
        }
        LoopPhase::Test => {
            if !vm.acc.take().is_some_and(|v| v.is_truthy()) {
                pop_frame(vm);
                return Step::Continue;
            }
            set_loop_phase(vm, LoopPhase::Update);
            push_stmt(vm, child(body));
            Step::Continue
        }
        LoopPhase::Update => {
            set_loop_phase(vm, LoopPhase::EvalTest);
            if let Some(update) = update {
                push_expr(vm, update);
            }
            Step::Continue
        }
        LoopPhase::Body => {
            set_loop_phase(vm, LoopPhase::EvalTest);
            Step::Continue
        }
    }
}

/// Execute Switch statement
///
/// Case labels are tried in order; execution then falls through the
/// remaining case bodies until `break`.
pub fn execute_switch(
    vm: &mut VM,
    phase: SwitchPhase,
    value: Option<Val>,
    default: Option<usize>,
    discriminant: &Expr,
    cases: &[SwitchCase],
) -> Step {
    let goto = |vm: &mut VM, phase: SwitchPhase, value: Option<Val>, default: Option<usize>| {
        set_top(
            vm,
            FrameKind::Switch {
                phase,
                value,
                default,
            },
        );
        Step::Continue
    };

    match phase {
        SwitchPhase::Eval => {
            vm.scope.push_frame(ScopeKind::Block);
            goto(vm, SwitchPhase::Discriminant, None, None);
            push_expr(vm, discriminant);
            Step::Continue
        }
        SwitchPhase::Discriminant => {
            let v = vm.acc.take().unwrap_or(Val::Null);
            goto(vm, SwitchPhase::Match(0), Some(v), None)
        }
        SwitchPhase::Match(i) => match cases.get(i) {
            None => match default {
                Some(d) => goto(vm, SwitchPhase::Run { case: d, stmt: 0 }, value, default),
                None => {
                    pop_frame(vm);
                    Step::Continue
                }
            },
            Some(SwitchCase { test: None, .. }) => {
                goto(vm, SwitchPhase::Match(i + 1), value, Some(i))
            }
            Some(SwitchCase {
                test: Some(label), ..
            }) => {
                goto(vm, SwitchPhase::Compare(i), value, default);
                push_expr(vm, label);
                Step::Continue
            }
        },
        SwitchPhase::Compare(i) => {
            let label = vm.acc.take().unwrap_or(Val::Null);
            let discriminant = value.clone().unwrap_or(Val::Null);
            let matched = try_step!(vm, binary(BinaryOp::Eq, &discriminant, &label)).is_truthy();
            if matched {
                goto(vm, SwitchPhase::Run { case: i, stmt: 0 }, value, default)
            } else {
                goto(vm, SwitchPhase::Match(i + 1), value, default)
            }
        }
        SwitchPhase::Run { case, stmt } => match cases.get(case) {
            Some(c) => match c.body.get(stmt) {
                Some(next) => {
                    goto(
                        vm,
                        SwitchPhase::Run {
                            case,
                            stmt: stmt + 1,
                        },
                        value,
                        default,
                    );
                    push_stmt(vm, child(next));
                    Step::Continue
                }
                None => goto(
                    vm,
                    SwitchPhase::Run {
                        case: case + 1,
                        stmt: 0,
                    },
                    value,
                    default,
                ),
            },
            None => {
                pop_frame(vm);
                Step::Continue
            }
        },
    }
}

/// Execute Return statement
pub fn execute_return(vm: &mut VM, phase: ExprPhase, value: Option<&Expr>) -> Step {
    match phase {
        ExprPhase::Eval => {
            set_top(
                vm,
                FrameKind::Return {
                    phase: ExprPhase::Done,
                },
            );
            if let Some(expr) = value {
                push_expr(vm, expr);
            }
            Step::Continue
        }
        ExprPhase::Done => {
            let v = vm.acc.take().unwrap_or(Val::Null);
            pop_frame(vm);
            vm.control = Control::Return(v);
            Step::Continue
        }
    }
}

/// Execute an expression statement; the value is discarded
pub fn execute_expr_stmt(vm: &mut VM, phase: ExprPhase, expr: &Expr) -> Step {
    match phase {
        ExprPhase::Eval => {
            set_top(
                vm,
                FrameKind::ExprStmt {
                    phase: ExprPhase::Done,
                },
            );
            push_expr(vm, expr);
            Step::Continue
        }
        ExprPhase::Done => {
            vm.acc = None;
            pop_frame(vm);
            Step::Continue
        }
    }
}

/* ===================== Declarations ===================== */

/// Execute a declaration, one declarator at a time
///
/// Operands collect the evaluated array dimensions followed by the
/// initializer. Every declared name gets a `VAR_SET` snapshot.
pub fn execute_var_decl(
    vm: &mut VM,
    ty: &TypeSpec,
    declarators: &[Declarator],
    idx: usize,
    mut operands: Vec<Val>,
) -> Step {
    if let Some(v) = vm.acc.take() {
        operands.push(v);
    }

    let Some(decl) = declarators.get(idx) else {
        pop_frame(vm);
        return Step::Continue;
    };

    let dim_exprs: Vec<&Expr> = decl.dims.iter().flatten().collect();
    if operands.len() < dim_exprs.len() {
        let next = dim_exprs[operands.len()];
        set_top(vm, FrameKind::VarDecl { idx, operands });
        push_expr(vm, next);
        return Step::Continue;
    }
    if let Some(init) = &decl.init {
        if operands.len() == dim_exprs.len() {
            set_top(vm, FrameKind::VarDecl { idx, operands });
            push_expr(vm, init);
            return Step::Continue;
        }
    }

    let init = if decl.init.is_some() {
        operands.pop()
    } else {
        None
    };
    let (decl_ty, value) = try_step!(vm, declared_value(vm, ty, decl, &operands, init));

    try_step!(
        vm,
        vm.scope
            .declare(&decl.name, decl_ty, value.clone(), !ty.is_const)
    );
    try_step!(
        vm,
        vm.emit(Command::VarSet {
            variable: decl.name.clone(),
            value,
        })
    );

    set_top(
        vm,
        FrameKind::VarDecl {
            idx: idx + 1,
            operands: Vec::new(),
        },
    );
    Step::Continue
}

/// Declared type and initial value of one declarator
fn declared_value(
    vm: &VM,
    ty: &TypeSpec,
    decl: &Declarator,
    sizes: &[Val],
    init: Option<Val>,
) -> Result<(ValueType, Val), ErrorInfo> {
    let base = ValueType::from_name(&ty.name);
    if base == ValueType::Void {
        return Err(ErrorInfo::type_mismatch(format!(
            "variable '{}' declared void",
            decl.name
        )));
    }

    if decl.dims.is_empty() {
        let value = match init {
            Some(v) => init_value(vm, &base, v)?,
            None => zero_value(vm, &base)?,
        };
        return Ok((base, value));
    }

    let mut sizes = sizes.iter();
    let mut dims = Vec::with_capacity(decl.dims.len());
    for dim in &decl.dims {
        match dim {
            Some(_) => {
                let size = sizes.next().unwrap_or(&Val::Null);
                dims.push(Some(to_index(size)?));
            }
            None => dims.push(None),
        }
    }

    let zero = zero_value(vm, &base)?;
    let value = shape_array(vm, &dims, &zero, init.as_ref(), &base)?;
    Ok((base.array_of(dims.len()), value))
}

/// Zero value of a declared type; library classes are default-constructed
fn zero_value(vm: &VM, ty: &ValueType) -> Result<Val, ErrorInfo> {
    if let ValueType::Named(name) = ty {
        if !vm.program.structs.contains_key(name) {
            if vm.catalog.is_class(name) {
                return stdlib::construct(&vm.catalog, name, &[]);
            }
            return Err(ErrorInfo::type_mismatch(format!("unknown type name '{name}'")));
        }
    }
    Ok(default_value(ty, &vm.program.structs))
}

/// Convert an initializer for a scalar or struct slot
fn init_value(vm: &VM, ty: &ValueType, v: Val) -> Result<Val, ErrorInfo> {
    match (ty, v) {
        (ValueType::Named(name), Val::Array(items)) => match vm.program.structs.get(name) {
            Some(def) => struct_from_list(def, items, &vm.program.structs),
            None => Err(ErrorInfo::type_mismatch(format!(
                "cannot initialize {name} from a brace list"
            ))),
        },
        (ty, v) => coerce(v, ty),
    }
}

/// Build an array of shape `dims`, zero-filled, overlaid with `init`
fn shape_array(
    vm: &VM,
    dims: &[Option<usize>],
    zero: &Val,
    init: Option<&Val>,
    elem: &ValueType,
) -> Result<Val, ErrorInfo> {
    let Some((first, rest)) = dims.split_first() else {
        return match init {
            Some(v) => init_value(vm, elem, v.clone()),
            None => Ok(zero.clone()),
        };
    };

    let items: Vec<Val> = match init {
        None => Vec::new(),
        Some(Val::Array(items)) => items.clone(),
        // char buf[] = "text"; takes the terminator unless the size excludes it
        Some(Val::Str(s)) if rest.is_empty() && *elem == ValueType::Char => {
            let mut chars: Vec<Val> = s.chars().map(Val::Char).collect();
            if first.map_or(true, |n| n > chars.len()) {
                chars.push(Val::Char('\0'));
            }
            chars
        }
        Some(other) => {
            return Err(ErrorInfo::type_mismatch(format!(
                "cannot initialize an array from {}",
                other.type_name()
            )))
        }
    };

    let len = first.unwrap_or(items.len());
    if items.len() > len {
        return Err(ErrorInfo::type_mismatch(format!(
            "too many initializers for array of {len}"
        )));
    }

    (0..len)
        .map(|i| shape_array(vm, rest, zero, items.get(i), elem))
        .collect::<Result<Vec<_>, _>>()
        .map(Val::Array)
}
