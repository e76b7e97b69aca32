//! Function calls
//!
//! User functions run in their own call frame with a fresh function scope.
//! Everything else is a library call resolved through the catalog: it either
//! returns at once, suspends on an external request, or halts the sketch.

use super::errors::ErrorInfo;
use super::expressions::{descend, finish_expr, save_operands};
use super::outbox::Command;
use super::scope::ScopeKind;
use super::stdlib::{self, CallOutcome, CallSite};
use super::types::{CallPhase, Expr, FrameKind, Val, ValueType};
use super::values::{coerce, default_value};
use super::vm::{pop_frame, push_call, push_stmt, set_top, throw, try_step, Step, VM};
use std::sync::Arc;
use tracing::trace;

/* ===================== Call Targets ===================== */

/// What a call expression invokes
#[derive(Debug, Clone, Copy)]
enum Target<'e> {
    /// A function defined in the sketch
    User(&'e str),
    /// A function reached through a variable holding its name
    Indirect,
    /// `pinMode(...)`, `exit(...)`
    Free(&'e str),
    /// `Serial.println(...)` on a catalog object
    Static { object: &'e str, method: &'e str },
    /// `servo.write(...)`, `text.length()`: the receiver is operand 0
    Method { object: &'e Expr, method: &'e str },
}

impl Target<'_> {
    fn receiver_count(&self) -> usize {
        match self {
            Target::Indirect | Target::Method { .. } => 1,
            _ => 0,
        }
    }
}

fn target_of<'e>(vm: &VM, callee: &'e Expr) -> Result<Target<'e>, ErrorInfo> {
    match callee {
        Expr::Ident { name, .. } => match vm.scope.get(name) {
            Some(_) => Ok(Target::Indirect),
            None if vm.program.functions.contains_key(name) => Ok(Target::User(name)),
            None => Ok(Target::Free(name)),
        },
        Expr::Member {
            object, property, ..
        } => match object.as_ref() {
            Expr::Ident { name, .. }
                if !vm.scope.is_declared(name) && vm.catalog.is_object(name) =>
            {
                Ok(Target::Static {
                    object: name,
                    method: property,
                })
            }
            _ => Ok(Target::Method {
                object: object.as_ref(),
                method: property,
            }),
        },
        Expr::Call { .. } | Expr::Index { .. } | Expr::Ternary { .. } => Ok(Target::Indirect),
        _ => Err(ErrorInfo::type_mismatch("called object is not a function")),
    }
}

/* ===================== Call Expressions ===================== */

/// Execute one step of a call expression
///
/// Operands are laid out as `[receiver] args... [result]`.
pub fn execute_call(vm: &mut VM, callee: &Expr, args: &[Expr], mut operands: Vec<Val>) -> Step {
    let target = try_step!(vm, target_of(vm, callee));
    let base = target.receiver_count();

    if operands.len() < base {
        return descend(vm, operands, callee_object(callee));
    }
    if let Some(next) = args.get(operands.len() - base) {
        return descend(vm, operands, next);
    }
    if operands.len() > base + args.len() {
        // the callee has answered
        let v = operands.pop().unwrap_or(Val::Null);
        return finish_expr(vm, v);
    }

    let arg_values = operands[base..].to_vec();
    match target {
        Target::User(name) => {
            save_operands(vm, operands);
            try_step!(vm, push_call(vm, name.to_string(), arg_values));
            Step::Continue
        }
        Target::Indirect => match operands.first() {
            Some(Val::Func(name)) if vm.program.functions.contains_key(name) => {
                let name = name.clone();
                save_operands(vm, operands);
                try_step!(vm, push_call(vm, name, arg_values));
                Step::Continue
            }
            Some(other) => throw(
                vm,
                ErrorInfo::type_mismatch(format!(
                    "called object of type {} is not a function",
                    other.type_name()
                )),
            ),
            None => throw(vm, ErrorInfo::type_mismatch("missing call target")),
        },
        Target::Free(name) => library_call(vm, CallSite::default(), name, operands),
        Target::Static { object, method } => {
            let site = CallSite {
                receiver: Some(object),
                instance: None,
                this: None,
            };
            library_call(vm, site, method, operands)
        }
        Target::Method { object, method } => {
            let receiver = operands[0].clone();
            let class = match &receiver {
                Val::Struct(s) => s.type_name.clone(),
                Val::Str(_) => "String".to_string(),
                other => {
                    return throw(
                        vm,
                        ErrorInfo::type_mismatch(format!(
                            "request for member '{method}' in a value of type {}",
                            other.type_name()
                        )),
                    )
                }
            };
            let instance = match object {
                Expr::Ident { name, .. } => Some(name.as_str()),
                _ => None,
            };
            let site = CallSite {
                receiver: Some(&class),
                instance,
                this: Some(&receiver),
            };
            library_call(vm, site, method, operands)
        }
    }
}

fn callee_object(callee: &Expr) -> &Expr {
    match callee {
        Expr::Member { object, .. } => object,
        other => other,
    }
}

/// Dispatch a library call and act on its outcome
fn library_call(vm: &mut VM, site: CallSite<'_>, name: &str, operands: Vec<Val>) -> Step {
    let base = usize::from(site.this.is_some());
    let catalog = Arc::clone(&vm.catalog);
    let dispatched = try_step!(vm, stdlib::dispatch(&catalog, site, name, &operands[base..]));
    trace!(function = name, records = dispatched.records.len(), "library call");

    for record in dispatched.records {
        try_step!(vm, vm.emit(record));
    }

    match dispatched.outcome {
        CallOutcome::Value(v) => finish_expr(vm, v),
        CallOutcome::Await(request) => {
            save_operands(vm, operands);
            try_step!(vm, vm.begin_request(request));
            Step::Suspend
        }
        CallOutcome::Halt => {
            vm.halt();
            Step::Done
        }
    }
}

/* ===================== Call Frames ===================== */

/// Execute a user function call frame
pub fn execute_call_frame(vm: &mut VM, phase: CallPhase, function: String, args: Vec<Val>) -> Step {
    let Some(def) = vm.program.functions.get(&function).cloned() else {
        return throw(vm, ErrorInfo::unknown_call(&function));
    };

    match phase {
        CallPhase::Enter => {
            if args.len() != def.params.len() {
                return throw(vm, ErrorInfo::arity(&function, def.params.len(), args.len()));
            }

            vm.scope.push_frame(ScopeKind::Function);
            for (param, arg) in def.params.iter().zip(args) {
                let ty = ValueType::from_name(&param.ty.name).array_of(usize::from(param.is_array));
                let value = try_step!(vm, coerce(arg, &ty));
                try_step!(
                    vm,
                    vm.scope
                        .declare(&param.name, ty, value.clone(), !param.ty.is_const)
                );
                try_step!(
                    vm,
                    vm.emit(Command::VarSet {
                        variable: param.name.clone(),
                        value,
                    })
                );
            }

            set_top(
                vm,
                FrameKind::Call {
                    phase: CallPhase::Exit,
                    function,
                    args: Vec::new(),
                },
            );
            push_stmt(vm, Arc::new(def.body.clone()));
            Step::Continue
        }

        CallPhase::Exit => {
            // fell off the end of the body
            let ty = ValueType::from_name(&def.ret.name);
            let v = match ty {
                ValueType::Void => Val::Null,
                ty => default_value(&ty, &vm.program.structs),
            };
            pop_frame(vm);
            vm.acc = Some(v);
            Step::Continue
        }
    }
}

/// Complete the call frame on top of the stack with a returned value
pub fn complete_call(vm: &mut VM, function: &str, v: Val) -> Step {
    let ty = vm
        .program
        .functions
        .get(function)
        .map(|def| ValueType::from_name(&def.ret.name))
        .unwrap_or(ValueType::Void);
    let v = try_step!(vm, coerce(v, &ty));
    pop_frame(vm);
    vm.acc = Some(v);
    Step::Continue
}
