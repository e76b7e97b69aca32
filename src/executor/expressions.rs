//! Expression evaluation
//!
//! Expressions run on the frame stack like statements do. A frame gathers
//! the values of its children in `operands` one step at a time; the count of
//! gathered operands is the phase. When the frame pops, its value is left in
//! `vm.acc` for the parent. A call to `analogRead()` three levels deep in an
//! expression therefore suspends with the partial results still on the stack.

use super::calls::execute_call;
use super::errors::ErrorInfo;
use super::outbox::Command;
use super::scope::PathSeg;
use super::types::{
    AssignOp, BinaryOp, Expr, FrameKind, IntKind, LogicalOp, UpdateOp, Val, ValueType,
};
use super::values::{binary, coerce, index_value, member_value, to_index, unary};
use super::vm::{pop_frame, push_expr, set_top, throw, try_step, Step, VM};

/* ===================== Dispatch ===================== */

/// Execute one step of the expression frame on top of the stack
pub fn execute_expr(vm: &mut VM, expr: &Expr, mut operands: Vec<Val>) -> Step {
    if let Some(v) = vm.acc.take() {
        operands.push(v);
    }

    match expr {
        Expr::LitInt { v, .. } => finish_expr(vm, int_literal(*v)),
        Expr::LitFloat { v, .. } => finish_expr(vm, Val::Float(*v)),
        Expr::LitBool { v, .. } => finish_expr(vm, Val::Bool(*v)),
        Expr::LitChar { v, .. } => finish_expr(vm, Val::Char(*v)),
        Expr::LitStr { v, .. } => finish_expr(vm, Val::Str(v.clone())),
        Expr::LitNull { .. } => finish_expr(vm, Val::Null),

        Expr::Ident { name, .. } => {
            let v = try_step!(vm, resolve_ident(vm, name));
            finish_expr(vm, v)
        }

        Expr::Binary {
            op, left, right, ..
        } => match operands.len() {
            0 => descend(vm, operands, left),
            1 => descend(vm, operands, right),
            _ => {
                let v = try_step!(vm, binary(*op, &operands[0], &operands[1]));
                finish_expr(vm, v)
            }
        },

        Expr::Logical {
            op, left, right, ..
        } => match operands.len() {
            0 => descend(vm, operands, left),
            1 => match (op, operands[0].is_truthy()) {
                (LogicalOp::And, false) => finish_expr(vm, Val::Bool(false)),
                (LogicalOp::Or, true) => finish_expr(vm, Val::Bool(true)),
                _ => descend(vm, operands, right),
            },
            _ => {
                let r = operands[1].is_truthy();
                finish_expr(vm, Val::Bool(r))
            }
        },

        Expr::Unary { op, operand, .. } => match operands.pop() {
            None => descend(vm, operands, operand),
            Some(v) => {
                let v = try_step!(vm, unary(*op, &v));
                finish_expr(vm, v)
            }
        },

        Expr::Ternary {
            condition,
            consequent,
            alternate,
            ..
        } => match operands.len() {
            0 => descend(vm, operands, condition),
            1 => {
                let branch = if operands[0].is_truthy() {
                    consequent
                } else {
                    alternate
                };
                descend(vm, operands, branch)
            }
            _ => {
                let v = operands.pop().unwrap_or(Val::Null);
                finish_expr(vm, v)
            }
        },

        Expr::InitList { elements, .. } => match elements.get(operands.len()) {
            Some(next) => descend(vm, operands, next),
            None => finish_expr(vm, Val::Array(operands)),
        },

        Expr::Cast { ty, expr: inner, .. } => match operands.pop() {
            None => descend(vm, operands, inner),
            Some(v) => {
                let v = try_step!(vm, coerce(v, &ValueType::from_name(&ty.name)));
                finish_expr(vm, v)
            }
        },

        Expr::Index { object, index, .. } => match place_of(vm, expr) {
            Some(place) => read_place(vm, &place, operands),
            None => match operands.len() {
                0 => descend(vm, operands, object),
                1 => descend(vm, operands, index),
                _ => {
                    let v = try_step!(vm, index_value(&operands[0], &operands[1]));
                    finish_expr(vm, v)
                }
            },
        },

        Expr::Member {
            object, property, ..
        } => match place_of(vm, expr) {
            Some(place) => read_place(vm, &place, operands),
            None => match operands.pop() {
                None => descend(vm, operands, object),
                Some(v) => {
                    let v = try_step!(vm, member_value(&v, property));
                    finish_expr(vm, v)
                }
            },
        },

        Expr::Assign {
            op, target, value, ..
        } => execute_assign(vm, *op, target, value, operands),

        Expr::Update {
            op, prefix, target, ..
        } => execute_update(vm, *op, *prefix, target, operands),

        Expr::Call { callee, args, .. } => execute_call(vm, callee, args, operands),
    }
}

/* ===================== Frame Helpers ===================== */

/// Pop the expression frame, leaving `v` for the parent
pub fn finish_expr(vm: &mut VM, v: Val) -> Step {
    pop_frame(vm);
    vm.acc = Some(v);
    Step::Continue
}

/// Put the gathered operands back into the live frame
pub fn save_operands(vm: &mut VM, operands: Vec<Val>) {
    set_top(vm, FrameKind::Expr { operands });
}

/// Evaluate `child` next; its value becomes the next operand
pub fn descend(vm: &mut VM, operands: Vec<Val>, child: &Expr) -> Step {
    save_operands(vm, operands);
    push_expr(vm, child);
    Step::Continue
}

/// Integer literals take the narrowest of `int`, `unsigned long`, `long long`
fn int_literal(v: i64) -> Val {
    if i32::try_from(v).is_ok() {
        Val::Int(v, IntKind::I32)
    } else if u32::try_from(v).is_ok() {
        Val::Int(v, IntKind::U32)
    } else {
        Val::Int(v, IntKind::I64)
    }
}

/// Variable, then function name, then library constant
fn resolve_ident(vm: &VM, name: &str) -> Result<Val, ErrorInfo> {
    if let Some(binding) = vm.scope.get(name) {
        return Ok(binding.value.clone());
    }
    if vm.program.functions.contains_key(name) {
        return Ok(Val::Func(name.to_string()));
    }
    vm.catalog
        .constant(name)
        .cloned()
        .ok_or_else(|| ErrorInfo::undeclared(name))
}

/* ===================== Places ===================== */

/// One step from a variable towards the element an expression names
#[derive(Debug, Clone, Copy)]
pub enum Seg<'e> {
    Index(&'e Expr),
    Field(&'e str),
}

/// An lvalue: a declared variable and the path into it
///
/// Index expressions in `segs` are evaluated as operands, in order, before
/// the place is read or written.
#[derive(Debug, Clone)]
pub struct Place<'e> {
    pub root: &'e str,
    pub segs: Vec<Seg<'e>>,
}

impl<'e> Place<'e> {
    fn index_exprs(&self) -> impl Iterator<Item = &'e Expr> + '_ {
        self.segs.iter().filter_map(|seg| match seg {
            Seg::Index(e) => Some(*e),
            Seg::Field(_) => None,
        })
    }

    fn index_count(&self) -> usize {
        self.index_exprs().count()
    }

    /// Resolve the path once every index operand is known
    fn path(&self, indices: &[Val]) -> Result<Vec<PathSeg>, ErrorInfo> {
        let mut indices = indices.iter();
        self.segs
            .iter()
            .map(|seg| match seg {
                Seg::Index(_) => to_index(indices.next().unwrap_or(&Val::Null)).map(PathSeg::Index),
                Seg::Field(f) => Ok(PathSeg::Field(f.to_string())),
            })
            .collect()
    }
}

/// The place `expr` names, if it is rooted at a declared variable
pub fn place_of<'e>(vm: &VM, expr: &'e Expr) -> Option<Place<'e>> {
    let mut segs = Vec::new();
    let mut cur = expr;
    loop {
        match cur {
            Expr::Ident { name, .. } => {
                if !vm.scope.is_declared(name) {
                    return None;
                }
                segs.reverse();
                return Some(Place { root: name, segs });
            }
            Expr::Index { object, index, .. } => {
                segs.push(Seg::Index(index));
                cur = object.as_ref();
            }
            Expr::Member {
                object, property, ..
            } => {
                segs.push(Seg::Field(property));
                cur = object.as_ref();
            }
            _ => return None,
        }
    }
}

fn read_place(vm: &mut VM, place: &Place<'_>, operands: Vec<Val>) -> Step {
    if let Some(next) = place.index_exprs().nth(operands.len()) {
        return descend(vm, operands, next);
    }
    let path = try_step!(vm, place.path(&operands));
    let v = try_step!(vm, vm.scope.read_path(place.root, &path));
    finish_expr(vm, v)
}

/// The place an assignment writes, or why it has none
fn target_place<'e>(vm: &VM, target: &'e Expr) -> Result<Place<'e>, ErrorInfo> {
    if let Some(place) = place_of(vm, target) {
        return Ok(place);
    }
    let mut root = target;
    while let Expr::Index { object, .. } | Expr::Member { object, .. } = root {
        root = object.as_ref();
    }
    match root {
        Expr::Ident { name, .. } => Err(ErrorInfo::undeclared(name)),
        _ => Err(ErrorInfo::type_mismatch(
            "expression is not assignable",
        )),
    }
}

/// Write `value` at `place` and record the whole variable
///
/// Returns the stored element, after conversion to the slot's type.
fn store(
    vm: &mut VM,
    place: &Place<'_>,
    path: &[PathSeg],
    value: Val,
) -> Result<Val, ErrorInfo> {
    let snapshot = vm
        .scope
        .assign_path(place.root, path, value)
        .map(|binding| binding.value.clone())?;
    vm.emit(Command::VarSet {
        variable: place.root.to_string(),
        value: snapshot,
    })?;
    vm.scope.read_path(place.root, path)
}

/* ===================== Assignment ===================== */

fn execute_assign(
    vm: &mut VM,
    op: AssignOp,
    target: &Expr,
    value: &Expr,
    operands: Vec<Val>,
) -> Step {
    let place = try_step!(vm, target_place(vm, target));
    let k = place.index_count();

    if let Some(next) = place.index_exprs().nth(operands.len()) {
        return descend(vm, operands, next);
    }
    if operands.len() == k {
        return descend(vm, operands, value);
    }

    let path = try_step!(vm, place.path(&operands[..k]));
    let rhs = operands[k].clone();
    let new = match op.binary() {
        Some(bin) => {
            let current = try_step!(vm, vm.scope.read_path(place.root, &path));
            try_step!(vm, binary(bin, &current, &rhs))
        }
        None => rhs,
    };
    let stored = try_step!(vm, store(vm, &place, &path, new));
    finish_expr(vm, stored)
}

fn execute_update(
    vm: &mut VM,
    op: UpdateOp,
    prefix: bool,
    target: &Expr,
    operands: Vec<Val>,
) -> Step {
    let place = try_step!(vm, target_place(vm, target));

    if let Some(next) = place.index_exprs().nth(operands.len()) {
        return descend(vm, operands, next);
    }

    let path = try_step!(vm, place.path(&operands));
    let old = try_step!(vm, vm.scope.read_path(place.root, &path));
    let bin = match op {
        UpdateOp::Inc => BinaryOp::Add,
        UpdateOp::Dec => BinaryOp::Sub,
    };
    let new = try_step!(vm, binary(bin, &old, &Val::int(1)));
    let stored = try_step!(vm, store(vm, &place, &path, new));
    finish_expr(vm, if prefix { stored } else { old })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_literal_width() {
        assert_eq!(int_literal(7), Val::Int(7, IntKind::I32));
        assert_eq!(int_literal(3_000_000_000), Val::Int(3_000_000_000, IntKind::U32));
        assert_eq!(int_literal(-5_000_000_000), Val::Int(-5_000_000_000, IntKind::I64));
    }
}
