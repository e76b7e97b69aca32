//! Value model behavior: coercion, promotion and operators
//!
//! Integer arithmetic follows the C usual arithmetic conversions on a board
//! where `int` is 32 bits. Results are wrapped to the width of the result type.

use super::errors::{ErrorInfo, ErrorKind};
use super::types::{BinaryOp, IntKind, StructDef, StructVal, UnaryOp, Val, ValueType};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashMap;

/* ===================== Coercion ===================== */

/// Convert `val` for storage in a binding of type `ty`
pub fn coerce(val: Val, ty: &ValueType) -> Result<Val, ErrorInfo> {
    match (ty, val) {
        (ValueType::Void, _) => Ok(Val::Null),
        (ValueType::Bool, v @ (Val::Bool(_) | Val::Char(_) | Val::Int(..) | Val::Float(_))) => {
            Ok(Val::Bool(v.is_truthy()))
        }
        (ValueType::Char, Val::Char(c)) => Ok(Val::Char(c)),
        (ValueType::Char, v @ (Val::Bool(_) | Val::Int(..) | Val::Float(_))) => {
            let code = v.as_i64().unwrap_or(0) as u8;
            Ok(Val::Char(char::from(code)))
        }
        (ValueType::Int(kind), v @ (Val::Bool(_) | Val::Char(_) | Val::Int(..) | Val::Float(_))) => {
            let raw = v.as_i64().unwrap_or(0);
            Ok(Val::Int(kind.wrap(raw), *kind))
        }
        (ValueType::Float, v @ (Val::Bool(_) | Val::Char(_) | Val::Int(..) | Val::Float(_))) => {
            Ok(Val::Float(v.as_f64().unwrap_or(0.0)))
        }
        (ValueType::Str, Val::Str(s)) => Ok(Val::Str(s)),
        (ValueType::Str, v @ (Val::Char(_) | Val::Int(..) | Val::Float(_) | Val::Bool(_))) => {
            Ok(Val::Str(v.to_string()))
        }
        (ValueType::Str, v @ Val::Array(_)) if is_char_array(&v) => Ok(Val::Str(v.to_string())),
        (ValueType::Array(inner), Val::Array(items)) => items
            .into_iter()
            .map(|item| coerce(item, inner))
            .collect::<Result<Vec<_>, _>>()
            .map(Val::Array),
        (ValueType::Array(inner), Val::Str(s)) if **inner == ValueType::Char => {
            Ok(Val::Array(s.chars().map(Val::Char).collect()))
        }
        (ValueType::Named(name), Val::Struct(s)) if &s.type_name == name => Ok(Val::Struct(s)),
        (ValueType::Named(_), Val::Null) => Ok(Val::Null),
        (ty, v) => Err(ErrorInfo::type_mismatch(format!(
            "cannot convert {} to {}",
            v.type_name(),
            ty
        ))),
    }
}

/// Convert `val` to the type of the value it replaces
///
/// Element and field writes have no declared type of their own; the zero
/// value laid down at declaration carries it.
pub fn coerce_like(val: Val, existing: &Val) -> Result<Val, ErrorInfo> {
    match type_of(existing) {
        Some(ty) => coerce(val, &ty),
        None => Ok(val),
    }
}

fn type_of(val: &Val) -> Option<ValueType> {
    match val {
        Val::Bool(_) => Some(ValueType::Bool),
        Val::Char(_) => Some(ValueType::Char),
        Val::Int(_, kind) => Some(ValueType::Int(*kind)),
        Val::Float(_) => Some(ValueType::Float),
        Val::Str(_) => Some(ValueType::Str),
        Val::Struct(s) if s.type_name != "struct" => Some(ValueType::Named(s.type_name.clone())),
        Val::Array(items) => items
            .first()
            .and_then(type_of)
            .map(|inner| ValueType::Array(Box::new(inner))),
        Val::Null | Val::Struct(_) | Val::Func(_) => None,
    }
}

fn is_char_array(val: &Val) -> bool {
    matches!(val, Val::Array(items) if items.iter().all(|v| matches!(v, Val::Char(_))))
}

/// Zero value for a declared type
///
/// Struct types are zero-filled field by field; unknown named types (library
/// classes without a constructor call) start out null.
pub fn default_value(ty: &ValueType, structs: &HashMap<String, StructDef>) -> Val {
    match ty {
        ValueType::Void => Val::Null,
        ValueType::Bool => Val::Bool(false),
        ValueType::Char => Val::Char('\0'),
        ValueType::Int(kind) => Val::Int(0, *kind),
        ValueType::Float => Val::Float(0.0),
        ValueType::Str => Val::Str(String::new()),
        ValueType::Array(_) => Val::Array(Vec::new()),
        ValueType::Named(name) => match structs.get(name) {
            Some(def) => Val::Struct(StructVal {
                type_name: def.name.clone(),
                fields: def
                    .fields
                    .iter()
                    .map(|f| {
                        let field_ty = ValueType::from_name(&f.ty.name);
                        (f.name.clone(), default_value(&field_ty, structs))
                    })
                    .collect::<IndexMap<_, _>>(),
            }),
            None => Val::Null,
        },
    }
}

/// Build a struct from a positional initializer list (`Point p = {1, 2};`)
pub fn struct_from_list(
    def: &StructDef,
    items: Vec<Val>,
    structs: &HashMap<String, StructDef>,
) -> Result<Val, ErrorInfo> {
    if items.len() > def.fields.len() {
        return Err(ErrorInfo::type_mismatch(format!(
            "too many initializers for struct {}",
            def.name
        )));
    }
    let mut fields = IndexMap::new();
    let mut items = items.into_iter();
    for field in &def.fields {
        let field_ty = ValueType::from_name(&field.ty.name);
        let value = match items.next() {
            Some(v) => coerce(v, &field_ty)?,
            None => default_value(&field_ty, structs),
        };
        fields.insert(field.name.clone(), value);
    }
    Ok(Val::Struct(StructVal {
        type_name: def.name.clone(),
        fields,
    }))
}

/* ===================== Promotion ===================== */

/// Integer view of an arithmetic operand after integral promotion
fn promote(val: &Val) -> Option<(i64, IntKind)> {
    match val {
        Val::Bool(b) => Some((*b as i64, IntKind::I32)),
        Val::Char(c) => Some((*c as i64, IntKind::I32)),
        Val::Int(v, kind) if kind.rank() == 0 => Some((*v, IntKind::I32)),
        Val::Int(v, kind) => Some((*v, *kind)),
        _ => None,
    }
}

/// Common type of two promoted integer operands
fn common_kind(a: IntKind, b: IntKind) -> IntKind {
    if a.rank() >= b.rank() {
        a
    } else {
        b
    }
}

fn is_numeric(val: &Val) -> bool {
    matches!(val, Val::Bool(_) | Val::Char(_) | Val::Int(..) | Val::Float(_))
}

/* ===================== Operators ===================== */

/// Apply a binary operator
pub fn binary(op: BinaryOp, left: &Val, right: &Val) -> Result<Val, ErrorInfo> {
    if matches!(left, Val::Str(_)) || matches!(right, Val::Str(_)) {
        return string_binary(op, left, right);
    }

    if matches!(left, Val::Float(_)) || matches!(right, Val::Float(_)) {
        if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
            if is_numeric(left) && is_numeric(right) {
                return float_binary(op, l, r);
            }
        }
        return Err(operand_mismatch(op, left, right));
    }

    match (promote(left), promote(right)) {
        (Some(l), Some(r)) => int_binary(op, l, r),
        _ => match op {
            BinaryOp::Eq => Ok(Val::Bool(left == right)),
            BinaryOp::Ne => Ok(Val::Bool(left != right)),
            _ => Err(operand_mismatch(op, left, right)),
        },
    }
}

fn operand_mismatch(op: BinaryOp, left: &Val, right: &Val) -> ErrorInfo {
    ErrorInfo::type_mismatch(format!(
        "invalid operands to {:?}: {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn int_binary(op: BinaryOp, l: (i64, IntKind), r: (i64, IntKind)) -> Result<Val, ErrorInfo> {
    // shifts take the type of the left operand
    if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
        let (value, kind) = l;
        let amount = r.0;
        if amount < 0 || amount >= kind.bits() as i64 {
            return Ok(Val::Int(0, kind));
        }
        let shifted = match op {
            BinaryOp::Shl => ((value as i128) << amount) as i64,
            _ if kind.is_signed() => value >> amount,
            _ => ((value as u64 & mask(kind)) >> amount) as i64,
        };
        return Ok(Val::Int(kind.wrap(shifted), kind));
    }

    let kind = common_kind(l.1, r.1);
    let a = kind.wrap(l.0) as i128;
    let b = kind.wrap(r.0) as i128;

    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div | BinaryOp::Mod if b == 0 => {
            return Err(ErrorInfo::new(
                ErrorKind::DivisionByZero,
                "integer division by zero",
            ))
        }
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::Eq => return Ok(Val::Bool(a == b)),
        BinaryOp::Ne => return Ok(Val::Bool(a != b)),
        BinaryOp::Lt => return Ok(Val::Bool(a < b)),
        BinaryOp::Le => return Ok(Val::Bool(a <= b)),
        BinaryOp::Gt => return Ok(Val::Bool(a > b)),
        BinaryOp::Ge => return Ok(Val::Bool(a >= b)),
        BinaryOp::Shl | BinaryOp::Shr => unreachable!("shifts handled above"),
    };
    Ok(Val::Int(kind.wrap(result as i64), kind))
}

fn mask(kind: IntKind) -> u64 {
    match kind.bits() {
        64 => u64::MAX,
        bits => (1u64 << bits) - 1,
    }
}

fn float_binary(op: BinaryOp, a: f64, b: f64) -> Result<Val, ErrorInfo> {
    let v = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Eq => return Ok(Val::Bool(a == b)),
        BinaryOp::Ne => return Ok(Val::Bool(a != b)),
        BinaryOp::Lt => return Ok(Val::Bool(a < b)),
        BinaryOp::Le => return Ok(Val::Bool(a <= b)),
        BinaryOp::Gt => return Ok(Val::Bool(a > b)),
        BinaryOp::Ge => return Ok(Val::Bool(a >= b)),
        BinaryOp::Mod
        | BinaryOp::BitAnd
        | BinaryOp::BitOr
        | BinaryOp::BitXor
        | BinaryOp::Shl
        | BinaryOp::Shr => {
            return Err(ErrorInfo::type_mismatch(format!(
                "invalid operands to {op:?}: float"
            )))
        }
    };
    Ok(Val::Float(v))
}

/// `String` concatenation and comparison
fn string_binary(op: BinaryOp, left: &Val, right: &Val) -> Result<Val, ErrorInfo> {
    if op == BinaryOp::Add {
        return Ok(Val::Str(format!("{left}{right}")));
    }
    let (Val::Str(l), Val::Str(r)) = (left, right) else {
        return Err(operand_mismatch(op, left, right));
    };
    let ord = l.cmp(r);
    let result = match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::Ne => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Ge => ord != Ordering::Less,
        _ => return Err(operand_mismatch(op, left, right)),
    };
    Ok(Val::Bool(result))
}

/// Apply a unary operator
pub fn unary(op: UnaryOp, val: &Val) -> Result<Val, ErrorInfo> {
    if op == UnaryOp::Not {
        return Ok(Val::Bool(!val.is_truthy()));
    }
    if let Val::Float(f) = val {
        return match op {
            UnaryOp::Neg => Ok(Val::Float(-f)),
            UnaryOp::Plus => Ok(Val::Float(*f)),
            _ => Err(ErrorInfo::type_mismatch("invalid operand to ~: float")),
        };
    }
    let Some((v, kind)) = promote(val) else {
        return Err(ErrorInfo::type_mismatch(format!(
            "invalid operand to {:?}: {}",
            op,
            val.type_name()
        )));
    };
    let result = match op {
        UnaryOp::Neg => v.wrapping_neg(),
        UnaryOp::Plus => v,
        UnaryOp::BitNot => !v,
        UnaryOp::Not => unreachable!("handled above"),
    };
    Ok(Val::Int(kind.wrap(result), kind))
}

/* ===================== Element Access ===================== */

/// Read `container[index]`
pub fn index_value(container: &Val, index: &Val) -> Result<Val, ErrorInfo> {
    let i = to_index(index)?;
    match container {
        Val::Array(items) => items.get(i).cloned().ok_or_else(|| out_of_range(i, items.len())),
        Val::Str(s) => s
            .chars()
            .nth(i)
            .map(Val::Char)
            .ok_or_else(|| out_of_range(i, s.chars().count())),
        other => Err(ErrorInfo::type_mismatch(format!(
            "{} is not indexable",
            other.type_name()
        ))),
    }
}

/// Read `object.field`
pub fn member_value(object: &Val, field: &str) -> Result<Val, ErrorInfo> {
    match object {
        Val::Struct(s) => s.fields.get(field).cloned().ok_or_else(|| {
            ErrorInfo::type_mismatch(format!("{} has no member named '{field}'", s.type_name))
        }),
        other => Err(ErrorInfo::type_mismatch(format!(
            "{} has no member named '{field}'",
            other.type_name()
        ))),
    }
}

pub fn to_index(index: &Val) -> Result<usize, ErrorInfo> {
    match index {
        Val::Int(..) | Val::Char(_) | Val::Bool(_) => {
            let i = index.as_i64().unwrap_or(-1);
            usize::try_from(i)
                .map_err(|_| ErrorInfo::new(ErrorKind::IndexOutOfRange, format!("negative index {i}")))
        }
        other => Err(ErrorInfo::type_mismatch(format!(
            "array index must be an integer, got {}",
            other.type_name()
        ))),
    }
}

pub fn out_of_range(index: usize, len: usize) -> ErrorInfo {
    ErrorInfo::new(
        ErrorKind::IndexOutOfRange,
        format!("index {index} out of range for length {len}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_promotes_to_unsigned_long() {
        let l = Val::Int(-1, IntKind::I32);
        let r = Val::Int(1, IntKind::U32);
        assert_eq!(
            binary(BinaryOp::Add, &l, &r).unwrap(),
            Val::Int(0, IntKind::U32)
        );
        assert_eq!(
            binary(BinaryOp::Gt, &l, &r).unwrap(),
            Val::Bool(true),
            "-1 converts to 4294967295 when compared with unsigned long"
        );
    }

    #[test]
    fn test_byte_arithmetic_promotes_to_int() {
        let l = Val::Int(200, IntKind::U8);
        let r = Val::Int(100, IntKind::U8);
        assert_eq!(binary(BinaryOp::Add, &l, &r).unwrap(), Val::int(300));
    }

    #[test]
    fn test_int_overflow_wraps() {
        let l = Val::int(i32::MAX as i64);
        assert_eq!(
            binary(BinaryOp::Add, &l, &Val::int(1)).unwrap(),
            Val::int(i32::MIN as i64)
        );
    }

    #[test]
    fn test_mixed_int_float_is_float() {
        assert_eq!(
            binary(BinaryOp::Div, &Val::int(7), &Val::Float(2.0)).unwrap(),
            Val::Float(3.5)
        );
        assert_eq!(binary(BinaryOp::Div, &Val::int(7), &Val::int(2)).unwrap(), Val::int(3));
    }

    #[test]
    fn test_integer_division_by_zero() {
        let err = binary(BinaryOp::Mod, &Val::int(1), &Val::int(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn test_string_concatenation() {
        let v = binary(BinaryOp::Add, &Val::str("t="), &Val::Float(1.5)).unwrap();
        assert_eq!(v, Val::str("t=1.50"));
        let v = binary(BinaryOp::Add, &Val::int(3), &Val::str("x")).unwrap();
        assert_eq!(v, Val::str("3x"));
    }

    #[test]
    fn test_coerce_wraps_to_declared_width() {
        let ty = ValueType::from_name("byte");
        assert_eq!(coerce(Val::int(300), &ty).unwrap(), Val::Int(44, IntKind::U8));
        let ty = ValueType::from_name("int");
        assert_eq!(coerce(Val::Float(3.9), &ty).unwrap(), Val::int(3));
    }

    #[test]
    fn test_coerce_string_to_int_fails() {
        let err = coerce(Val::str("12"), &ValueType::Int(IntKind::I32)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Val::int(0).is_truthy());
        assert!(!Val::Float(0.0).is_truthy());
        assert!(!Val::str("").is_truthy());
        assert!(!Val::Null.is_truthy());
        assert!(Val::int(-3).is_truthy());
        assert!(Val::Char('a').is_truthy());
    }

    #[test]
    fn test_unsigned_shift_right_is_logical() {
        let v = Val::Int(0x8000_0000, IntKind::U32);
        assert_eq!(
            binary(BinaryOp::Shr, &v, &Val::int(31)).unwrap(),
            Val::Int(1, IntKind::U32)
        );
    }

    #[test]
    fn test_index_out_of_range() {
        let arr = Val::Array(vec![Val::int(1)]);
        let err = index_value(&arr, &Val::int(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexOutOfRange);
    }
}
