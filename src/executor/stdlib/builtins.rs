//! Pure built-in functions
//!
//! Math helpers from the Arduino core and the `String` methods. None of these
//! touch the outside world, so they never emit records or suspend.

use crate::executor::errors::{ErrorInfo, ErrorKind};
use crate::executor::types::{BinaryOp, IntKind, Val};
use crate::executor::values::binary;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinOp {
    Map,
    Constrain,
    Min,
    Max,
    Abs,
    Sq,
    Sqrt,
    Pow,
    Sin,
    Cos,
    Tan,
    Floor,
    Ceil,
    Round,
    BitRead,
    Bit,
    LowByte,
    HighByte,
    /// `String(value)`, `String(value, base)`, `String(float, decimals)`
    ToString,
    StrLength,
    StrCharAt,
    StrIndexOf,
    StrSubstring,
    StrToInt,
    StrToFloat,
    StrToUpperCase,
    StrToLowerCase,
    StrTrim,
    StrEquals,
    StrStartsWith,
    StrEndsWith,
}

/// Evaluate `op`; for `String` methods `args[0]` is the receiver
pub fn apply(op: BuiltinOp, args: &[Val]) -> Result<Val, ErrorInfo> {
    match op {
        BuiltinOp::Map => {
            let x = int(args, 0)?;
            let (in_min, in_max) = (int(args, 1)?, int(args, 2)?);
            let (out_min, out_max) = (int(args, 3)?, int(args, 4)?);
            if in_max == in_min {
                return Err(ErrorInfo::new(
                    ErrorKind::DivisionByZero,
                    "map() called with an empty input range",
                ));
            }
            // 128-bit intermediate, wrapped to `long`
            let (x, in_min, in_max) = (x as i128, in_min as i128, in_max as i128);
            let (out_min, out_max) = (out_min as i128, out_max as i128);
            let v = (x - in_min)
                .wrapping_mul(out_max - out_min)
                .wrapping_div(in_max - in_min)
                .wrapping_add(out_min);
            Ok(Val::int(v as i64))
        }
        BuiltinOp::Constrain => {
            let (x, low, high) = (arg(args, 0)?, arg(args, 1)?, arg(args, 2)?);
            if binary(BinaryOp::Lt, x, low)?.is_truthy() {
                Ok(low.clone())
            } else if binary(BinaryOp::Gt, x, high)?.is_truthy() {
                Ok(high.clone())
            } else {
                Ok(x.clone())
            }
        }
        BuiltinOp::Min | BuiltinOp::Max => {
            let (a, b) = (arg(args, 0)?, arg(args, 1)?);
            let a_less = binary(BinaryOp::Lt, a, b)?.is_truthy();
            let pick_a = if op == BuiltinOp::Min { a_less } else { !a_less };
            Ok(if pick_a { a.clone() } else { b.clone() })
        }
        BuiltinOp::Abs => match arg(args, 0)? {
            Val::Float(f) => Ok(Val::Float(f.abs())),
            Val::Int(v, kind) => Ok(Val::Int(kind.wrap(v.wrapping_abs()), *kind)),
            other => Ok(Val::int(number(other)?.abs() as i64)),
        },
        BuiltinOp::Sq => {
            let x = arg(args, 0)?;
            binary(BinaryOp::Mul, x, x)
        }
        BuiltinOp::Sqrt => Ok(Val::Float(float(args, 0)?.sqrt())),
        BuiltinOp::Pow => Ok(Val::Float(float(args, 0)?.powf(float(args, 1)?))),
        BuiltinOp::Sin => Ok(Val::Float(float(args, 0)?.sin())),
        BuiltinOp::Cos => Ok(Val::Float(float(args, 0)?.cos())),
        BuiltinOp::Tan => Ok(Val::Float(float(args, 0)?.tan())),
        BuiltinOp::Floor => Ok(Val::Float(float(args, 0)?.floor())),
        BuiltinOp::Ceil => Ok(Val::Float(float(args, 0)?.ceil())),
        BuiltinOp::Round => Ok(Val::int(float(args, 0)?.round() as i64)),
        BuiltinOp::BitRead => {
            let (x, n) = (int(args, 0)?, int(args, 1)?);
            Ok(Val::int((x >> n.clamp(0, 63)) & 1))
        }
        BuiltinOp::Bit => {
            let n = int(args, 0)?;
            let v = if (0..32).contains(&n) { 1i64 << n } else { 0 };
            Ok(Val::Int(v, IntKind::U32))
        }
        BuiltinOp::LowByte => Ok(Val::Int(int(args, 0)? & 0xff, IntKind::U8)),
        BuiltinOp::HighByte => Ok(Val::Int((int(args, 0)? >> 8) & 0xff, IntKind::U8)),
        BuiltinOp::ToString => to_string(args),
        BuiltinOp::StrLength => Ok(Val::int(text(args, 0)?.chars().count() as i64)),
        BuiltinOp::StrCharAt => {
            let s = text(args, 0)?;
            let i = int(args, 1)?;
            let c = usize::try_from(i).ok().and_then(|i| s.chars().nth(i));
            Ok(Val::Char(c.unwrap_or('\0')))
        }
        BuiltinOp::StrIndexOf => {
            let s = text(args, 0)?;
            let needle = match arg(args, 1)? {
                Val::Char(c) => c.to_string(),
                Val::Str(n) => n.clone(),
                other => return Err(expected("String or char", other)),
            };
            let pos = s
                .find(&needle)
                .map(|byte| s[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Val::int(pos))
        }
        BuiltinOp::StrSubstring => {
            let chars: Vec<char> = text(args, 0)?.chars().collect();
            let len = chars.len() as i64;
            let from = int(args, 1)?.clamp(0, len);
            let to = match args.get(2) {
                Some(v) => number(v)?.trunc() as i64,
                None => len,
            }
            .clamp(0, len);
            let (from, to) = if from <= to { (from, to) } else { (to, from) };
            Ok(Val::Str(chars[from as usize..to as usize].iter().collect()))
        }
        BuiltinOp::StrToInt => Ok(Val::int(leading_int(text(args, 0)?))),
        BuiltinOp::StrToFloat => Ok(Val::Float(leading_float(text(args, 0)?))),
        BuiltinOp::StrToUpperCase => Ok(Val::Str(text(args, 0)?.to_uppercase())),
        BuiltinOp::StrToLowerCase => Ok(Val::Str(text(args, 0)?.to_lowercase())),
        BuiltinOp::StrTrim => Ok(Val::Str(text(args, 0)?.trim().to_string())),
        BuiltinOp::StrEquals => Ok(Val::Bool(text(args, 0)? == text(args, 1)?)),
        BuiltinOp::StrStartsWith => Ok(Val::Bool(text(args, 0)?.starts_with(text(args, 1)?))),
        BuiltinOp::StrEndsWith => Ok(Val::Bool(text(args, 0)?.ends_with(text(args, 1)?))),
    }
}

fn to_string(args: &[Val]) -> Result<Val, ErrorInfo> {
    let Some(value) = args.first() else {
        return Ok(Val::Str(String::new()));
    };
    let Some(extra) = args.get(1) else {
        return Ok(Val::Str(value.to_string()));
    };
    let extra = number(extra)?.trunc() as i64;
    match value {
        Val::Float(f) => {
            let decimals = extra.clamp(0, 16) as usize;
            Ok(Val::Str(format!("{f:.decimals$}")))
        }
        Val::Int(v, kind) => {
            // negative values print as their unsigned bit pattern, like the AVR core
            let bits = if *v < 0 {
                (*v as u64) & mask(kind.bits())
            } else {
                *v as u64
            };
            let rendered = match extra {
                2 => format!("{bits:b}"),
                8 => format!("{bits:o}"),
                16 => format!("{bits:x}"),
                10 => v.to_string(),
                other => {
                    return Err(ErrorInfo::type_mismatch(format!(
                        "unsupported base {other} for String()"
                    )))
                }
            };
            Ok(Val::Str(rendered))
        }
        other => Ok(Val::Str(other.to_string())),
    }
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// `atol` semantics: optional sign and leading digits, 0 when there are none
fn leading_int(s: &str) -> i64 {
    let trimmed = s.trim_start();
    let end = trimmed
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    trimmed[..end].parse::<i64>().unwrap_or(0)
}

fn leading_float(s: &str) -> f64 {
    let trimmed = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in trimmed.char_indices() {
        let ok = c.is_ascii_digit()
            || (i == 0 && (c == '-' || c == '+'))
            || (c == '.' && !seen_dot);
        if !ok {
            break;
        }
        seen_dot |= c == '.';
        end = i + c.len_utf8();
    }
    trimmed[..end].parse::<f64>().unwrap_or(0.0)
}

/* ===================== Argument Helpers ===================== */

fn arg(args: &[Val], i: usize) -> Result<&Val, ErrorInfo> {
    args.get(i).ok_or_else(|| {
        ErrorInfo::new(
            ErrorKind::ArityMismatch,
            format!("missing argument {}", i + 1),
        )
    })
}

fn number(val: &Val) -> Result<f64, ErrorInfo> {
    val.as_f64().ok_or_else(|| expected("number", val))
}

fn int(args: &[Val], i: usize) -> Result<i64, ErrorInfo> {
    let v = arg(args, i)?;
    v.as_i64().ok_or_else(|| expected("integer", v))
}

fn float(args: &[Val], i: usize) -> Result<f64, ErrorInfo> {
    number(arg(args, i)?)
}

fn text(args: &[Val], i: usize) -> Result<&str, ErrorInfo> {
    match arg(args, i)? {
        Val::Str(s) => Ok(s),
        other => Err(expected("String", other)),
    }
}

fn expected(what: &str, got: &Val) -> ErrorInfo {
    ErrorInfo::type_mismatch(format!("expected {what}, got {}", got.type_name()))
}
