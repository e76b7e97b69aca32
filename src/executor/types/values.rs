//! Runtime value types
//!
//! Values serialize to plain JSON so that `VAR_SET` records carry what a host
//! would print: numbers as numbers, arrays as arrays, structs as objects.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

/* ===================== Integer Kinds ===================== */

/// Width and signedness of an integer value
///
/// `int` and `long` are 32-bit on the simulated board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
}

impl IntKind {
    pub fn bits(self) -> u32 {
        match self {
            IntKind::I8 | IntKind::U8 => 8,
            IntKind::I16 | IntKind::U16 => 16,
            IntKind::I32 | IntKind::U32 => 32,
            IntKind::I64 => 64,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IntKind::I8 | IntKind::I16 | IntKind::I32 | IntKind::I64)
    }

    /// Conversion rank; anything narrower than `int` promotes to `int`
    pub fn rank(self) -> u8 {
        match self {
            IntKind::I8 | IntKind::U8 | IntKind::I16 | IntKind::U16 => 0,
            IntKind::I32 => 1,
            IntKind::U32 => 2,
            IntKind::I64 => 3,
        }
    }

    /// Truncate `v` to this width with two's-complement wraparound
    pub fn wrap(self, v: i64) -> i64 {
        match self {
            IntKind::I8 => v as i8 as i64,
            IntKind::U8 => v as u8 as i64,
            IntKind::I16 => v as i16 as i64,
            IntKind::U16 => v as u16 as i64,
            IntKind::I32 => v as i32 as i64,
            IntKind::U32 => v as u32 as i64,
            IntKind::I64 => v,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IntKind::I8 => "int8_t",
            IntKind::U8 => "byte",
            IntKind::I16 => "short",
            IntKind::U16 => "word",
            IntKind::I32 => "int",
            IntKind::U32 => "unsigned long",
            IntKind::I64 => "long long",
        }
    }
}

/* ===================== Declared Types ===================== */

/// Declared type of a binding, resolved from a source type spelling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum ValueType {
    Void,
    Bool,
    Char,
    Int(IntKind),
    Float,
    Str,
    /// User struct or library class
    Named(String),
    Array(Box<ValueType>),
}

impl ValueType {
    /// Resolve a C/Arduino type spelling
    pub fn from_name(name: &str) -> ValueType {
        let words: Vec<&str> = name.split_whitespace().filter(|w| *w != "const").collect();
        let spelled = words.join(" ");
        match spelled.as_str() {
            "void" => ValueType::Void,
            "bool" | "boolean" => ValueType::Bool,
            "char" | "signed char" => ValueType::Char,
            "int8_t" => ValueType::Int(IntKind::I8),
            "byte" | "uint8_t" | "unsigned char" => ValueType::Int(IntKind::U8),
            "short" | "int16_t" | "short int" => ValueType::Int(IntKind::I16),
            "word" | "uint16_t" | "unsigned short" => ValueType::Int(IntKind::U16),
            "int" | "long" | "int32_t" | "signed" | "signed int" | "long int" | "size_t" => {
                ValueType::Int(IntKind::I32)
            }
            "unsigned" | "unsigned int" | "unsigned long" | "uint32_t" | "unsigned long int" => {
                ValueType::Int(IntKind::U32)
            }
            "long long" | "int64_t" | "uint64_t" | "unsigned long long" => {
                ValueType::Int(IntKind::I64)
            }
            "float" | "double" | "long double" => ValueType::Float,
            "String" | "string" | "char*" | "char *" => ValueType::Str,
            other => ValueType::Named(other.to_string()),
        }
    }

    /// Wrap in `depth` array levels
    pub fn array_of(self, depth: usize) -> ValueType {
        (0..depth).fold(self, |ty, _| ValueType::Array(Box::new(ty)))
    }

    /// Innermost element type of an array type
    pub fn element(&self) -> &ValueType {
        match self {
            ValueType::Array(inner) => inner.element(),
            other => other,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Void => write!(f, "void"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Char => write!(f, "char"),
            ValueType::Int(kind) => write!(f, "{}", kind.name()),
            ValueType::Float => write!(f, "float"),
            ValueType::Str => write!(f, "String"),
            ValueType::Named(name) => write!(f, "{name}"),
            ValueType::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

/* ===================== Values ===================== */

/// Instance of a user struct or library class
#[derive(Debug, Clone, PartialEq)]
pub struct StructVal {
    pub type_name: String,
    pub fields: IndexMap<String, Val>,
}

/// Runtime value type
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Null,
    Bool(bool),
    Char(char),
    Int(i64, IntKind),
    Float(f64),
    Str(String),
    Array(Vec<Val>),
    Struct(StructVal),
    /// Reference to a user-defined function, by name
    Func(String),
}

impl Val {
    /// An `int`
    pub fn int(v: i64) -> Val {
        Val::Int(IntKind::I32.wrap(v), IntKind::I32)
    }

    pub fn str(s: impl Into<String>) -> Val {
        Val::Str(s.into())
    }

    /// Check if value is truthy (for conditionals)
    ///
    /// Zero, `'\0'`, null, the empty string and the empty array are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Char(c) => *c != '\0',
            Val::Int(v, _) => *v != 0,
            Val::Float(f) => *f != 0.0,
            Val::Str(s) => !s.is_empty(),
            Val::Array(items) => !items.is_empty(),
            Val::Struct(_) | Val::Func(_) => true,
        }
    }

    /// Name used in error messages and for method dispatch
    pub fn type_name(&self) -> String {
        match self {
            Val::Null => "null".to_string(),
            Val::Bool(_) => "bool".to_string(),
            Val::Char(_) => "char".to_string(),
            Val::Int(_, kind) => kind.name().to_string(),
            Val::Float(_) => "float".to_string(),
            Val::Str(_) => "String".to_string(),
            Val::Array(_) => "array".to_string(),
            Val::Struct(s) => s.type_name.clone(),
            Val::Func(_) => "function".to_string(),
        }
    }

    /// Integer view of a scalar, if it has one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Val::Bool(b) => Some(*b as i64),
            Val::Char(c) => Some(*c as i64),
            Val::Int(v, _) => Some(*v),
            Val::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Val::Float(f) => Some(*f),
            other => other.as_i64().map(|v| v as f64),
        }
    }
}

/// Arduino `String(...)` rendering: floats with two decimals, bools as 1/0
impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Null => Ok(()),
            Val::Bool(b) => write!(f, "{}", *b as u8),
            Val::Char(c) => write!(f, "{c}"),
            Val::Int(v, _) => write!(f, "{v}"),
            Val::Float(x) => write!(f, "{x:.2}"),
            Val::Str(s) => write!(f, "{s}"),
            Val::Array(items) => {
                // char arrays print as their text up to the terminator
                if items.iter().all(|v| matches!(v, Val::Char(_))) {
                    for item in items {
                        match item {
                            Val::Char('\0') => break,
                            other => write!(f, "{other}")?,
                        }
                    }
                    Ok(())
                } else {
                    write!(f, "{}", JsonValue::from(self))
                }
            }
            Val::Struct(_) => write!(f, "{}", JsonValue::from(self)),
            Val::Func(name) => write!(f, "{name}"),
        }
    }
}

/* ===================== JSON Conversion ===================== */

impl From<&Val> for JsonValue {
    fn from(val: &Val) -> Self {
        match val {
            Val::Null => JsonValue::Null,
            Val::Bool(b) => JsonValue::Bool(*b),
            Val::Char(c) => JsonValue::String(c.to_string()),
            Val::Int(v, _) => JsonValue::from(*v),
            Val::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Val::Str(s) => JsonValue::String(s.clone()),
            Val::Array(items) => JsonValue::Array(items.iter().map(JsonValue::from).collect()),
            Val::Struct(s) => JsonValue::Object(
                s.fields
                    .iter()
                    .map(|(k, v)| (k.clone(), JsonValue::from(v)))
                    .collect(),
            ),
            Val::Func(name) => JsonValue::String(name.clone()),
        }
    }
}

/// Host-supplied JSON: integers become `int` (or `long long` when they do not
/// fit in 32 bits, `float` beyond 64 bits), objects become anonymous structs.
impl From<JsonValue> for Val {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Val::Null,
            JsonValue::Bool(b) => Val::Bool(b),
            JsonValue::Number(n) => {
                if let Some(v) = n.as_i64() {
                    if i32::try_from(v).is_ok() {
                        Val::Int(v, IntKind::I32)
                    } else {
                        Val::Int(v, IntKind::I64)
                    }
                } else {
                    // beyond `long long`: keep the magnitude as a float
                    Val::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Val::Str(s),
            JsonValue::Array(items) => Val::Array(items.into_iter().map(Val::from).collect()),
            JsonValue::Object(map) => Val::Struct(StructVal {
                type_name: "struct".to_string(),
                fields: map.into_iter().map(|(k, v)| (k, Val::from(v))).collect(),
            }),
        }
    }
}

impl Serialize for Val {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        JsonValue::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Val {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Val::from)
    }
}
