//! Library dispatch
//!
//! Turns a recognized library call plus its evaluated arguments into the
//! records it emits and the value it returns. The catalog decides what a call
//! means; this module only applies the matched rule.

pub mod builtins;
pub mod catalog;

pub use catalog::{Catalog, CatalogEntry, CatalogError, RecordKind, RequestKind, Rule};

use super::errors::ErrorInfo;
use super::outbox::Command;
use super::types::{StructVal, Val};
use crate::gateway::IoRequest;

/* ===================== Dispatch Types ===================== */

/// Who a library call is addressed to
#[derive(Debug, Clone, Copy, Default)]
pub struct CallSite<'a> {
    /// Class or static object the catalog is keyed by (`Serial`, `Servo`,
    /// `String`); `None` for free functions
    pub receiver: Option<&'a str>,
    /// Variable the method was called on, used to name the call in records
    pub instance: Option<&'a str>,
    /// Receiver value for method calls on values
    pub this: Option<&'a Val>,
}

/// How a dispatched call completes
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Value(Val),
    /// The result must come from outside; the executor suspends on it
    Await(IoRequest),
    Halt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub records: Vec<Command>,
    pub outcome: CallOutcome,
}

impl Dispatch {
    fn value(v: Val) -> Self {
        Self {
            records: Vec::new(),
            outcome: CallOutcome::Value(v),
        }
    }
}

/* ===================== Dispatcher ===================== */

/// Resolve and apply a library call
pub fn dispatch(
    catalog: &Catalog,
    site: CallSite<'_>,
    name: &str,
    args: &[Val],
) -> Result<Dispatch, ErrorInfo> {
    let entry = catalog.lookup(site.receiver, name, args.len())?;

    match &entry.rule {
        Rule::Emit { record, returns } => {
            let function = qualified_name(site, name);
            let command = build_record(*record, function, args)?;
            Ok(Dispatch {
                records: vec![command],
                outcome: CallOutcome::Value(returns.clone().unwrap_or(Val::Null)),
            })
        }
        Rule::Read { request } => {
            let request = build_request(*request, site.receiver, name, args)?;
            Ok(Dispatch {
                records: Vec::new(),
                outcome: CallOutcome::Await(request),
            })
        }
        Rule::Builtin { op } => {
            let result = match site.this {
                Some(this) => {
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(this.clone());
                    full.extend_from_slice(args);
                    builtins::apply(*op, &full)?
                }
                None => builtins::apply(*op, args)?,
            };
            Ok(Dispatch::value(result))
        }
        Rule::Construct { fields } => {
            let fields = fields
                .iter()
                .enumerate()
                .map(|(i, f)| (f.clone(), args.get(i).cloned().unwrap_or(Val::Null)))
                .collect();
            Ok(Dispatch::value(Val::Struct(StructVal {
                type_name: entry.name.clone(),
                fields,
            })))
        }
        Rule::Halt => Ok(Dispatch {
            records: Vec::new(),
            outcome: CallOutcome::Halt,
        }),
    }
}

/// Build a library object for `Servo s;` style declarations
pub fn construct(catalog: &Catalog, class: &str, args: &[Val]) -> Result<Val, ErrorInfo> {
    match dispatch(catalog, CallSite::default(), class, args)?.outcome {
        CallOutcome::Value(v) => Ok(v),
        _ => Err(ErrorInfo::type_mismatch(format!(
            "'{class}' is not a constructible class"
        ))),
    }
}

fn qualified_name(site: CallSite<'_>, name: &str) -> String {
    match site.instance.or(site.receiver) {
        Some(owner) => format!("{owner}.{name}"),
        None => name.to_string(),
    }
}

fn int_arg(args: &[Val], i: usize, name: &str) -> Result<i64, ErrorInfo> {
    let v = args
        .get(i)
        .ok_or_else(|| ErrorInfo::arity(name, format!("at least {}", i + 1), args.len()))?;
    v.as_i64().ok_or_else(|| {
        ErrorInfo::type_mismatch(format!(
            "argument {} of '{name}' must be numeric, got {}",
            i + 1,
            v.type_name()
        ))
    })
}

fn opt_int_arg(args: &[Val], i: usize, name: &str) -> Result<Option<i64>, ErrorInfo> {
    if i < args.len() {
        int_arg(args, i, name).map(Some)
    } else {
        Ok(None)
    }
}

fn build_record(kind: RecordKind, function: String, args: &[Val]) -> Result<Command, ErrorInfo> {
    let name = function.as_str();
    let command = match kind {
        RecordKind::PinMode => Command::PinMode {
            pin: int_arg(args, 0, name)?,
            mode: int_arg(args, 1, name)?,
        },
        RecordKind::DigitalWrite => Command::DigitalWrite {
            pin: int_arg(args, 0, name)?,
            value: int_arg(args, 1, name)?,
        },
        RecordKind::AnalogWrite => Command::AnalogWrite {
            pin: int_arg(args, 0, name)?,
            value: int_arg(args, 1, name)?,
        },
        RecordKind::Delay => Command::Delay {
            duration: int_arg(args, 0, name)?,
        },
        RecordKind::DelayMicroseconds => Command::DelayMicroseconds {
            duration: int_arg(args, 0, name)?,
        },
        RecordKind::Tone => Command::Tone {
            pin: int_arg(args, 0, name)?,
            frequency: int_arg(args, 1, name)?,
            duration: opt_int_arg(args, 2, name)?,
        },
        RecordKind::NoTone => Command::NoTone {
            pin: int_arg(args, 0, name)?,
        },
        RecordKind::FunctionCall => Command::FunctionCall {
            arguments: args.to_vec(),
            function,
        },
    };
    Ok(command)
}

fn build_request(
    kind: RequestKind,
    receiver: Option<&str>,
    name: &str,
    args: &[Val],
) -> Result<IoRequest, ErrorInfo> {
    let request = match kind {
        RequestKind::AnalogRead => IoRequest::AnalogRead {
            pin: int_arg(args, 0, name)?,
        },
        RequestKind::DigitalRead => IoRequest::DigitalRead {
            pin: int_arg(args, 0, name)?,
        },
        RequestKind::Millis => IoRequest::Millis,
        RequestKind::Micros => IoRequest::Micros,
        RequestKind::PulseIn => IoRequest::PulseIn {
            pin: int_arg(args, 0, name)?,
            state: int_arg(args, 1, name)?,
            timeout: opt_int_arg(args, 2, name)?.unwrap_or(1_000_000),
        },
        RequestKind::LibrarySensor => IoRequest::LibrarySensor {
            library: receiver.unwrap_or_default().to_string(),
            method: name.to_string(),
            arg: opt_int_arg(args, 0, name)?.unwrap_or(0),
        },
    };
    Ok(request)
}
