//! Test helpers for executor tests
//!
//! Builders for program trees in the JSON form the host supplies, plus
//! utilities to run a VM to the end and inspect its command log.

use crate::executor::errors::ErrorKind;
use crate::executor::exec_loop::run_until_blocked;
use crate::executor::outbox::Command;
use crate::executor::stdlib::Catalog;
use crate::executor::types::{Control, Program, Val};
use crate::executor::vm::{Limits, Step, VM};
use crate::gateway::{DataSource, DeterministicSource};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

/* ===================== Tree Builders ===================== */

/// Deserialize a program from its items, as the host would hand it over
pub fn program(items: Vec<JsonValue>) -> Program {
    let json = json!({ "items": items });
    serde_json::from_value(json).expect("Program deserialization failed")
}

/// `void name() { body }`
pub fn function(name: &str, body: Vec<JsonValue>) -> JsonValue {
    json!({ "t": "Function", "name": name, "body": block(body) })
}

/// `ret name(ty param, ...) { body }`
pub fn function_with(
    name: &str,
    ret: &str,
    params: Vec<(&str, &str)>,
    body: Vec<JsonValue>,
) -> JsonValue {
    let params: Vec<JsonValue> = params
        .into_iter()
        .map(|(ty, name)| json!({ "name": name, "ty": { "name": ty } }))
        .collect();
    json!({
        "t": "Function",
        "name": name,
        "ret": { "name": ret },
        "params": params,
        "body": block(body)
    })
}

pub fn struct_def(name: &str, fields: Vec<(&str, &str)>) -> JsonValue {
    let fields: Vec<JsonValue> = fields
        .into_iter()
        .map(|(ty, name)| json!({ "name": name, "ty": { "name": ty } }))
        .collect();
    json!({ "t": "Struct", "name": name, "fields": fields })
}

/// A global declaration item
pub fn global(decl: JsonValue) -> JsonValue {
    json!({ "t": "Global", "decl": decl })
}

/// `ty name = init;`
pub fn decl(ty: &str, name: &str, init: Option<JsonValue>) -> JsonValue {
    let mut declarator = json!({ "name": name });
    if let Some(init) = init {
        declarator["init"] = init;
    }
    json!({ "t": "VarDecl", "ty": { "name": ty }, "declarators": [declarator] })
}

/// `const ty name = init;`
pub fn const_decl(ty: &str, name: &str, init: JsonValue) -> JsonValue {
    json!({
        "t": "VarDecl",
        "ty": { "name": ty, "const": true },
        "declarators": [{ "name": name, "init": init }]
    })
}

/// `ty name[dims...] = init;`
pub fn array_decl(
    ty: &str,
    name: &str,
    dims: Vec<Option<JsonValue>>,
    init: Option<JsonValue>,
) -> JsonValue {
    let mut declarator = json!({ "name": name, "dims": dims });
    if let Some(init) = init {
        declarator["init"] = init;
    }
    json!({ "t": "VarDecl", "ty": { "name": ty }, "declarators": [declarator] })
}

pub fn block(body: Vec<JsonValue>) -> JsonValue {
    json!({ "t": "Block", "body": body })
}

pub fn expr_stmt(expr: JsonValue) -> JsonValue {
    json!({ "t": "Expr", "expr": expr })
}

pub fn if_stmt(test: JsonValue, then_s: Vec<JsonValue>, else_s: Option<Vec<JsonValue>>) -> JsonValue {
    let mut stmt = json!({ "t": "If", "test": test, "then_s": block(then_s) });
    if let Some(else_s) = else_s {
        stmt["else_s"] = block(else_s);
    }
    stmt
}

pub fn while_stmt(test: JsonValue, body: Vec<JsonValue>) -> JsonValue {
    json!({ "t": "While", "test": test, "body": block(body) })
}

pub fn do_while(body: Vec<JsonValue>, test: JsonValue) -> JsonValue {
    json!({ "t": "DoWhile", "body": block(body), "test": test })
}

pub fn for_stmt(
    init: JsonValue,
    test: JsonValue,
    update: JsonValue,
    body: Vec<JsonValue>,
) -> JsonValue {
    json!({ "t": "For", "init": init, "test": test, "update": update, "body": block(body) })
}

/// `switch (discriminant)`; a `None` label is `default:`
pub fn switch(discriminant: JsonValue, cases: Vec<(Option<JsonValue>, Vec<JsonValue>)>) -> JsonValue {
    let cases: Vec<JsonValue> = cases
        .into_iter()
        .map(|(test, body)| match test {
            Some(test) => json!({ "test": test, "body": body }),
            None => json!({ "body": body }),
        })
        .collect();
    json!({ "t": "Switch", "discriminant": discriminant, "cases": cases })
}

pub fn ret(value: Option<JsonValue>) -> JsonValue {
    match value {
        Some(value) => json!({ "t": "Return", "value": value }),
        None => json!({ "t": "Return" }),
    }
}

pub fn brk() -> JsonValue {
    json!({ "t": "Break" })
}

pub fn cont() -> JsonValue {
    json!({ "t": "Continue" })
}

pub fn int(v: i64) -> JsonValue {
    json!({ "t": "LitInt", "v": v })
}

pub fn float(v: f64) -> JsonValue {
    json!({ "t": "LitFloat", "v": v })
}

pub fn boolean(v: bool) -> JsonValue {
    json!({ "t": "LitBool", "v": v })
}

pub fn chr(v: char) -> JsonValue {
    json!({ "t": "LitChar", "v": v })
}

pub fn string(v: &str) -> JsonValue {
    json!({ "t": "LitStr", "v": v })
}

pub fn ident(name: &str) -> JsonValue {
    json!({ "t": "Ident", "name": name })
}

pub fn bin(op: &str, left: JsonValue, right: JsonValue) -> JsonValue {
    json!({ "t": "Binary", "op": op, "left": left, "right": right })
}

pub fn logical(op: &str, left: JsonValue, right: JsonValue) -> JsonValue {
    json!({ "t": "Logical", "op": op, "left": left, "right": right })
}

pub fn unary(op: &str, operand: JsonValue) -> JsonValue {
    json!({ "t": "Unary", "op": op, "operand": operand })
}

pub fn ternary(condition: JsonValue, consequent: JsonValue, alternate: JsonValue) -> JsonValue {
    json!({ "t": "Ternary", "condition": condition, "consequent": consequent, "alternate": alternate })
}

pub fn cast(ty: &str, expr: JsonValue) -> JsonValue {
    json!({ "t": "Cast", "ty": { "name": ty }, "expr": expr })
}

/// `target = value`
pub fn assign(target: JsonValue, value: JsonValue) -> JsonValue {
    assign_op("Assign", target, value)
}

/// `target op= value`
pub fn assign_op(op: &str, target: JsonValue, value: JsonValue) -> JsonValue {
    json!({ "t": "Assign", "op": op, "target": target, "value": value })
}

/// `target++` / `++target`
pub fn inc(target: JsonValue, prefix: bool) -> JsonValue {
    json!({ "t": "Update", "op": "Inc", "prefix": prefix, "target": target })
}

pub fn dec(target: JsonValue, prefix: bool) -> JsonValue {
    json!({ "t": "Update", "op": "Dec", "prefix": prefix, "target": target })
}

/// `name(args...)`
pub fn call(name: &str, args: Vec<JsonValue>) -> JsonValue {
    json!({ "t": "Call", "callee": ident(name), "args": args })
}

/// `object.name(args...)`
pub fn method(object: &str, name: &str, args: Vec<JsonValue>) -> JsonValue {
    json!({ "t": "Call", "callee": member(ident(object), name), "args": args })
}

pub fn index(object: JsonValue, index: JsonValue) -> JsonValue {
    json!({ "t": "Index", "object": object, "index": index })
}

pub fn member(object: JsonValue, property: &str) -> JsonValue {
    json!({ "t": "Member", "object": object, "property": property })
}

pub fn init_list(elements: Vec<JsonValue>) -> JsonValue {
    json!({ "t": "InitList", "elements": elements })
}

/* ===================== Running ===================== */

pub fn arduino() -> Arc<Catalog> {
    Arc::new(Catalog::arduino().expect("Bundled catalog failed to load"))
}

pub fn build_vm(program: &Program) -> VM {
    VM::new(program, arduino(), Limits::default())
}

pub fn build_vm_with(program: &Program, limits: Limits) -> VM {
    VM::new(program, arduino(), limits)
}

/// Run to the end, answering every request from `source` inline
pub fn run_with(vm: &mut VM, source: &mut dyn DataSource) {
    loop {
        match run_until_blocked(vm) {
            Step::Suspend => {
                let awaiting = vm.awaiting.clone().expect("Suspended without a request");
                let value = source
                    .get_value(&awaiting.request)
                    .expect("Data source failed");
                assert!(vm.resume(value), "VM was not waiting");
            }
            Step::Done | Step::Continue => break,
        }
    }
}

/// Build a VM for `program` and run it with the deterministic source
pub fn run_program(program: &Program) -> VM {
    let mut vm = build_vm(program);
    run_with(&mut vm, &mut DeterministicSource::new());
    vm
}

/// Run a sketch whose only content is `setup()` with `body`
pub fn run_setup(body: Vec<JsonValue>) -> VM {
    run_program(&program(vec![function("setup", body)]))
}

/* ===================== Inspection ===================== */

pub fn commands(vm: &VM) -> Vec<Command> {
    vm.outbox.records().iter().map(|r| r.command.clone()).collect()
}

pub fn kinds(vm: &VM) -> Vec<&'static str> {
    vm.outbox.records().iter().map(|r| r.command.kind()).collect()
}

/// Values recorded for `variable`, in emission order
pub fn var_sets(vm: &VM, variable: &str) -> Vec<Val> {
    vm.outbox
        .records()
        .iter()
        .filter_map(|r| match &r.command {
            Command::VarSet { variable: v, value } if v == variable => Some(value.clone()),
            _ => None,
        })
        .collect()
}

/// Last value recorded for `variable`
pub fn last_var(vm: &VM, variable: &str) -> Val {
    var_sets(vm, variable)
        .pop()
        .unwrap_or_else(|| panic!("No VAR_SET for {variable}"))
}

/// Kind of the error that ended the run, if any
pub fn error_kind(vm: &VM) -> Option<ErrorKind> {
    match &vm.control {
        Control::Throw(err) => Some(err.kind),
        _ => None,
    }
}

pub fn int_array(values: &[i64]) -> Val {
    Val::Array(values.iter().map(|v| Val::int(*v)).collect())
}
