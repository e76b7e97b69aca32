//! Tests for loops, branches, switch, calls and short-circuit evaluation

use super::super::*;
use super::helpers::*;
use serde_json::{json, Value as JsonValue};

#[test]
fn test_while_with_break_and_continue() {
    // int i = 0; int odd = 0;
    // while (true) { i++; if (i > 6) break; if (i % 2 == 0) continue; odd += i; }
    let vm = run_setup(vec![
        decl("int", "i", Some(int(0))),
        decl("int", "odd", Some(int(0))),
        while_stmt(
            boolean(true),
            vec![
                expr_stmt(inc(ident("i"), false)),
                if_stmt(bin("Gt", ident("i"), int(6)), vec![brk()], None),
                if_stmt(
                    bin("Eq", bin("Mod", ident("i"), int(2)), int(0)),
                    vec![cont()],
                    None,
                ),
                expr_stmt(assign_op("Add", ident("odd"), ident("i"))),
            ],
        ),
    ]);

    assert_eq!(error_kind(&vm), None);
    assert_eq!(last_var(&vm, "odd"), Val::int(1 + 3 + 5));
    assert_eq!(last_var(&vm, "i"), Val::int(7));
}

#[test]
fn test_for_loop_sums() {
    // int sum = 0; for (int i = 1; i <= 4; i++) { sum += i; }
    let vm = run_setup(vec![
        decl("int", "sum", Some(int(0))),
        for_stmt(
            decl("int", "i", Some(int(1))),
            bin("Le", ident("i"), int(4)),
            inc(ident("i"), false),
            vec![expr_stmt(assign_op("Add", ident("sum"), ident("i")))],
        ),
    ]);

    assert_eq!(
        var_sets(&vm, "sum"),
        vec![Val::int(0), Val::int(1), Val::int(3), Val::int(6), Val::int(10)]
    );
}

#[test]
fn test_for_continue_runs_update() {
    // int hits = 0; for (int i = 0; i < 4; i++) { if (i == 1) continue; hits++; }
    let vm = run_setup(vec![
        decl("int", "hits", Some(int(0))),
        for_stmt(
            decl("int", "i", Some(int(0))),
            bin("Lt", ident("i"), int(4)),
            inc(ident("i"), false),
            vec![
                if_stmt(bin("Eq", ident("i"), int(1)), vec![cont()], None),
                expr_stmt(inc(ident("hits"), false)),
            ],
        ),
    ]);

    assert_eq!(error_kind(&vm), None);
    assert_eq!(last_var(&vm, "hits"), Val::int(3));
}

#[test]
fn test_do_while_runs_body_once() {
    // int n = 10; do { n++; } while (n < 5);
    let vm = run_setup(vec![
        decl("int", "n", Some(int(10))),
        do_while(vec![expr_stmt(inc(ident("n"), false))], bin("Lt", ident("n"), int(5))),
    ]);

    assert_eq!(var_sets(&vm, "n"), vec![Val::int(10), Val::int(11)]);
}

#[test]
fn test_if_else_branches() {
    // int a = 3; int r = 0; if (a > 5) { r = 1; } else { r = 2; }
    let vm = run_setup(vec![
        decl("int", "a", Some(int(3))),
        decl("int", "r", Some(int(0))),
        if_stmt(
            bin("Gt", ident("a"), int(5)),
            vec![expr_stmt(assign(ident("r"), int(1)))],
            Some(vec![expr_stmt(assign(ident("r"), int(2)))]),
        ),
    ]);

    assert_eq!(last_var(&vm, "r"), Val::int(2));
}

fn switch_on(value: i64) -> VM {
    // int x = value; int r = 0;
    // switch (x) { case 1: r += 1; case 2: r += 10; break; default: r += 100; }
    run_setup(vec![
        decl("int", "x", Some(int(value))),
        decl("int", "r", Some(int(0))),
        switch(
            ident("x"),
            vec![
                (
                    Some(int(1)),
                    vec![expr_stmt(assign_op("Add", ident("r"), int(1)))],
                ),
                (
                    Some(int(2)),
                    vec![expr_stmt(assign_op("Add", ident("r"), int(10))), brk()],
                ),
                (None, vec![expr_stmt(assign_op("Add", ident("r"), int(100)))]),
            ],
        ),
    ])
}

#[test]
fn test_switch_falls_through_until_break() {
    let vm = switch_on(1);
    assert_eq!(error_kind(&vm), None);
    assert_eq!(last_var(&vm, "r"), Val::int(11));
}

#[test]
fn test_switch_matches_later_case() {
    assert_eq!(last_var(&switch_on(2), "r"), Val::int(10));
}

#[test]
fn test_switch_takes_default() {
    assert_eq!(last_var(&switch_on(5), "r"), Val::int(100));
}

#[test]
fn test_switch_without_match_or_default() {
    // switch (x) { case 1: r = 1; }
    let vm = run_setup(vec![
        decl("int", "x", Some(int(9))),
        decl("int", "r", Some(int(0))),
        switch(
            ident("x"),
            vec![(Some(int(1)), vec![expr_stmt(assign(ident("r"), int(1)))])],
        ),
    ]);

    assert_eq!(error_kind(&vm), None);
    assert_eq!(var_sets(&vm, "r"), vec![Val::int(0)]);
}

#[test]
fn test_break_outside_loop_is_invalid() {
    let vm = run_setup(vec![brk()]);
    assert_eq!(error_kind(&vm), Some(ErrorKind::InvalidControlFlow));
}

#[test]
fn test_continue_inside_switch_without_loop_is_invalid() {
    let vm = run_setup(vec![switch(int(1), vec![(Some(int(1)), vec![cont()])])]);
    assert_eq!(error_kind(&vm), Some(ErrorKind::InvalidControlFlow));
}

#[test]
fn test_break_does_not_cross_function_boundary() {
    // void inner() { break; }
    // void setup() { while (true) { inner(); } }
    let vm = run_program(&program(vec![
        function("inner", vec![brk()]),
        function(
            "setup",
            vec![while_stmt(boolean(true), vec![expr_stmt(call("inner", vec![]))])],
        ),
    ]));

    assert_eq!(error_kind(&vm), Some(ErrorKind::InvalidControlFlow));
}

#[test]
fn test_function_return_value() {
    // int add(int a, int b) { return a + b; }
    // void setup() { int r = add(2, 40); }
    let vm = run_program(&program(vec![
        function_with(
            "add",
            "int",
            vec![("int", "a"), ("int", "b")],
            vec![ret(Some(bin("Add", ident("a"), ident("b"))))],
        ),
        function("setup", vec![decl("int", "r", Some(call("add", vec![int(2), int(40)])))]),
    ]));

    assert_eq!(last_var(&vm, "r"), Val::int(42));
}

#[test]
fn test_return_value_converted_to_return_type() {
    // byte wrap() { return 300; }
    let vm = run_program(&program(vec![
        function_with("wrap", "byte", vec![], vec![ret(Some(int(300)))]),
        function("setup", vec![decl("int", "r", Some(call("wrap", vec![])))]),
    ]));

    assert_eq!(last_var(&vm, "r"), Val::int(44));
}

#[test]
fn test_return_from_inside_loop() {
    // int first() { for (int i = 0; i < 10; i++) { if (i == 3) return i; } return -1; }
    let vm = run_program(&program(vec![
        function_with(
            "first",
            "int",
            vec![],
            vec![
                for_stmt(
                    decl("int", "i", Some(int(0))),
                    bin("Lt", ident("i"), int(10)),
                    inc(ident("i"), false),
                    vec![if_stmt(
                        bin("Eq", ident("i"), int(3)),
                        vec![ret(Some(ident("i")))],
                        None,
                    )],
                ),
                ret(Some(int(-1))),
            ],
        ),
        function("setup", vec![decl("int", "r", Some(call("first", vec![])))]),
    ]));

    assert_eq!(last_var(&vm, "r"), Val::int(3));
    assert_eq!(vm.call_depth, 0);
}

fn factorial() -> JsonValue {
    // long fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }
    function_with(
        "fact",
        "long",
        vec![("int", "n")],
        vec![
            if_stmt(bin("Le", ident("n"), int(1)), vec![ret(Some(int(1)))], None),
            ret(Some(bin(
                "Mul",
                ident("n"),
                call("fact", vec![bin("Sub", ident("n"), int(1))]),
            ))),
        ],
    )
}

#[test]
fn test_recursion() {
    let vm = run_program(&program(vec![
        factorial(),
        function("setup", vec![decl("long", "r", Some(call("fact", vec![int(10)])))]),
    ]));

    assert_eq!(error_kind(&vm), None);
    assert_eq!(last_var(&vm, "r"), Val::int(3_628_800));
}

#[test]
fn test_call_depth_exhaustion() {
    // void down() { down(); }
    let limits = Limits {
        max_call_depth: 16,
        ..Limits::default()
    };
    let mut vm = build_vm_with(
        &program(vec![
            function("down", vec![expr_stmt(call("down", vec![]))]),
            function("setup", vec![expr_stmt(call("down", vec![]))]),
        ]),
        limits,
    );
    run_with(&mut vm, &mut crate::gateway::DeterministicSource::new());

    assert_eq!(error_kind(&vm), Some(ErrorKind::ResourceExhaustion));
    assert_eq!(vm.call_depth, 0);
}

#[test]
fn test_short_circuit_skips_read() {
    // int ok = 0; if (ok && analogRead(A0) > 100) { ok = 2; } if (1 || digitalRead(2)) { ok = 3; }
    let vm = run_setup(vec![
        decl("int", "ok", Some(int(0))),
        if_stmt(
            logical(
                "And",
                ident("ok"),
                bin("Gt", call("analogRead", vec![ident("A0")]), int(100)),
            ),
            vec![expr_stmt(assign(ident("ok"), int(2)))],
            None,
        ),
        if_stmt(
            logical("Or", int(1), call("digitalRead", vec![int(2)])),
            vec![expr_stmt(assign(ident("ok"), int(3)))],
            None,
        ),
    ]);

    assert!(!kinds(&vm).contains(&"ANALOG_READ_REQUEST"));
    assert!(!kinds(&vm).contains(&"DIGITAL_READ_REQUEST"));
    assert_eq!(last_var(&vm, "ok"), Val::int(3));
}

#[test]
fn test_logical_yields_bool() {
    // bool both = 2 && 3; bool either = 0 || 0;
    let vm = run_setup(vec![
        decl("bool", "both", Some(logical("And", int(2), int(3)))),
        decl("bool", "either", Some(logical("Or", int(0), int(0)))),
    ]);

    assert_eq!(last_var(&vm, "both"), Val::Bool(true));
    assert_eq!(last_var(&vm, "either"), Val::Bool(false));
}

#[test]
fn test_ternary_evaluates_one_branch() {
    // int t = 5 > 3 ? 1 : analogRead(0);
    let vm = run_setup(vec![decl(
        "int",
        "t",
        Some(ternary(
            bin("Gt", int(5), int(3)),
            int(1),
            call("analogRead", vec![int(0)]),
        )),
    )]);

    assert_eq!(last_var(&vm, "t"), Val::int(1));
    assert!(!kinds(&vm).contains(&"ANALOG_READ_REQUEST"));
}

#[test]
fn test_function_reference_called_indirectly() {
    // int twice(int v) { return v * 2; }
    // void setup() { int r = (1 ? twice : twice)(4); }
    let vm = run_program(&program(vec![
        function_with(
            "twice",
            "int",
            vec![("int", "v")],
            vec![ret(Some(bin("Mul", ident("v"), int(2))))],
        ),
        function(
            "setup",
            vec![decl(
                "int",
                "r",
                Some(json!({
                    "t": "Call",
                    "callee": ternary(int(1), ident("twice"), ident("twice")),
                    "args": [int(4)]
                })),
            )],
        ),
    ]));

    assert_eq!(error_kind(&vm), None);
    assert_eq!(last_var(&vm, "r"), Val::int(8));
}
