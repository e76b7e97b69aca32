//! Tests for library dispatch through the catalog

use super::super::*;
use super::helpers::*;
use maplit::hashmap;

#[test]
fn test_serial_println_is_recorded() {
    // Serial.begin(9600); Serial.println("ready"); Serial.print(3.5);
    let vm = run_setup(vec![
        expr_stmt(method("Serial", "begin", vec![int(9600)])),
        expr_stmt(method("Serial", "println", vec![string("ready")])),
        expr_stmt(method("Serial", "print", vec![float(3.5)])),
    ]);

    let calls: Vec<Command> = commands(&vm)
        .into_iter()
        .filter(|c| matches!(c, Command::FunctionCall { .. }))
        .collect();
    assert_eq!(
        calls,
        vec![
            Command::FunctionCall {
                function: "Serial.begin".into(),
                arguments: vec![Val::int(9600)],
            },
            Command::FunctionCall {
                function: "Serial.println".into(),
                arguments: vec![Val::str("ready")],
            },
            Command::FunctionCall {
                function: "Serial.print".into(),
                arguments: vec![Val::Float(3.5)],
            },
        ]
    );
}

#[test]
fn test_serial_return_values() {
    // int n = Serial.available(); int c = Serial.read();
    let vm = run_setup(vec![
        decl("int", "n", Some(method("Serial", "available", vec![]))),
        decl("int", "c", Some(method("Serial", "read", vec![]))),
    ]);

    assert_eq!(last_var(&vm, "n"), Val::int(0));
    assert_eq!(last_var(&vm, "c"), Val::int(-1));
}

#[test]
fn test_servo_methods_named_by_instance() {
    // Servo s; void setup() { s.attach(9); s.write(90); }
    let vm = run_program(&program(vec![
        global(decl("Servo", "s", None)),
        function(
            "setup",
            vec![
                expr_stmt(method("s", "attach", vec![int(9)])),
                expr_stmt(method("s", "write", vec![int(90)])),
            ],
        ),
    ]));

    assert_eq!(error_kind(&vm), None);
    let names: Vec<String> = commands(&vm)
        .into_iter()
        .filter_map(|c| match c {
            Command::FunctionCall { function, .. } => Some(function),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["s.attach", "s.write"]);
}

#[test]
fn test_pin_commands() {
    // pinMode(9, OUTPUT); analogWrite(9, 128); tone(8, 440, 200); noTone(8); delayMicroseconds(50);
    let vm = run_setup(vec![
        expr_stmt(call("pinMode", vec![int(9), ident("OUTPUT")])),
        expr_stmt(call("analogWrite", vec![int(9), int(128)])),
        expr_stmt(call("tone", vec![int(8), int(440), int(200)])),
        expr_stmt(call("tone", vec![int(8), int(880)])),
        expr_stmt(call("noTone", vec![int(8)])),
        expr_stmt(call("delayMicroseconds", vec![int(50)])),
    ]);

    let effects: Vec<Command> = commands(&vm)
        .into_iter()
        .skip_while(|c| *c != Command::SetupStart)
        .skip(1)
        .take_while(|c| *c != Command::SetupEnd)
        .collect();
    assert_eq!(
        effects,
        vec![
            Command::PinMode { pin: 9, mode: 1 },
            Command::AnalogWrite { pin: 9, value: 128 },
            Command::Tone {
                pin: 8,
                frequency: 440,
                duration: Some(200)
            },
            Command::Tone {
                pin: 8,
                frequency: 880,
                duration: None
            },
            Command::NoTone { pin: 8 },
            Command::DelayMicroseconds { duration: 50 },
        ]
    );
}

#[test]
fn test_unknown_call() {
    let vm = run_setup(vec![expr_stmt(call("launchRocket", vec![int(1)]))]);
    assert_eq!(error_kind(&vm), Some(ErrorKind::UnknownCall));
}

#[test]
fn test_unknown_static_method() {
    let vm = run_setup(vec![expr_stmt(method("Serial", "teleport", vec![]))]);
    assert_eq!(error_kind(&vm), Some(ErrorKind::UnknownCall));
}

#[test]
fn test_library_arity_mismatch() {
    let vm = run_setup(vec![expr_stmt(call("pinMode", vec![int(13)]))]);
    assert_eq!(error_kind(&vm), Some(ErrorKind::ArityMismatch));
    assert!(!kinds(&vm).contains(&"PIN_MODE"));
}

#[test]
fn test_user_arity_mismatch() {
    // int add(int a, int b) { return a + b; }  void setup() { add(1); }
    let vm = run_program(&program(vec![
        function_with(
            "add",
            "int",
            vec![("int", "a"), ("int", "b")],
            vec![ret(Some(bin("Add", ident("a"), ident("b"))))],
        ),
        function("setup", vec![expr_stmt(call("add", vec![int(1)]))]),
    ]));
    assert_eq!(error_kind(&vm), Some(ErrorKind::ArityMismatch));
}

#[test]
fn test_user_function_shadows_catalog() {
    // int map(int v) { return v; }  void setup() { int r = map(7); }
    let vm = run_program(&program(vec![
        function_with("map", "int", vec![("int", "v")], vec![ret(Some(ident("v")))]),
        function("setup", vec![decl("int", "r", Some(call("map", vec![int(7)])))]),
    ]));
    assert_eq!(error_kind(&vm), None);
    assert_eq!(last_var(&vm, "r"), Val::int(7));
}

#[test]
fn test_math_builtins() {
    // constrain(300, 0, 255); max(3, 9); min(3, 9); map(512, 0, 1023, 0, 255); abs(-4); sq(5)
    let vm = run_setup(vec![
        decl("int", "c", Some(call("constrain", vec![int(300), int(0), int(255)]))),
        decl("int", "hi", Some(call("max", vec![int(3), int(9)]))),
        decl("int", "lo", Some(call("min", vec![int(3), int(9)]))),
        decl(
            "int",
            "m",
            Some(call("map", vec![int(512), int(0), int(1023), int(0), int(255)])),
        ),
        decl("int", "a", Some(call("abs", vec![int(-4)]))),
        decl("int", "s", Some(call("sq", vec![int(5)]))),
        decl("float", "r", Some(call("sqrt", vec![int(16)]))),
    ]);

    let expected = hashmap! {
        "c" => Val::int(255),
        "hi" => Val::int(9),
        "lo" => Val::int(3),
        "m" => Val::int(127),
        "a" => Val::int(4),
        "s" => Val::int(25),
        "r" => Val::Float(4.0),
    };
    for (name, value) in expected {
        assert_eq!(last_var(&vm, name), value, "value of {name}");
    }
}

#[test]
fn test_string_methods() {
    // String s = "hello"; int n = s.length(); String u = s.toUpperCase(); String num = String(42);
    let vm = run_setup(vec![
        decl("String", "s", Some(string("hello"))),
        decl("int", "n", Some(method("s", "length", vec![]))),
        decl("String", "u", Some(method("s", "toUpperCase", vec![]))),
        decl("String", "num", Some(call("String", vec![int(42)]))),
        decl("char", "first", Some(method("s", "charAt", vec![int(0)]))),
    ]);

    assert_eq!(last_var(&vm, "n"), Val::int(5));
    assert_eq!(last_var(&vm, "u"), Val::str("HELLO"));
    assert_eq!(last_var(&vm, "num"), Val::str("42"));
    assert_eq!(last_var(&vm, "first"), Val::Char('h'));
    assert!(!kinds(&vm).contains(&"FUNCTION_CALL"));
}

#[test]
fn test_catalog_constants() {
    // int pin = A0; float half = PI / 2; int level = HIGH;
    let vm = run_setup(vec![
        decl("int", "pin", Some(ident("A0"))),
        decl("float", "half", Some(bin("Div", ident("PI"), int(2)))),
        decl("int", "level", Some(ident("HIGH"))),
    ]);

    assert_eq!(last_var(&vm, "pin"), Val::int(14));
    assert_eq!(last_var(&vm, "half"), Val::Float(std::f64::consts::FRAC_PI_2));
    assert_eq!(last_var(&vm, "level"), Val::int(1));
}

#[test]
fn test_variable_shadows_constant() {
    // int LED_BUILTIN = 7; pinMode(LED_BUILTIN, OUTPUT);
    let vm = run_setup(vec![
        decl("int", "LED_BUILTIN", Some(int(7))),
        expr_stmt(call("pinMode", vec![ident("LED_BUILTIN"), ident("OUTPUT")])),
    ]);
    assert!(commands(&vm).contains(&Command::PinMode { pin: 7, mode: 1 }));
}

#[test]
fn test_method_on_int_is_type_mismatch() {
    // int n = 3; n.length();
    let vm = run_setup(vec![
        decl("int", "n", Some(int(3))),
        expr_stmt(method("n", "length", vec![])),
    ]);
    assert_eq!(error_kind(&vm), Some(ErrorKind::TypeMismatch));
}

#[test]
fn test_non_numeric_pin_is_type_mismatch() {
    let vm = run_setup(vec![expr_stmt(call(
        "digitalWrite",
        vec![string("thirteen"), int(1)],
    ))]);
    assert_eq!(error_kind(&vm), Some(ErrorKind::TypeMismatch));
}

#[test]
fn test_custom_catalog_changes_surface() {
    let catalog = Catalog::from_toml_str(
        r#"
        [constants]
        ON = 1

        [[function]]
        name = "blink"
        min_args = 1
        rule = { kind = "emit", record = "function_call" }
        "#,
    )
    .unwrap();
    let program = program(vec![function(
        "setup",
        vec![
            expr_stmt(call("blink", vec![ident("ON")])),
            expr_stmt(call("pinMode", vec![int(1), int(1)])),
        ],
    )]);
    let mut vm = VM::new(&program, std::sync::Arc::new(catalog), Limits::default());
    run_with(&mut vm, &mut crate::gateway::DeterministicSource::new());

    assert!(commands(&vm).contains(&Command::FunctionCall {
        function: "blink".into(),
        arguments: vec![Val::int(1)],
    }));
    assert_eq!(error_kind(&vm), Some(ErrorKind::UnknownCall));
}

#[test]
fn test_extreme_arguments_finish_the_run() {
    // long m = map(9223372036854775807, -1, 1, 0, 10); int a = analogRead(4000000000000000000);
    let vm = run_setup(vec![
        decl(
            "long",
            "m",
            Some(call(
                "map",
                vec![int(i64::MAX), int(-1), int(1), int(0), int(10)],
            )),
        ),
        decl(
            "int",
            "a",
            Some(call("analogRead", vec![int(4_000_000_000_000_000_000)])),
        ),
    ]);

    assert_eq!(error_kind(&vm), None);
    assert_eq!(last_var(&vm, "m"), Val::int(0));
    assert_eq!(kinds(&vm).last(), Some(&"PROGRAM_END"));
}
