//! Tests for the program lifecycle: globals, setup, bounded loop, halt

use super::super::*;
use super::helpers::*;
use crate::executor::outbox::EndReason;
use crate::types::Termination;

fn blink() -> Program {
    // void setup() { pinMode(13, OUTPUT); }
    // void loop() { digitalWrite(13, HIGH); delay(100); }
    program(vec![
        function(
            "setup",
            vec![expr_stmt(call("pinMode", vec![int(13), ident("OUTPUT")]))],
        ),
        function(
            "loop",
            vec![
                expr_stmt(call("digitalWrite", vec![int(13), ident("HIGH")])),
                expr_stmt(call("delay", vec![int(100)])),
            ],
        ),
    ])
}

#[test]
fn test_marker_order() {
    let vm = run_program(&blink());

    let mut expected = vec![
        "VERSION_INFO",
        "PROGRAM_START",
        "SETUP_START",
        "PIN_MODE",
        "SETUP_END",
    ];
    for _ in 0..3 {
        expected.extend(["LOOP_START", "DIGITAL_WRITE", "DELAY", "LOOP_END"]);
    }
    expected.extend(["LOOP_LIMIT_REACHED", "PROGRAM_END"]);

    assert_eq!(kinds(&vm), expected);
    assert_eq!(
        vm.termination,
        Some(Termination::LoopLimitReached { iterations: 3 })
    );
}

#[test]
fn test_loop_runs_exactly_n_times() {
    let limits = Limits {
        max_loop_iterations: 7,
        ..Limits::default()
    };
    let mut vm = build_vm_with(&blink(), limits);
    run_with(&mut vm, &mut crate::gateway::DeterministicSource::new());

    let iterations: Vec<u32> = commands(&vm)
        .iter()
        .filter_map(|c| match c {
            Command::LoopStart { iteration } => Some(*iteration),
            _ => None,
        })
        .collect();
    assert_eq!(iterations, (1..=7).collect::<Vec<_>>());
    assert!(commands(&vm).contains(&Command::LoopLimitReached { iterations: 7 }));
    assert_eq!(
        commands(&vm).last(),
        Some(&Command::ProgramEnd {
            reason: EndReason::Completed
        })
    );
}

#[test]
fn test_setup_only_completes() {
    let vm = run_setup(vec![expr_stmt(call("pinMode", vec![int(2), ident("INPUT")]))]);

    assert_eq!(vm.termination, Some(Termination::Completed));
    assert!(!kinds(&vm).contains(&"LOOP_START"));
    assert!(!kinds(&vm).contains(&"LOOP_LIMIT_REACHED"));
}

#[test]
fn test_missing_setup_skips_its_markers() {
    let vm = run_program(&program(vec![function(
        "loop",
        vec![expr_stmt(call("delay", vec![int(1)]))],
    )]));

    assert!(!kinds(&vm).contains(&"SETUP_START"));
    assert_eq!(kinds(&vm).iter().filter(|k| **k == "LOOP_START").count(), 3);
}

#[test]
fn test_globals_initialize_before_setup() {
    // int counter = 0;
    // void loop() { counter++; }
    let vm = run_program(&program(vec![
        global(decl("int", "counter", Some(int(0)))),
        function("setup", vec![]),
        function("loop", vec![expr_stmt(inc(ident("counter"), false))]),
    ]));

    let all = kinds(&vm);
    let first_set = all.iter().position(|k| *k == "VAR_SET").unwrap();
    let setup = all.iter().position(|k| *k == "SETUP_START").unwrap();
    assert!(first_set < setup);

    assert_eq!(
        var_sets(&vm, "counter"),
        vec![Val::int(0), Val::int(1), Val::int(2), Val::int(3)]
    );
    assert_eq!(vm.scope.get("counter").unwrap().value, Val::int(3));
}

#[test]
fn test_exit_halts_normally() {
    // void loop() { digitalWrite(13, LOW); exit(0); digitalWrite(13, HIGH); }
    let vm = run_program(&program(vec![function(
        "loop",
        vec![
            expr_stmt(call("digitalWrite", vec![int(13), ident("LOW")])),
            expr_stmt(call("exit", vec![int(0)])),
            expr_stmt(call("digitalWrite", vec![int(13), ident("HIGH")])),
        ],
    )]));

    assert_eq!(vm.termination, Some(Termination::Halted));
    assert_eq!(
        kinds(&vm),
        vec![
            "VERSION_INFO",
            "PROGRAM_START",
            "LOOP_START",
            "DIGITAL_WRITE",
            "PROGRAM_END"
        ]
    );
    assert_eq!(
        commands(&vm).last(),
        Some(&Command::ProgramEnd {
            reason: EndReason::Halted
        })
    );
}

#[test]
fn test_version_and_program_hash() {
    let vm = run_program(&blink());
    let other = run_program(&blink());

    match &commands(&vm)[0] {
        Command::VersionInfo {
            component, status, ..
        } => {
            assert_eq!(component, "sketchvm-core");
            assert_eq!(status, "started");
        }
        other => panic!("Expected VERSION_INFO, got {:?}", other),
    }

    let hash = match &commands(&vm)[1] {
        Command::ProgramStart { program_hash } => program_hash.clone(),
        other => panic!("Expected PROGRAM_START, got {:?}", other),
    };
    assert_eq!(hash.len(), 64);
    assert_eq!(commands(&other)[1], commands(&vm)[1]);
}

#[test]
fn test_duplicate_function_is_redeclaration() {
    let vm = run_program(&program(vec![
        function("setup", vec![]),
        function("setup", vec![]),
    ]));

    assert_eq!(error_kind(&vm), Some(ErrorKind::Redeclaration));
    assert_eq!(kinds(&vm), vec!["ERROR"]);
}

#[test]
fn test_step_after_finish_is_done() {
    let mut vm = run_program(&blink());
    let len = vm.outbox.len();
    assert_eq!(step(&mut vm), Step::Done);
    assert_eq!(vm.outbox.len(), len);
}
