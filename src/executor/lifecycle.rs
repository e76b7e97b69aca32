//! Program lifecycle
//!
//! The root frame walks a sketch through its life: globals, `setup()` once,
//! then `loop()` until the iteration bound. Each transition emits its marker.

use super::errors::ErrorInfo;
use super::outbox::{Command, EndReason};
use super::types::{FrameKind, ProgramPhase};
use super::vm::{pop_frame, push_call, push_stmt, set_top, throw, try_step, Step, VM};
use crate::types::Termination;
use tracing::{debug, info};

pub const COMPONENT: &str = "sketchvm-core";

/// Execute the program frame
pub fn execute_program(vm: &mut VM, phase: ProgramPhase) -> Step {
    // results of setup() and loop() are discarded
    vm.acc = None;

    match phase {
        ProgramPhase::Start => {
            if let Some(name) = vm.program.duplicate.clone() {
                return throw(vm, ErrorInfo::redeclaration(&name));
            }
            try_step!(
                vm,
                vm.emit(Command::VersionInfo {
                    component: COMPONENT.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    status: "started".to_string(),
                })
            );
            let program_hash = vm.program.hash.clone();
            try_step!(vm, vm.emit(Command::ProgramStart { program_hash }));
            info!(
                functions = vm.program.functions.len(),
                globals = vm.program.globals.len(),
                "program started"
            );
            goto(vm, ProgramPhase::Globals(0))
        }

        ProgramPhase::Globals(i) => match vm.program.globals.get(i).cloned() {
            Some(decl) => {
                goto(vm, ProgramPhase::Globals(i + 1));
                push_stmt(vm, decl);
                Step::Continue
            }
            None => goto(vm, ProgramPhase::Setup),
        },

        ProgramPhase::Setup => {
            if !vm.program.functions.contains_key("setup") {
                return goto(vm, ProgramPhase::LoopCheck(0));
            }
            try_step!(vm, vm.emit(Command::SetupStart));
            vm.steps = 0;
            debug!("setup started");
            goto(vm, ProgramPhase::SetupDone);
            try_step!(vm, push_call(vm, "setup".to_string(), Vec::new()));
            Step::Continue
        }

        ProgramPhase::SetupDone => {
            try_step!(vm, vm.emit(Command::SetupEnd));
            goto(vm, ProgramPhase::LoopCheck(0))
        }

        ProgramPhase::LoopCheck(done) => {
            if !vm.program.functions.contains_key("loop") {
                return goto(vm, ProgramPhase::End);
            }
            if done >= vm.limits.max_loop_iterations {
                try_step!(vm, vm.emit(Command::LoopLimitReached { iterations: done }));
                info!(iterations = done, "loop limit reached");
                return goto(vm, ProgramPhase::End);
            }
            let iteration = done + 1;
            try_step!(vm, vm.emit(Command::LoopStart { iteration }));
            vm.steps = 0;
            debug!(iteration, "loop iteration started");
            goto(vm, ProgramPhase::LoopDone(iteration));
            try_step!(vm, push_call(vm, "loop".to_string(), Vec::new()));
            Step::Continue
        }

        ProgramPhase::LoopDone(iteration) => {
            try_step!(vm, vm.emit(Command::LoopEnd { iteration }));
            goto(vm, ProgramPhase::LoopCheck(iteration))
        }

        ProgramPhase::End => {
            try_step!(
                vm,
                vm.emit(Command::ProgramEnd {
                    reason: EndReason::Completed,
                })
            );
            pop_frame(vm);
            // with a loop() the only way here is the iteration bound
            let termination = if vm.program.functions.contains_key("loop") {
                Termination::LoopLimitReached {
                    iterations: vm.limits.max_loop_iterations,
                }
            } else {
                Termination::Completed
            };
            info!(?termination, commands = vm.outbox.len(), "program ended");
            vm.termination = Some(termination);
            Step::Done
        }
    }
}

fn goto(vm: &mut VM, phase: ProgramPhase) -> Step {
    set_top(vm, FrameKind::Program { phase });
    Step::Continue
}
