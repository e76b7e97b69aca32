//! Engine - one sketch run under one I/O contract
//!
//! The executor stops every time the sketch needs an external value. Under
//! the blocking contract the engine answers inline from its data source and
//! keeps going; under suspend-resume it hands the pending request back to the
//! host and waits for `supply_response`. Nothing else differs, so both
//! contracts produce the same command log for the same answers.

use crate::config::{Config, ConfigError};
use crate::executor::errors::{ErrorInfo, ErrorKind};
use crate::executor::exec_loop::run_until_blocked;
use crate::executor::outbox::CommandRecord;
use crate::executor::stdlib::{Catalog, CatalogError};
use crate::executor::types::{Program, ProgramPhase, Val};
use crate::executor::vm::{Awaiting, Step, VM};
use crate::gateway::{DataSource, IoContract, PendingRequest, RequestId};
use crate::types::{ExecutionResult, ExecutionState, RunStatus, Termination};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("no request is pending")]
    NotSuspended,

    #[error("response for '{got}' but the pending request is '{expected}'")]
    UnknownRequest { expected: RequestId, got: RequestId },

    #[error("response for '{0}' arrived after its deadline")]
    ResponseTimeout(RequestId),

    #[error("operation requires the {0:?} contract")]
    ContractMismatch(IoContract),
}

pub struct Engine {
    vm: VM,
    config: Config,
    source: Option<Box<dyn DataSource>>,
    pending: Option<PendingRequest>,
    started: bool,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("contract", &self.config.io_contract)
            .field("pending", &self.pending)
            .field("commands", &self.vm.outbox.len())
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl Engine {
    pub fn new(program: &Program, config: Config, catalog: Arc<Catalog>) -> Result<Self, EngineError> {
        config.validate()?;
        let vm = VM::new(program, catalog, config.limits());
        debug!(contract = ?config.io_contract, program_hash = %vm.program.hash, "engine created");
        Ok(Self {
            vm,
            config,
            source: None,
            pending: None,
            started: false,
        })
    }

    /// Create an engine with the catalog the configuration names
    pub fn from_config(program: &Program, config: Config) -> Result<Self, EngineError> {
        let catalog = Arc::new(config.load_catalog()?);
        Self::new(program, config, catalog)
    }

    /// Attach the source that answers requests under the blocking contract
    pub fn with_data_source(mut self, source: impl DataSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ExecutionState {
        if let Some(termination) = &self.vm.termination {
            return termination.state();
        }
        if self.pending.is_some() {
            return ExecutionState::SuspendedAwaitingResponse;
        }
        if !self.started {
            return ExecutionState::Ready;
        }
        match self.vm.program_phase() {
            Some(
                ProgramPhase::Start
                | ProgramPhase::Globals(_)
                | ProgramPhase::Setup
                | ProgramPhase::SetupDone,
            ) => ExecutionState::RunningSetup,
            Some(_) => ExecutionState::RunningLoop,
            None => ExecutionState::Ready,
        }
    }

    /// The request the engine is suspended on, if any
    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn records(&self) -> &[CommandRecord] {
        self.vm.outbox.records()
    }

    /// Records appended since `cursor` (a previous `records().len()`)
    pub fn records_since(&self, cursor: usize) -> &[CommandRecord] {
        self.vm.outbox.since(cursor)
    }

    /* ===================== Running ===================== */

    /// Run until the sketch finishes or, under suspend-resume, needs a value
    ///
    /// Calling `run` again while suspended re-checks the deadline and
    /// returns the same pending request.
    pub fn run(&mut self) -> RunStatus {
        self.run_at(Instant::now())
    }

    pub fn run_at(&mut self, now: Instant) -> RunStatus {
        if !self.started {
            info!(contract = ?self.config.io_contract, "run started");
            self.started = true;
        }

        if let Some(pending) = &self.pending {
            if !pending.is_expired(now) {
                return RunStatus::Suspended(pending.clone());
            }
            self.timeout_pending();
            return self.finished();
        }

        loop {
            match run_until_blocked(&mut self.vm) {
                Step::Suspend => {
                    let Some(awaiting) = self.vm.awaiting.clone() else {
                        self.vm.fail(ErrorInfo::configuration(
                            "execution suspended without a request",
                        ));
                        return self.finished();
                    };
                    match self.config.io_contract {
                        IoContract::Blocking => self.answer_inline(awaiting),
                        IoContract::SuspendResume => {
                            let pending = PendingRequest::new(
                                awaiting.id,
                                awaiting.request,
                                self.config.response_timeout(),
                                now,
                            );
                            debug!(request_id = %pending.id, "awaiting host response");
                            self.pending = Some(pending.clone());
                            return RunStatus::Suspended(pending);
                        }
                    }
                }
                Step::Done | Step::Continue => return self.finished(),
            }
        }
    }

    fn answer_inline(&mut self, awaiting: Awaiting) {
        let Some(source) = self.source.as_mut() else {
            self.vm.fail(ErrorInfo::configuration(format!(
                "no data source attached to answer {}",
                awaiting.id
            )));
            return;
        };
        match source.get_value(&awaiting.request) {
            Ok(value) => {
                self.vm.resume(value);
            }
            Err(err) => self.vm.fail(ErrorInfo::configuration(err.to_string())),
        }
    }

    fn finished(&mut self) -> RunStatus {
        if self.vm.termination.is_none() {
            self.vm.fail(ErrorInfo::new(
                ErrorKind::InvalidControlFlow,
                "execution stopped without reaching the end of the program",
            ));
        }
        let termination = self
            .vm
            .termination
            .clone()
            .unwrap_or(Termination::Completed);
        info!(?termination, commands = self.vm.outbox.len(), "run finished");
        RunStatus::Finished(termination)
    }

    /* ===================== Suspend-Resume ===================== */

    /// Answer the pending request; call `run` afterwards to continue
    pub fn supply_response(&mut self, id: &str, value: Val) -> Result<(), EngineError> {
        self.supply_response_at(id, value, Instant::now())
    }

    pub fn supply_response_at(&mut self, id: &str, value: Val, now: Instant) -> Result<(), EngineError> {
        let Some(pending) = &self.pending else {
            return Err(EngineError::NotSuspended);
        };
        if pending.id != id {
            return Err(EngineError::UnknownRequest {
                expected: pending.id.clone(),
                got: id.to_string(),
            });
        }
        if pending.is_expired(now) {
            let id = pending.id.clone();
            self.timeout_pending();
            return Err(EngineError::ResponseTimeout(id));
        }

        debug!(request_id = %id, "response supplied");
        self.pending = None;
        self.vm.resume(value);
        Ok(())
    }

    /// Fire the deadline of the pending request; true if the run ended
    pub fn expire_pending(&mut self, now: Instant) -> bool {
        match &self.pending {
            Some(pending) if pending.is_expired(now) => {
                self.timeout_pending();
                true
            }
            _ => false,
        }
    }

    /// Drop the pending request and end the run with a timeout error
    pub fn timeout_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            warn!(request_id = %pending.id, "response timed out");
            self.vm.fail(ErrorInfo::configuration(format!(
                "no response to {} within {} ms",
                pending.id,
                pending.timeout.as_millis()
            )));
        }
    }

    /// End a suspended run because its answer cannot arrive
    pub fn fail_pending(&mut self, reason: &str) {
        if self.pending.take().is_some() {
            self.vm.fail(ErrorInfo::configuration(reason));
        }
    }

    /* ===================== Teardown ===================== */

    /// Tear down without emitting anything; a pending request is discarded
    pub fn cancel(self) -> Vec<CommandRecord> {
        if let Some(pending) = &self.pending {
            debug!(request_id = %pending.id, "engine cancelled while suspended");
        }
        self.vm.outbox.into_records()
    }

    pub fn into_result(self) -> ExecutionResult {
        let state = self.state();
        let termination = self.vm.termination;
        let error = match &termination {
            Some(Termination::Failed { error }) => Some(error.clone()),
            _ => None,
        };
        ExecutionResult {
            state,
            termination,
            error,
            commands: self.vm.outbox.into_records(),
        }
    }
}

/// Run a sketch to completion under the blocking contract
pub fn run(
    program: &Program,
    config: Config,
    catalog: Arc<Catalog>,
    source: impl DataSource + 'static,
) -> Result<ExecutionResult, EngineError> {
    if config.io_contract != IoContract::Blocking {
        return Err(EngineError::ContractMismatch(IoContract::Blocking));
    }
    let mut engine = Engine::new(program, config, catalog)?.with_data_source(source);
    engine.run();
    Ok(engine.into_result())
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
