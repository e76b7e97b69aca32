use crate::executor::errors::ErrorInfo;
use crate::executor::outbox::{Command, CommandRecord};
use crate::gateway::PendingRequest;
use serde::{Deserialize, Serialize};

/// Lifecycle state of one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Ready,
    RunningSetup,
    RunningLoop,
    SuspendedAwaitingResponse,
    HaltedNormal,
    HaltedError,
}

impl ExecutionState {
    pub fn is_halted(self) -> bool {
        matches!(self, ExecutionState::HaltedNormal | ExecutionState::HaltedError)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// `loop()` ran the configured number of times
    LoopLimitReached { iterations: u32 },
    /// The sketch has no `loop()` and `setup()` returned
    Completed,
    /// The sketch called the halt primitive
    Halted,
    Failed { error: ErrorInfo },
}

impl Termination {
    pub fn state(&self) -> ExecutionState {
        match self {
            Termination::Failed { .. } => ExecutionState::HaltedError,
            _ => ExecutionState::HaltedNormal,
        }
    }
}

/// What `Engine::run` stopped on
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Waiting for the host to answer this request
    Suspended(PendingRequest),
    Finished(Termination),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub state: ExecutionState,
    pub termination: Option<Termination>,
    pub error: Option<ErrorInfo>,
    pub commands: Vec<CommandRecord>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.state == ExecutionState::HaltedNormal
    }

    /// The commands without their timestamps
    pub fn command_list(&self) -> Vec<&Command> {
        self.commands.iter().map(|r| &r.command).collect()
    }

    /// One JSON document per record, newline separated
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for record in &self.commands {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }
}
