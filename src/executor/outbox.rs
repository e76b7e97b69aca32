//! Command log
//!
//! The append-only record of everything a sketch did. Records own their data:
//! a `VAR_SET` carries a clone of the binding taken at emission time, so no
//! later mutation of program state can reach a record already in the log.

use super::errors::{ErrorInfo, ErrorKind};
use super::types::Val;
use serde::{Deserialize, Serialize};

/// Why a run ended normally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    Halted,
}

/// One simulated hardware action or lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    VersionInfo {
        component: String,
        version: String,
        status: String,
    },
    ProgramStart {
        program_hash: String,
    },
    ProgramEnd {
        reason: EndReason,
    },
    SetupStart,
    SetupEnd,
    LoopStart {
        iteration: u32,
    },
    LoopEnd {
        iteration: u32,
    },
    LoopLimitReached {
        iterations: u32,
    },
    VarSet {
        variable: String,
        value: Val,
    },
    PinMode {
        pin: i64,
        mode: i64,
    },
    DigitalWrite {
        pin: i64,
        value: i64,
    },
    AnalogWrite {
        pin: i64,
        value: i64,
    },
    Delay {
        duration: i64,
    },
    DelayMicroseconds {
        duration: i64,
    },
    Tone {
        pin: i64,
        frequency: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<i64>,
    },
    NoTone {
        pin: i64,
    },
    FunctionCall {
        function: String,
        arguments: Vec<Val>,
    },
    AnalogReadRequest {
        pin: i64,
        request_id: String,
    },
    DigitalReadRequest {
        pin: i64,
        request_id: String,
    },
    MillisRequest {
        request_id: String,
    },
    MicrosRequest {
        request_id: String,
    },
    PulseInRequest {
        pin: i64,
        state: i64,
        timeout: i64,
        request_id: String,
    },
    LibrarySensorRequest {
        library: String,
        method: String,
        arg: i64,
        request_id: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<usize>,
    },
}

impl Command {
    /// The wire tag of this record (`"PIN_MODE"`)
    pub fn kind(&self) -> &'static str {
        match self {
            Command::VersionInfo { .. } => "VERSION_INFO",
            Command::ProgramStart { .. } => "PROGRAM_START",
            Command::ProgramEnd { .. } => "PROGRAM_END",
            Command::SetupStart => "SETUP_START",
            Command::SetupEnd => "SETUP_END",
            Command::LoopStart { .. } => "LOOP_START",
            Command::LoopEnd { .. } => "LOOP_END",
            Command::LoopLimitReached { .. } => "LOOP_LIMIT_REACHED",
            Command::VarSet { .. } => "VAR_SET",
            Command::PinMode { .. } => "PIN_MODE",
            Command::DigitalWrite { .. } => "DIGITAL_WRITE",
            Command::AnalogWrite { .. } => "ANALOG_WRITE",
            Command::Delay { .. } => "DELAY",
            Command::DelayMicroseconds { .. } => "DELAY_MICROSECONDS",
            Command::Tone { .. } => "TONE",
            Command::NoTone { .. } => "NO_TONE",
            Command::FunctionCall { .. } => "FUNCTION_CALL",
            Command::AnalogReadRequest { .. } => "ANALOG_READ_REQUEST",
            Command::DigitalReadRequest { .. } => "DIGITAL_READ_REQUEST",
            Command::MillisRequest { .. } => "MILLIS_REQUEST",
            Command::MicrosRequest { .. } => "MICROS_REQUEST",
            Command::PulseInRequest { .. } => "PULSE_IN_REQUEST",
            Command::LibrarySensorRequest { .. } => "LIBRARY_SENSOR_REQUEST",
            Command::Error { .. } => "ERROR",
        }
    }
}

impl From<&ErrorInfo> for Command {
    fn from(err: &ErrorInfo) -> Self {
        Command::Error {
            kind: err.kind,
            message: err.message.clone(),
            line: err.line,
        }
    }
}

/// A command stamped with its position in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    #[serde(flatten)]
    pub command: Command,
    /// Emission index; logical time, not wall-clock
    pub timestamp: u64,
}

/* ===================== Outbox ===================== */

/// Append-only command log
#[derive(Debug, Clone)]
pub struct Outbox {
    records: Vec<CommandRecord>,
    limit: usize,
}

impl Outbox {
    /// Create a log that refuses to grow past `limit` records
    pub fn new(limit: usize) -> Self {
        Self {
            records: Vec::new(),
            limit,
        }
    }

    /// Append a record
    ///
    /// Fails only when the log is full.
    pub fn emit(&mut self, command: Command) -> Result<(), ErrorInfo> {
        if self.records.len() >= self.limit {
            return Err(ErrorInfo::new(
                ErrorKind::ResourceExhaustion,
                format!("command log exceeded {} records", self.limit),
            ));
        }
        self.push(command);
        Ok(())
    }

    /// Append the terminal diagnostic; exempt from the size limit
    pub(crate) fn emit_final(&mut self, command: Command) {
        self.push(command);
    }

    fn push(&mut self, command: Command) {
        let timestamp = self.records.len() as u64;
        self.records.push(CommandRecord { command, timestamp });
    }

    pub fn records(&self) -> &[CommandRecord] {
        &self.records
    }

    /// Records appended at or after `cursor`
    pub fn since(&self, cursor: usize) -> &[CommandRecord] {
        self.records.get(cursor..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<CommandRecord> {
        self.records
    }
}
