//! External I/O gateway
//!
//! Everything a sketch learns from the outside world (pin levels, analog
//! readings, clocks, library sensors) arrives through an [`IoRequest`]. The
//! executor emits the request record and suspends; the engine then either asks
//! a [`DataSource`] inline (blocking contract) or hands a [`PendingRequest`] to
//! the host (suspend-resume contract). Both paths resume the executor the same
//! way, so the command log cannot tell them apart.

use crate::executor::outbox::Command;
use crate::executor::types::{IntKind, Val, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Deterministic request identifier (`analogRead_0`, `millis_3`, ...)
pub type RequestId = String;

/// How an engine instance obtains external values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IoContract {
    /// Ask the attached data source inline
    #[default]
    Blocking,
    /// Stop and wait for the host to supply the value
    SuspendResume,
}

impl std::str::FromStr for IoContract {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocking" => Ok(IoContract::Blocking),
            "suspend-resume" | "suspend_resume" | "async" => Ok(IoContract::SuspendResume),
            other => Err(format!(
                "unknown io contract '{other}' (expected 'blocking' or 'suspend-resume')"
            )),
        }
    }
}

/* ===================== Requests ===================== */

/// A quantity only the outside world can provide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IoRequest {
    AnalogRead { pin: i64 },
    DigitalRead { pin: i64 },
    Millis,
    Micros,
    PulseIn { pin: i64, state: i64, timeout: i64 },
    LibrarySensor { library: String, method: String, arg: i64 },
}

impl IoRequest {
    /// Prefix of the request id
    pub fn name(&self) -> &'static str {
        match self {
            IoRequest::AnalogRead { .. } => "analogRead",
            IoRequest::DigitalRead { .. } => "digitalRead",
            IoRequest::Millis => "millis",
            IoRequest::Micros => "micros",
            IoRequest::PulseIn { .. } => "pulseIn",
            IoRequest::LibrarySensor { .. } => "librarySensor",
        }
    }

    /// Type the answer is converted to before the sketch sees it
    pub fn result_type(&self) -> ValueType {
        match self {
            IoRequest::AnalogRead { .. }
            | IoRequest::DigitalRead { .. }
            | IoRequest::LibrarySensor { .. } => ValueType::Int(IntKind::I32),
            IoRequest::Millis | IoRequest::Micros | IoRequest::PulseIn { .. } => {
                ValueType::Int(IntKind::U32)
            }
        }
    }

    /// The request record announcing this request
    pub fn to_command(&self, request_id: RequestId) -> Command {
        match self {
            IoRequest::AnalogRead { pin } => Command::AnalogReadRequest {
                pin: *pin,
                request_id,
            },
            IoRequest::DigitalRead { pin } => Command::DigitalReadRequest {
                pin: *pin,
                request_id,
            },
            IoRequest::Millis => Command::MillisRequest { request_id },
            IoRequest::Micros => Command::MicrosRequest { request_id },
            IoRequest::PulseIn {
                pin,
                state,
                timeout,
            } => Command::PulseInRequest {
                pin: *pin,
                state: *state,
                timeout: *timeout,
                request_id,
            },
            IoRequest::LibrarySensor {
                library,
                method,
                arg,
            } => Command::LibrarySensorRequest {
                library: library.clone(),
                method: method.clone(),
                arg: *arg,
                request_id,
            },
        }
    }
}

/// A request the suspended engine is waiting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: RequestId,
    pub request: IoRequest,
    pub timeout: Duration,
    pub deadline: Instant,
}

impl PendingRequest {
    pub fn new(id: RequestId, request: IoRequest, timeout: Duration, now: Instant) -> Self {
        Self {
            id,
            request,
            timeout,
            deadline: now + timeout,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/* ===================== Data Sources ===================== */

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataSourceError {
    #[error("data source has no value for {0}")]
    Exhausted(String),

    #[error("data source failed: {0}")]
    Failed(String),
}

/// Supplier of external values under the blocking contract
pub trait DataSource: Send {
    fn get_value(&mut self, request: &IoRequest) -> Result<Val, DataSourceError>;
}

impl<F> DataSource for F
where
    F: FnMut(&IoRequest) -> Result<Val, DataSourceError> + Send,
{
    fn get_value(&mut self, request: &IoRequest) -> Result<Val, DataSourceError> {
        self(request)
    }
}

/// Reproducible readings for simulators and tests
///
/// Pin reads are pure functions of the pin number; the clocks start at a
/// fixed value and advance by 100 ms on every read.
#[derive(Debug, Clone)]
pub struct DeterministicSource {
    millis: u32,
    micros: u32,
}

impl DeterministicSource {
    pub const INITIAL_MILLIS: u32 = 17_807;
    pub const INITIAL_MICROS: u32 = 17_807_000;

    pub fn new() -> Self {
        Self::with_clock(Self::INITIAL_MILLIS, Self::INITIAL_MICROS)
    }

    pub fn with_clock(millis: u32, micros: u32) -> Self {
        Self { millis, micros }
    }

    /// Rewind both clocks to their starting values
    pub fn reset(&mut self) {
        self.millis = Self::INITIAL_MILLIS;
        self.micros = Self::INITIAL_MICROS;
    }

    /// Answer without advancing the clocks
    pub fn peek(&self, request: &IoRequest) -> i64 {
        match request {
            IoRequest::AnalogRead { pin } => pin.wrapping_mul(37).wrapping_add(42).rem_euclid(1024),
            IoRequest::DigitalRead { pin } => (pin.rem_euclid(2) == 1) as i64,
            IoRequest::Millis => self.millis as i64,
            IoRequest::Micros => self.micros as i64,
            IoRequest::PulseIn { pin, .. } => pin.wrapping_mul(150).wrapping_add(1000),
            IoRequest::LibrarySensor {
                library,
                method,
                arg,
            } => match (library.as_str(), method.as_str()) {
                ("CapacitiveSensor", "capacitiveSensor" | "capacitiveSensorRaw") => {
                    arg.wrapping_mul(13).wrapping_add(477).rem_euclid(2000) + 100
                }
                _ => 0,
            },
        }
    }
}

impl Default for DeterministicSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for DeterministicSource {
    fn get_value(&mut self, request: &IoRequest) -> Result<Val, DataSourceError> {
        let value = self.peek(request);
        match request {
            IoRequest::Millis => self.millis = self.millis.wrapping_add(100),
            IoRequest::Micros => self.micros = self.micros.wrapping_add(100_000),
            _ => {}
        }
        Ok(Val::Int(value, IntKind::I64))
    }
}

/// Answers requests from a fixed queue, in order
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    answers: VecDeque<Val>,
}

impl ScriptedSource {
    pub fn new(answers: impl IntoIterator<Item = Val>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
        }
    }

    pub fn push(&mut self, answer: Val) {
        self.answers.push_back(answer);
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl DataSource for ScriptedSource {
    fn get_value(&mut self, request: &IoRequest) -> Result<Val, DataSourceError> {
        self.answers
            .pop_front()
            .ok_or_else(|| DataSourceError::Exhausted(request.name().to_string()))
    }
}
