//! Execution phase enums for each frame kind
//!
//! Each frame kind has its own Phase enum that tracks which execution step
//! it's currently at.

use serde::{Deserialize, Serialize};

/// Lifecycle of the root program frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum ProgramPhase {
    /// Emit version and program-start markers
    Start,
    /// Run global declaration `n`
    Globals(usize),
    Setup,
    SetupDone,
    /// `n` loop iterations have completed
    LoopCheck(u32),
    /// Iteration `n` is running
    LoopDone(u32),
    End,
}

/// Execution phase for user function calls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CallPhase {
    /// Bind parameters in a fresh function scope
    Enter = 0,
    /// Body ran off the end without `return`
    Exit = 1,
}

/// Execution phase for Block statements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockPhase {
    Enter = 0,
    Execute = 1,
}

/// Execution phase for If statements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum IfPhase {
    Eval = 0,
    Branch = 1,
}

/// Execution phase shared by while, do-while and for
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LoopPhase {
    /// for: open the loop scope and run the initializer
    Init = 0,
    /// do-while: run the body before the first test
    Body = 1,
    EvalTest = 2,
    Test = 3,
    /// for: run the update expression
    Update = 4,
}

/// Execution phase for Switch statements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum SwitchPhase {
    Eval,
    Discriminant,
    /// Evaluate the label of case `n`
    Match(usize),
    /// Compare the label of case `n` with the discriminant
    Compare(usize),
    Run { case: usize, stmt: usize },
}

/// Execution phase for Return and expression statements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExprPhase {
    Eval = 0,
    Done = 1,
}
