//! Tests for the sketch executor
//!
//! Organized by feature area

pub mod helpers;

mod control_flow_tests;
mod dispatch_tests;
mod lifecycle_tests;
