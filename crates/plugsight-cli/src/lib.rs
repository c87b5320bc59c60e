#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

//! Command implementations for the `plugsight` binary. Commands write to
//! caller-supplied sinks and return an [`ExitCode`], so tests drive them
//! without spawning a process.

pub mod inspect_cmd;

pub use inspect_cmd::{cmd_inspect, InspectArgs};

/// Process exit codes: 0 for a successful inspection, 1 for any failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCode {
    Ok,
    Failure,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ExitCode::Ok => 0,
            ExitCode::Failure => 1,
        }
    }
}
