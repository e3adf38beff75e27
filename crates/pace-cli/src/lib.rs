//! Session orchestration for `pace`.
//!
//! The binary wires these modules to the command line; they are exposed as a
//! library so the loop can be driven by other runners and tested in-process.

pub mod orchestrator;
pub mod prompt;
