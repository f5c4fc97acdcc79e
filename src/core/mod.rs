//! Core launch module
//!
//! Builds and runs the training program invocation.

mod launcher;
pub mod shell;
mod signals;

pub use launcher::*;
pub use signals::SignalGuard;
