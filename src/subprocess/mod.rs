//! Subprocess abstraction so scheduler and interpreter invocations can be
//! substituted in tests.

pub mod error;
pub mod mock;
pub mod runner;

#[cfg(test)]
mod tests;

pub use error::ProcessError;
pub use mock::{ExpectationBuilder, MockProcessRunner};
pub use runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner, TokioProcessRunner};
