//! Command implementation modules
//!
//! Each subcommand lives in its own module.

pub mod clear;
pub mod extract;
pub mod invoke;
pub mod run;
pub mod tune;

pub use clear::run_clear_command;
pub use extract::run_extract_command;
pub use invoke::{run_invoke_command, InvokeParams};
pub use run::{run_dispatch_command, RunParams};
pub use tune::{run_tune_command, TuneParams};
