//! Crate-level error type
//!
//! Each module reports its own error enum; `Error` collects them for callers
//! that drive several modules and maps each family to a process exit code.

use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::DispatchError;
use crate::extract::ExtractError;
use crate::invoke::InvokeError;
use crate::subprocess::ProcessError;
use crate::tune::TuneError;

pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const EXTRACTION: i32 = 3;
    pub const SCHEDULER: i32 = 4;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Tune(#[from] TuneError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    Usage(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_)
            | Error::Config(_)
            | Error::Tune(TuneError::InvalidRange { .. })
            | Error::Tune(TuneError::InvalidTolerance(_)) => exit_code::USAGE,
            Error::Extract(_) | Error::Dispatch(DispatchError::Extract(_)) => {
                exit_code::EXTRACTION
            }
            Error::Dispatch(DispatchError::SchedulerFailed { .. })
            | Error::Dispatch(DispatchError::Process(_)) => exit_code::SCHEDULER,
            _ => exit_code::GENERAL,
        }
    }
}
