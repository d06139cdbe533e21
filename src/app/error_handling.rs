//! Error handling utilities
//!
//! This module provides centralized error handling for the application.

use tracing::error;

use crate::error::{exit_code, Error};

/// Handle fatal errors and exit with appropriate status code
///
/// Errors carrying a crate [`Error`] anywhere in their chain use its exit
/// code; anything else exits with the general failure code.
///
/// # Verbose Mode Behavior
/// - `verbose = 0`: The error and its context only
/// - `verbose >= 1`: Includes the full error chain
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);

    eprintln!("Error: {error}");
    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code_for(&error))
}

/// Pure: exit code for an error chain.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::exit_code)
        .unwrap_or(exit_code::GENERAL)
}
