//! Application configuration
//!
//! Process-level settings taken from global CLI flags. Dispatch settings
//! live in [`crate::config::DispatchConfig`].

use std::path::PathBuf;

use crate::config::{ConfigError, DispatchConfig};

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
    /// Explicit dispatch configuration file (`--config`)
    pub config_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn new(verbose: u8, config_file: Option<PathBuf>) -> Self {
        Self {
            verbose,
            config_file,
        }
    }

    /// Get the log level string based on verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Build the dispatch configuration for this invocation.
    pub fn dispatch_config(&self) -> Result<DispatchConfig, ConfigError> {
        DispatchConfig::load(self.config_file.as_deref())
    }
}
