//! Dispatch configuration
//!
//! One `DispatchConfig` is built per top-level invocation and handed to
//! everything that needs the scratch area or scheduler settings. Values come
//! from built-in defaults, then an optional YAML file, then `NFMAP_*`
//! environment variables.

#[cfg(test)]
mod tests;

use crate::dispatch::PoolWeights;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_ENV: &str = "NFMAP_CONFIG";
pub const SCRATCH_DIR_ENV: &str = "NFMAP_SCRATCH_DIR";
pub const WORK_DIR_ENV: &str = "NFMAP_WORK_DIR";
pub const ENV_FILE_ENV: &str = "NFMAP_ENV_FILE";
pub const SCHEDULER_ENV: &str = "NFMAP_SCHEDULER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Could not locate the nfmap executable: {0}")]
    HelperProgram(#[source] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Shared-storage directory holding per-job staging directories.
    pub scratch_dir: PathBuf,
    /// Scheduler work directory. Defaults to `<scratch_dir>/work`.
    pub work_dir: Option<PathBuf>,
    /// Environment descriptor (e.g. a conda YAML) forwarded to the scheduler.
    pub environment_file: Option<PathBuf>,
    pub scheduler_program: String,
    /// Workflow definition to run instead of the bundled one.
    pub workflow_script: Option<PathBuf>,
    /// Program the scheduler runs per element. Defaults to this executable.
    pub helper_program: Option<PathBuf>,
    pub interpreter: String,
    pub pool_weights: PoolWeights,
    pub serialize_concurrency: usize,
    /// Work directory entries that clearing never removes.
    pub preserve_in_work_dir: Vec<String>,
    pub keep_job_dirs: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            work_dir: None,
            environment_file: None,
            scheduler_program: "nextflow".to_string(),
            workflow_script: None,
            helper_program: None,
            interpreter: "python3".to_string(),
            pool_weights: PoolWeights::default(),
            serialize_concurrency: 16,
            preserve_in_work_dir: vec!["conda".to_string()],
            keep_job_dirs: false,
        }
    }
}

fn default_scratch_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".nfmap").join("scratch"))
        .unwrap_or_else(|| PathBuf::from(".nfmap/scratch"))
}

impl DispatchConfig {
    /// Defaults, then the YAML file at `path` (or `$NFMAP_CONFIG`), then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let file = path.map(Path::to_path_buf).or(from_env);

        let mut config = match file {
            Some(file) => Self::from_file(&file)?,
            None => Self::default(),
        };
        config.merge_env_vars();
        config.validate()?;
        debug!("Dispatch configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn merge_env_vars(&mut self) {
        self.merge_from(|key| std::env::var(key).ok());
    }

    /// Apply `NFMAP_*` overrides read through `lookup`. Empty values are ignored.
    pub fn merge_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = lookup(SCRATCH_DIR_ENV) {
            self.scratch_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(WORK_DIR_ENV) {
            self.work_dir = Some(PathBuf::from(dir));
        }
        if let Some(file) = lookup(ENV_FILE_ENV) {
            self.environment_file = Some(PathBuf::from(file));
        }
        if let Some(program) = lookup(SCHEDULER_ENV) {
            self.scheduler_program = program;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler_program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "scheduler_program must not be empty".to_string(),
            ));
        }
        if self.interpreter.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "interpreter must not be empty".to_string(),
            ));
        }
        if self.serialize_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "serialize_concurrency must be at least 1".to_string(),
            ));
        }
        if let Some((pool, _)) = self.pool_weights.iter().find(|(_, weight)| *weight == 0) {
            return Err(ConfigError::Invalid(format!(
                "pool_weights.{pool} must be a positive integer"
            )));
        }
        Ok(())
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| self.scratch_dir.join("work"))
    }

    pub fn helper_program(&self) -> Result<PathBuf, ConfigError> {
        match &self.helper_program {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe().map_err(ConfigError::HelperProgram),
        }
    }

    /// Configuration rooted at `scratch_dir`, for tests and embedding.
    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }
}
