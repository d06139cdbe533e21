//! Function dispatch
//!
//! Runs a Python function over a list of elements on an external batch
//! scheduler. For one pool a dispatch extracts the function into a job
//! directory, writes one JSON artifact per element, runs the scheduler and
//! reads back the result artifacts it reports. For several pools the
//! elements are split by weight and each pool is dispatched concurrently.
//!
//! Two dispatches sharing one work directory are not isolated from each
//! other; callers must not run them concurrently.

pub mod artifacts;
pub mod partition;
pub mod scheduler;
pub mod workspace;


pub use partition::{partition_by_weight, PoolWeights};
pub use scheduler::{NextflowScheduler, RunHandle, Scheduler, SchedulerJob};
pub use workspace::ClearReport;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, DispatchConfig};
use crate::extract::{DependencyMode, ExtractError, SourceExtractor};
use crate::subprocess::{ProcessError, ProcessRunner};
use workspace::JobDir;

/// Workflow definition run by the scheduler for every element artifact.
pub const BUNDLED_WORKFLOW: &str = include_str!("../../resources/run_function.nf");

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to serialize element {index}: {source}")]
    Serialize {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode result {}: {source}", path.display())]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scheduler failed for pool {pool} (exit code {code:?}): {stderr}")]
    SchedulerFailed {
        pool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to run scheduler: {0}")]
    Process(#[from] ProcessError),

    #[error("Scheduler task failed: {0}")]
    Join(String),
}

impl DispatchError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        DispatchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A top-level function in a Python source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRef {
    pub source: PathBuf,
    pub name: String,
}

impl FunctionRef {
    pub fn new(source: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PoolSelection {
    Single(String),
    Many(Vec<String>),
}

impl From<&str> for PoolSelection {
    fn from(pool: &str) -> Self {
        PoolSelection::Single(pool.to_string())
    }
}

impl From<Vec<String>> for PoolSelection {
    fn from(pools: Vec<String>) -> Self {
        PoolSelection::Many(pools)
    }
}

#[derive(Debug, Clone)]
pub struct DispatchRequest<T> {
    pub function: FunctionRef,
    pub elements: Vec<T>,
    /// Base log path; each pool writes to a copy suffixed with its name.
    pub log_path: Option<PathBuf>,
    pub pools: PoolSelection,
    pub clear_workspace: bool,
    pub want_results: bool,
}

impl<T> DispatchRequest<T> {
    pub fn new(function: FunctionRef, elements: Vec<T>, pools: impl Into<PoolSelection>) -> Self {
        Self {
            function,
            elements,
            log_path: None,
            pools: pools.into(),
            clear_workspace: true,
            want_results: true,
        }
    }

    pub fn with_log_path(mut self, log_path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(log_path.into());
        self
    }

    pub fn with_clear_workspace(mut self, clear: bool) -> Self {
        self.clear_workspace = clear;
        self
    }

    pub fn with_want_results(mut self, want: bool) -> Self {
        self.want_results = want;
        self
    }
}

pub struct Dispatcher {
    config: Arc<DispatchConfig>,
    scheduler: Arc<dyn Scheduler>,
    extractor: SourceExtractor,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            config: Arc::new(config),
            scheduler,
            extractor: SourceExtractor::new(DependencyMode::Referenced),
        }
    }

    /// Dispatcher driving the configured scheduler program through `runner`.
    pub fn nextflow(config: DispatchConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let scheduler = NextflowScheduler::new(runner, config.scheduler_program.clone());
        Self::new(config, Arc::new(scheduler))
    }

    pub fn with_dependency_mode(mut self, mode: DependencyMode) -> Self {
        self.extractor = SourceExtractor::new(mode);
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Remove everything in the scheduler work directory except preserved entries.
    pub async fn clear_workspace(&self) -> ClearReport {
        workspace::clear_directory(&self.config.work_dir(), &self.config.preserve_in_work_dir)
            .await
    }

    /// Run the function over every element.
    ///
    /// Returns `None` when results were not requested. With several pools the
    /// per-pool results are concatenated in pool order; within a pool they
    /// follow the element order.
    pub async fn dispatch<T, R>(
        &self,
        request: DispatchRequest<T>,
    ) -> Result<Option<Vec<R>>, DispatchError>
    where
        T: Serialize + Clone,
        R: DeserializeOwned,
    {
        if request.clear_workspace {
            self.clear_workspace().await;
        }

        let DispatchRequest {
            function,
            elements,
            log_path,
            pools,
            want_results,
            ..
        } = request;

        let results = match pools {
            PoolSelection::Single(pool) => {
                self.dispatch_pool(&function, &elements, log_path.as_deref(), &pool, want_results)
                    .await?
            }
            PoolSelection::Many(pools) => {
                let chunks = partition_by_weight(&elements, &pools, &self.config.pool_weights);
                for (pool, chunk) in pools.iter().zip(&chunks) {
                    debug!("Pool {} receives {} elements", pool, chunk.len());
                }

                let runs = pools.iter().zip(&chunks).map(|(pool, chunk)| {
                    self.dispatch_pool::<T, R>(
                        &function,
                        chunk,
                        log_path.as_deref(),
                        pool,
                        want_results,
                    )
                });
                // Every pool runs to completion and cleans up before the
                // first failure in pool order is reported.
                let outcomes = join_all(runs).await;
                let mut merged = Vec::new();
                for (pool, outcome) in pools.iter().zip(outcomes) {
                    match outcome {
                        Ok(results) => merged.extend(results),
                        Err(e) => {
                            warn!("Pool {} failed: {}", pool, e);
                            return Err(e);
                        }
                    }
                }
                merged
            }
        };

        Ok(want_results.then_some(results))
    }

    async fn dispatch_pool<T, R>(
        &self,
        function: &FunctionRef,
        elements: &[T],
        log_path: Option<&Path>,
        pool: &str,
        want_results: bool,
    ) -> Result<Vec<R>, DispatchError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        if elements.is_empty() {
            info!("No elements for pool {}, skipping scheduler run", pool);
            return Ok(Vec::new());
        }

        let log_path = workspace::prepare_log(log_path, pool).await?;
        let job_dir = JobDir::create(&self.config.scratch_dir, self.config.keep_job_dirs).await?;

        let outcome = self
            .run_job(&job_dir, function, elements, &log_path, pool, want_results)
            .await;
        job_dir.finish().await;

        let results = outcome?;
        info!(
            "Scheduler run for pool {} complete. {} results generated. Log file available at {}",
            pool,
            results.len(),
            log_path.display()
        );
        Ok(results)
    }

    async fn run_job<T, R>(
        &self,
        job_dir: &JobDir,
        function: &FunctionRef,
        elements: &[T],
        log_path: &Path,
        pool: &str,
        want_results: bool,
    ) -> Result<Vec<R>, DispatchError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        self.extractor
            .extract_file(&function.source, &function.name, &job_dir.function_script())?;

        let written = artifacts::write_elements(
            elements,
            &job_dir.elements_dir(),
            self.config.serialize_concurrency,
        )
        .await?;
        info!("{} elements were serialized for pool {}", written, pool);

        let workflow_script = match &self.config.workflow_script {
            Some(script) => script.clone(),
            None => {
                let script = job_dir.workflow_script();
                tokio::fs::write(&script, BUNDLED_WORKFLOW)
                    .await
                    .map_err(|source| DispatchError::io(&script, source))?;
                script
            }
        };

        let work_dir = self.config.work_dir();
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|source| DispatchError::io(&work_dir, source))?;

        let job = SchedulerJob {
            pool: pool.to_string(),
            workflow_script,
            helper_program: self.config.helper_program()?,
            interpreter: self.config.interpreter.clone(),
            function_script: job_dir.function_script(),
            elements_dir: job_dir.elements_dir(),
            work_dir,
            log_path: log_path.to_path_buf(),
            environment_file: self.config.environment_file.clone(),
            return_output: want_results,
        };

        let mut handle = self.scheduler.submit(&job).await?;
        let status = self.scheduler.wait(&mut handle).await?;
        if !status.success() {
            return Err(DispatchError::SchedulerFailed {
                pool: pool.to_string(),
                code: status.code(),
                stderr: handle.stderr().trim().to_string(),
            });
        }

        if !want_results {
            return Ok(Vec::new());
        }

        let paths = self.scheduler.outputs(&handle);
        if paths.len() < elements.len() {
            warn!(
                "Pool {} returned {} results for {} elements",
                pool,
                paths.len(),
                elements.len()
            );
        }
        artifacts::read_results(&paths, self.config.serialize_concurrency).await
    }
}
