//! External batch scheduler seam
//!
//! The dispatcher only ever talks to a [`Scheduler`]: it submits a job,
//! waits for the top-level run to finish and asks for the result artifacts
//! the run reported. [`NextflowScheduler`] drives the `nextflow` CLI through
//! a [`ProcessRunner`], so tests can swap in `MockProcessRunner`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::artifacts::discover_result_paths;
use super::DispatchError;
use crate::subprocess::{ExitStatus, ProcessCommand, ProcessError, ProcessOutput, ProcessRunner};

/// Everything the scheduler needs to run the function over one pool's elements.
#[derive(Debug, Clone)]
pub struct SchedulerJob {
    pub pool: String,
    pub workflow_script: PathBuf,
    pub helper_program: PathBuf,
    pub interpreter: String,
    pub function_script: PathBuf,
    pub elements_dir: PathBuf,
    pub work_dir: PathBuf,
    pub log_path: PathBuf,
    pub environment_file: Option<PathBuf>,
    pub return_output: bool,
}

type RunTask = JoinHandle<Result<ProcessOutput, ProcessError>>;

/// A submitted run. Holds the captured output once the run has finished.
#[derive(Debug)]
pub struct RunHandle {
    pub id: Uuid,
    pub pool: String,
    pub command_line: String,
    task: Option<RunTask>,
    output: Option<ProcessOutput>,
}

impl RunHandle {
    pub fn new(pool: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pool: pool.into(),
            command_line: command_line.into(),
            task: None,
            output: None,
        }
    }

    fn running(mut self, task: RunTask) -> Self {
        self.task = Some(task);
        self
    }

    /// Record the finished run's output.
    pub fn complete(&mut self, output: ProcessOutput) {
        self.task = None;
        self.output = Some(output);
    }

    pub fn output(&self) -> Option<&ProcessOutput> {
        self.output.as_ref()
    }

    pub fn stdout(&self) -> &str {
        self.output.as_ref().map_or("", |o| o.stdout.as_str())
    }

    pub fn stderr(&self) -> &str {
        self.output.as_ref().map_or("", |o| o.stderr.as_str())
    }
}

/// A handle dropped before its run finished takes the run down with it.
impl Drop for RunHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Aborting unfinished run {} for pool {}", self.id, self.pool);
            task.abort();
        }
    }
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Start a run without waiting for it.
    async fn submit(&self, job: &SchedulerJob) -> Result<RunHandle, DispatchError>;

    /// Block until the top-level run finishes.
    async fn wait(&self, handle: &mut RunHandle) -> Result<ExitStatus, DispatchError>;

    /// Result artifacts reported by a finished run, ordered by element index.
    fn outputs(&self, handle: &RunHandle) -> Vec<PathBuf>;
}

pub struct NextflowScheduler {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl NextflowScheduler {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Pure: the scheduler command line for `job`.
    pub fn command_args(job: &SchedulerJob) -> Vec<String> {
        let path = |p: &PathBuf| p.to_string_lossy().into_owned();
        let mut args = vec![
            "-log".to_string(),
            path(&job.log_path),
            "run".to_string(),
            path(&job.workflow_script),
            "--return_output".to_string(),
            job.return_output.to_string(),
            "--helper_path".to_string(),
            path(&job.helper_program),
            "--interpreter".to_string(),
            job.interpreter.clone(),
            "--file_path".to_string(),
            path(&job.function_script),
            "--dir_path".to_string(),
            path(&job.elements_dir),
            "-w".to_string(),
            path(&job.work_dir),
            "-profile".to_string(),
            job.pool.clone(),
        ];
        if let Some(env_file) = &job.environment_file {
            args.push("--env_file".to_string());
            args.push(path(env_file));
        }
        args
    }
}

#[async_trait]
impl Scheduler for NextflowScheduler {
    async fn submit(&self, job: &SchedulerJob) -> Result<RunHandle, DispatchError> {
        let command = ProcessCommand::new(&self.program).args(Self::command_args(job));
        let command_line = command.display();
        info!("Submitting to pool {}: {}", job.pool, command_line);

        let runner = Arc::clone(&self.runner);
        let task = tokio::spawn(async move { runner.run(command).await });
        Ok(RunHandle::new(&job.pool, command_line).running(task))
    }

    async fn wait(&self, handle: &mut RunHandle) -> Result<ExitStatus, DispatchError> {
        if let Some(task) = handle.task.as_mut() {
            let joined = task.await;
            handle.task = None;
            let output = joined.map_err(|e| DispatchError::Join(e.to_string()))??;
            debug!(
                "Scheduler run {} for pool {} finished in {:?}",
                handle.id, handle.pool, output.duration
            );
            handle.complete(output);
        }
        handle
            .output()
            .map(|o| o.status.clone())
            .ok_or_else(|| DispatchError::Join(format!("run {} was never started", handle.id)))
    }

    fn outputs(&self, handle: &RunHandle) -> Vec<PathBuf> {
        discover_result_paths(handle.stdout())
    }
}
