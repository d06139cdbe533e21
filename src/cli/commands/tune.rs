//! Tune command implementation
//!
//! Times a shell command for each candidate batch size and reports the size
//! with the lowest wall-clock duration.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::Error;
use crate::subprocess::{ProcessCommand, ProcessRunner, TokioProcessRunner};
use crate::tune::{BatchSizeTuner, CostError};

pub const BATCH_SIZE_PLACEHOLDER: &str = "{batch_size}";

pub struct TuneParams {
    pub min: usize,
    pub max: usize,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub command: String,
}

/// Pure: the shell command for one candidate batch size.
pub fn render_command(template: &str, batch_size: usize) -> String {
    template.replace(BATCH_SIZE_PLACEHOLDER, &batch_size.to_string())
}

/// Seconds taken by `sh -c <command>`; a failing command is an error.
pub async fn time_command(runner: &dyn ProcessRunner, command: &str) -> Result<f64, CostError> {
    let started = Instant::now();
    let output = runner
        .run(ProcessCommand::new("sh").args(["-c", command]))
        .await?;
    let elapsed = started.elapsed().as_secs_f64();
    if !output.status.success() {
        return Err(format!(
            "`{}` exited with {:?}: {}",
            command,
            output.status.code(),
            output.stderr.trim()
        )
        .into());
    }
    debug!("`{}` took {:.3}s", command, elapsed);
    Ok(elapsed)
}

pub async fn run_tune_command(params: TuneParams) -> Result<()> {
    if !params.command.contains(BATCH_SIZE_PLACEHOLDER) {
        return Err(Error::Usage(format!(
            "--command must contain {BATCH_SIZE_PLACEHOLDER}"
        ))
        .into());
    }

    let tuner = BatchSizeTuner {
        min: params.min,
        max: params.max,
        tolerance: params.tolerance,
        max_iterations: params.max_iterations,
    };
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);
    let template = params.command.as_str();

    let outcome = tuner
        .tune_async(|batch_size| {
            let runner = Arc::clone(&runner);
            let command = render_command(template, batch_size);
            async move { time_command(runner.as_ref(), &command).await }
        })
        .await
        .map_err(Error::from)
        .context("Batch size search failed")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
