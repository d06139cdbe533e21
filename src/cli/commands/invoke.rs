//! Invoke command implementation
//!
//! Stdout carries only the result artifact path, since the scheduler's
//! output is scanned for it; whatever the user function prints goes to stderr.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::app::AppConfig;
use crate::error::Error;
use crate::invoke::{invoke, InvokeRequest};
use crate::subprocess::TokioProcessRunner;

pub struct InvokeParams {
    pub func_script: PathBuf,
    pub element: PathBuf,
    pub return_output: bool,
    pub interpreter: Option<String>,
}

pub async fn run_invoke_command(app: &AppConfig, params: InvokeParams) -> Result<()> {
    let interpreter = match params.interpreter {
        Some(interpreter) => interpreter,
        None => app.dispatch_config().map_err(Error::from)?.interpreter,
    };

    let request = InvokeRequest {
        func_script: params.func_script,
        element: params.element,
        return_output: params.return_output,
        interpreter,
        output_dir: std::env::current_dir().context("Failed to get current directory")?,
    };

    let outcome = invoke(&TokioProcessRunner, &request)
        .await
        .map_err(Error::from)
        .with_context(|| format!("Invoking on {}", request.element.display()))?;

    if !outcome.stdout.is_empty() {
        eprint!("{}", outcome.stdout);
    }
    if !outcome.stderr.is_empty() {
        eprint!("{}", outcome.stderr);
    }
    if let Some(path) = outcome.result_path {
        println!("{}", path.display());
    }
    Ok(())
}
