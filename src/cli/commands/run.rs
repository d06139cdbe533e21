//! Run command implementation
//!
//! Dispatches a function over the elements of a JSON array and prints the
//! results as a JSON array.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::app::AppConfig;
use crate::dispatch::{DispatchRequest, Dispatcher, FunctionRef, PoolSelection};
use crate::error::Error;
use crate::extract::DependencyMode;
use crate::subprocess::TokioProcessRunner;

pub struct RunParams {
    pub source: PathBuf,
    pub function: String,
    pub input: PathBuf,
    pub log: Option<PathBuf>,
    pub pools: Vec<String>,
    pub clear_workspace: bool,
    pub want_results: bool,
    pub mode: DependencyMode,
}

/// Pure: one pool dispatches directly, several fan out.
pub fn pool_selection(mut pools: Vec<String>) -> Result<PoolSelection, Error> {
    match pools.len() {
        0 => Err(Error::Usage("at least one --pool is required".to_string())),
        1 => Ok(PoolSelection::Single(pools.remove(0))),
        _ => Ok(PoolSelection::Many(pools)),
    }
}

pub async fn run_dispatch_command(app: &AppConfig, params: RunParams) -> Result<()> {
    let config = app.dispatch_config().map_err(Error::from)?;

    let raw = tokio::fs::read(&params.input)
        .await
        .map_err(Error::from)
        .with_context(|| format!("Reading {}", params.input.display()))?;
    let elements: Vec<serde_json::Value> = serde_json::from_slice(&raw)
        .map_err(Error::from)
        .with_context(|| format!("{} must hold a JSON array", params.input.display()))?;
    info!("Loaded {} elements from {}", elements.len(), params.input.display());

    let request = DispatchRequest {
        function: FunctionRef::new(params.source, params.function),
        elements,
        log_path: params.log,
        pools: pool_selection(params.pools)?,
        clear_workspace: params.clear_workspace,
        want_results: params.want_results,
    };

    let dispatcher = Dispatcher::nextflow(config, Arc::new(TokioProcessRunner))
        .with_dependency_mode(params.mode);

    let results: Option<Vec<serde_json::Value>> = dispatcher
        .dispatch(request)
        .await
        .map_err(Error::from)?;

    if let Some(results) = results {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}
