//! Clear command implementation

use anyhow::Result;
use std::sync::Arc;

use crate::app::AppConfig;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::subprocess::TokioProcessRunner;

pub async fn run_clear_command(app: &AppConfig) -> Result<()> {
    let config = app.dispatch_config().map_err(Error::from)?;
    let work_dir = config.work_dir();
    let dispatcher = Dispatcher::nextflow(config, Arc::new(TokioProcessRunner));

    let report = dispatcher.clear_workspace().await;
    println!(
        "Cleared {}: {} removed, {} preserved, {} failed",
        work_dir.display(),
        report.removed.len(),
        report.preserved.len(),
        report.failed.len()
    );
    for (path, reason) in &report.failed {
        eprintln!("  could not remove {}: {}", path.display(), reason);
    }
    Ok(())
}
