//! Extract command implementation

use anyhow::{Context, Result};
use std::path::Path;

use crate::error::Error;
use crate::extract::{DependencyMode, SourceExtractor};

/// Extract `func_name` from `input` into `output`.
pub fn run_extract_command(
    input: &Path,
    func_name: &str,
    output: &Path,
    mode: DependencyMode,
) -> Result<()> {
    if input.extension().and_then(|e| e.to_str()) != Some("py") {
        return Err(Error::Usage(format!(
            "--input must be a Python source file, got {}",
            input.display()
        ))
        .into());
    }
    if !input.is_file() {
        return Err(Error::Usage(format!("--input {} does not exist", input.display())).into());
    }

    let extraction = SourceExtractor::new(mode)
        .extract_file(input, func_name, output)
        .map_err(Error::from)
        .with_context(|| format!("Extracting {} from {}", func_name, input.display()))?;

    for warning in &extraction.warnings {
        eprintln!("warning: {warning}");
    }
    println!(
        "Function {} has been extracted and rewritten to {}",
        func_name,
        output.display()
    );
    Ok(())
}
