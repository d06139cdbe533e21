//! Remote invocation helper
//!
//! The scheduler runs this once per element artifact on a compute node. It
//! hands the extracted script, the element and the result location to a
//! small bundled Python driver and reports where the result landed.

use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::dispatch::artifacts::{result_file_name, Envelope};
use crate::extract::read_entry_point;
use crate::subprocess::{ProcessCommand, ProcessError, ProcessRunner};

/// Python driver that imports the extracted script and applies the entry function.
pub const INVOKE_DRIVER: &str = include_str!("../resources/invoke_driver.py");

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} has no entry marker; was it produced by `nfmap extract`?", .0.display())]
    NoEntryPoint(PathBuf),

    #[error("Invalid element artifact {}: {source}", path.display())]
    Element {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to stage the driver script: {0}")]
    Driver(#[source] std::io::Error),

    #[error("Failed to run interpreter: {0}")]
    Process(#[from] ProcessError),

    #[error("Function failed on {} (exit code {code:?}): {stderr}", element.display())]
    FunctionFailed {
        element: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
}

/// Parse the boolean flags the scheduler passes through.
pub fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" => Ok(true),
        "no" | "false" | "f" | "n" | "0" => Ok(false),
        other => Err(format!("Boolean value expected, got {other:?}")),
    }
}

#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub func_script: PathBuf,
    pub element: PathBuf,
    pub return_output: bool,
    pub interpreter: String,
    /// Directory the result artifact is written to.
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    pub result_path: Option<PathBuf>,
    /// Whatever the user function printed.
    pub stdout: String,
    pub stderr: String,
}

pub async fn invoke(
    runner: &dyn ProcessRunner,
    request: &InvokeRequest,
) -> Result<InvokeOutcome, InvokeError> {
    let script = tokio::fs::read_to_string(&request.func_script)
        .await
        .map_err(|source| InvokeError::Read {
            path: request.func_script.clone(),
            source,
        })?;
    let entry = read_entry_point(&script)
        .ok_or_else(|| InvokeError::NoEntryPoint(request.func_script.clone()))?;

    let index = element_index(&request.element).await?;
    let result_path = request
        .return_output
        .then(|| request.output_dir.join(result_file_name(index)));

    let mut driver = tempfile::Builder::new()
        .prefix("nfmap-driver-")
        .suffix(".py")
        .tempfile()
        .map_err(InvokeError::Driver)?;
    driver
        .write_all(INVOKE_DRIVER.as_bytes())
        .and_then(|_| driver.flush())
        .map_err(InvokeError::Driver)?;

    let mut command = ProcessCommand::new(&request.interpreter)
        .path_arg(driver.path())
        .path_arg(&request.func_script)
        .arg(&entry)
        .path_arg(&request.element)
        .current_dir(&request.output_dir);
    if let Some(path) = &result_path {
        command = command.path_arg(path);
    }
    debug!("Invoking {} on {}", entry, request.element.display());

    let output = runner.run(command).await?;
    if !output.status.success() {
        return Err(InvokeError::FunctionFailed {
            element: request.element.clone(),
            code: output.status.code(),
            stderr: output.stderr.trim().to_string(),
        });
    }

    Ok(InvokeOutcome {
        result_path,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

async fn element_index(path: &Path) -> Result<usize, InvokeError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| InvokeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let envelope: Envelope<serde_json::Value> =
        Envelope::from_json(&raw).map_err(|source| InvokeError::Element {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(envelope.index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::MockProcessRunner;
    use tempfile::TempDir;

    fn stage(dir: &Path) -> InvokeRequest {
        let func_script = dir.join("function.py");
        std::fs::write(
            &func_script,
            "# nfmap: entry=square\n\n\ndef square(x):\n    return x * x\n",
        )
        .unwrap();
        let element = dir.join("element-000004.json");
        std::fs::write(&element, r#"{"index":4,"value":3}"#).unwrap();

        InvokeRequest {
            func_script,
            element,
            return_output: true,
            interpreter: "python3".to_string(),
            output_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_parse_bool() {
        for yes in ["yes", "true", "T", "y", "1", "True"] {
            assert_eq!(parse_bool(yes), Ok(true), "{yes}");
        }
        for no in ["no", "false", "f", "N", "0", "FALSE"] {
            assert_eq!(parse_bool(no), Ok(false), "{no}");
        }
        assert!(parse_bool("maybe").is_err());
        assert!(parse_bool("").is_err());
    }

    #[tokio::test]
    async fn test_invoke_builds_driver_command() {
        let dir = TempDir::new().unwrap();
        let request = stage(dir.path());

        let mut mock = MockProcessRunner::new();
        mock.expect_command("python3").returns_stdout("hello from square\n").finish();

        let outcome = invoke(&mock, &request).await.unwrap();

        let expected = dir.path().join("result-000004.json");
        assert_eq!(outcome.result_path.as_deref(), Some(expected.as_path()));
        assert_eq!(outcome.stdout, "hello from square\n");

        let call = &mock.calls()[0];
        assert_eq!(call.args.len(), 5);
        assert_eq!(call.args[2], "square");
        assert_eq!(call.args[3], request.element.display().to_string());
        assert_eq!(call.args[4], expected.display().to_string());
        assert_eq!(call.working_dir.as_deref(), Some(dir.path()));
    }

    #[tokio::test]
    async fn test_invoke_without_output() {
        let dir = TempDir::new().unwrap();
        let mut request = stage(dir.path());
        request.return_output = false;

        let mut mock = MockProcessRunner::new();
        mock.expect_command("python3").finish();

        let outcome = invoke(&mock, &request).await.unwrap();
        assert!(outcome.result_path.is_none());
        assert_eq!(mock.calls()[0].args.len(), 4);
    }

    #[tokio::test]
    async fn test_invoke_reports_function_failure() {
        let dir = TempDir::new().unwrap();
        let request = stage(dir.path());

        let mut mock = MockProcessRunner::new();
        mock.expect_command("python3")
            .returns_exit_code(1)
            .returns_stderr("ZeroDivisionError: division by zero\n")
            .finish();

        let result = invoke(&mock, &request).await;
        match result {
            Err(InvokeError::FunctionFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "ZeroDivisionError: division by zero");
            }
            other => panic!("expected FunctionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invoke_requires_entry_marker() {
        let dir = TempDir::new().unwrap();
        let request = stage(dir.path());
        std::fs::write(&request.func_script, "def square(x):\n    return x * x\n").unwrap();

        let result = invoke(&MockProcessRunner::new(), &request).await;
        assert!(matches!(result, Err(InvokeError::NoEntryPoint(_))));
    }

    #[tokio::test]
    async fn test_invoke_rejects_bad_element() {
        let dir = TempDir::new().unwrap();
        let request = stage(dir.path());
        std::fs::write(&request.element, "[1, 2]").unwrap();

        let result = invoke(&MockProcessRunner::new(), &request).await;
        assert!(matches!(result, Err(InvokeError::Element { .. })));
    }
}
