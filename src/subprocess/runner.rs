use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::error::ProcessError;

/// A program invocation. Built with chained calls:
/// `ProcessCommand::new("nextflow").arg("run").path_arg(&script)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Non-UTF-8 path components are replaced lossily.
    pub fn path_arg(self, path: &Path) -> Self {
        let rendered = path.to_string_lossy().into_owned();
        self.arg(rendered)
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    /// Render the command the way it would be typed in a shell.
    pub fn display(&self) -> String {
        let args = self.args.iter().map(String::as_str);
        shell_words::join(std::iter::once(self.program.as_str()).chain(args))
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failed(i32),
    Signaled(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Failed(code) => Some(*code),
            ExitStatus::Signaled(_) => None,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if status.success() {
            return ExitStatus::Success;
        }
        if let Some(code) = status.code() {
            return ExitStatus::Failed(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatus::Signaled(signal);
            }
        }
        ExitStatus::Failed(1)
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

/// Runs commands as real child processes on the tokio runtime.
///
/// The child inherits the parent environment: cluster schedulers depend on
/// module systems and conda activations that live in environment variables.
/// Dropping the returned future kills the child.
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        debug!("Executing subprocess: {}", command.display());

        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            trace!("Working directory: {}", dir.display());
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProcessError::CommandNotFound(command.program.clone()),
            _ => ProcessError::Io(e),
        })?;
        let output = child.wait_with_output().await?;

        let result = ProcessOutput {
            status: output.status.into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        };

        match &result.status {
            ExitStatus::Success => debug!(
                "{} finished in {:?} ({} bytes of stdout)",
                command.program,
                result.duration,
                result.stdout.len()
            ),
            ExitStatus::Failed(code) => debug!(
                "{} exited with {} after {:?}",
                command.program, code, result.duration
            ),
            ExitStatus::Signaled(signal) => warn!(
                "{} terminated by signal {} after {:?}",
                command.program, signal, result.duration
            ),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_arguments_with_spaces() {
        let command = ProcessCommand::new("nextflow").args(["-log", "/tmp/my run.log"]);
        assert_eq!(command.display(), "nextflow -log '/tmp/my run.log'");
    }

    #[test]
    fn test_exit_status_code() {
        assert_eq!(ExitStatus::Success.code(), Some(0));
        assert_eq!(ExitStatus::Failed(3).code(), Some(3));
        assert_eq!(ExitStatus::Signaled(9).code(), None);
        assert!(!ExitStatus::Signaled(9).success());
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_from_wait_status() {
        use std::os::unix::process::ExitStatusExt;

        let ok = std::process::ExitStatus::from_raw(0);
        assert_eq!(ExitStatus::from(ok), ExitStatus::Success);

        // Raw wait status 256 is exit code 1
        let failed = std::process::ExitStatus::from_raw(256);
        assert_eq!(ExitStatus::from(failed), ExitStatus::Failed(1));

        let killed = std::process::ExitStatus::from_raw(9);
        assert_eq!(ExitStatus::from(killed), ExitStatus::Signaled(9));
    }
}
