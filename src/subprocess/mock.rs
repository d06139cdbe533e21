use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

type ArgsMatcher = Box<dyn Fn(&[String]) -> bool + Send + Sync>;
type StdoutFn = Box<dyn Fn(&ProcessCommand) -> String + Send + Sync>;

/// Scripted [`ProcessRunner`] for tests. The first expectation whose
/// program and argument matcher accept a command answers it; every command
/// is recorded, matched or not.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<Expectation>>>,
    calls: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct Expectation {
    program: String,
    matcher: Option<ArgsMatcher>,
    status: ExitStatus,
    stdout: Stdout,
    stderr: String,
}

enum Stdout {
    Fixed(String),
    Computed(StdoutFn),
}

impl Expectation {
    fn accepts(&self, command: &ProcessCommand) -> bool {
        self.program == command.program
            && self.matcher.as_ref().map_or(true, |m| m(command.args.as_slice()))
    }

    fn reply(&self, command: &ProcessCommand) -> ProcessOutput {
        ProcessOutput {
            status: self.status.clone(),
            stdout: match &self.stdout {
                Stdout::Fixed(text) => text.clone(),
                Stdout::Computed(f) => f(command),
            },
            stderr: self.stderr.clone(),
            duration: Duration::from_millis(1),
        }
    }
}

/// Builder returned by [`MockProcessRunner::expect_command`]; nothing is
/// registered until [`finish`](Self::finish).
pub struct ExpectationBuilder {
    runner: MockProcessRunner,
    expectation: Expectation,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_command(&mut self, program: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            runner: self.clone(),
            expectation: Expectation {
                program: program.to_string(),
                matcher: None,
                status: ExitStatus::Success,
                stdout: Stdout::Fixed(String::new()),
                stderr: String::new(),
            },
        }
    }

    /// Every command received so far, in order.
    pub fn calls(&self) -> Vec<ProcessCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|cmd| cmd.program == program)
            .count()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(command.clone());

        let expectations = self.expectations.lock().unwrap();
        expectations
            .iter()
            .find(|e| e.accepts(&command))
            .map(|e| e.reply(&command))
            .ok_or_else(|| ProcessError::Unexpected(command.display()))
    }
}

impl ExpectationBuilder {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.matcher = Some(Box::new(matcher));
        self
    }

    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        self.expectation.stdout = Stdout::Fixed(stdout.to_string());
        self
    }

    /// Compute stdout from the received command, e.g. to emulate a tool
    /// that writes files named by its arguments.
    pub fn returns_stdout_with<F>(mut self, stdout_fn: F) -> Self
    where
        F: Fn(&ProcessCommand) -> String + Send + Sync + 'static,
    {
        self.expectation.stdout = Stdout::Computed(Box::new(stdout_fn));
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.expectation.stderr = stderr.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.status = match code {
            0 => ExitStatus::Success,
            code => ExitStatus::Failed(code),
        };
        self
    }

    pub fn finish(self) {
        self.runner
            .expectations
            .lock()
            .unwrap()
            .push(self.expectation);
    }
}
