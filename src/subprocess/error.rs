#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised by `MockProcessRunner` for a command no expectation accepts.
    #[error("Unexpected command: {0}")]
    Unexpected(String),
}
