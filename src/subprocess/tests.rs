use super::*;

#[tokio::test]
async fn test_production_runner_success() {
    let output = TokioProcessRunner
        .run(ProcessCommand::new("echo").arg("hello world"))
        .await
        .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout.trim(), "hello world");
    assert!(output.stderr.is_empty());
}

#[tokio::test]
async fn test_production_runner_failure_captures_stderr() {
    let output = TokioProcessRunner
        .run(ProcessCommand::new("sh").args(["-c", "echo boom >&2; exit 4"]))
        .await
        .unwrap();
    assert_eq!(output.status, ExitStatus::Failed(4));
    assert_eq!(output.stderr.trim(), "boom");
}

#[tokio::test]
async fn test_production_runner_command_not_found() {
    let result = TokioProcessRunner
        .run(ProcessCommand::new("nonexistent-command-12345"))
        .await;
    assert!(matches!(result, Err(ProcessError::CommandNotFound(_))));
}

#[tokio::test]
async fn test_production_runner_working_dir() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = TokioProcessRunner
        .run(
            ProcessCommand::new("sh")
                .args(["-c", "echo payload > written.txt"])
                .current_dir(dir.path()),
        )
        .await
        .unwrap();
    assert!(output.status.success());
    let written = std::fs::read_to_string(dir.path().join("written.txt")).unwrap();
    assert_eq!(written, "payload\n");
}

#[tokio::test]
async fn test_mock_first_matching_expectation_answers() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("nextflow")
        .with_args(|args| args.first().map(String::as_str) == Some("-version"))
        .returns_stdout("nextflow version 23.10.0\n")
        .finish();
    mock.expect_command("nextflow")
        .returns_stdout("/work/ab/result-000000.json\n")
        .finish();

    let version = mock
        .run(ProcessCommand::new("nextflow").arg("-version"))
        .await
        .unwrap();
    let run = mock
        .run(ProcessCommand::new("nextflow").args(["-log", "run.log", "run", "main.nf"]))
        .await
        .unwrap();

    assert_eq!(version.stdout, "nextflow version 23.10.0\n");
    assert_eq!(run.stdout, "/work/ab/result-000000.json\n");
    assert_eq!(mock.calls_to("nextflow"), 2);
}

#[tokio::test]
async fn test_mock_dynamic_stdout() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("echo")
        .returns_stdout_with(|cmd| cmd.args.join(","))
        .finish();

    let output = mock
        .run(ProcessCommand::new("echo").args(["a", "b"]))
        .await
        .unwrap();
    assert_eq!(output.stdout, "a,b");
}

#[tokio::test]
async fn test_mock_unexpected_command_is_recorded() {
    let mock = MockProcessRunner::new();
    let result = mock.run(ProcessCommand::new("sbatch").arg("job.sh")).await;
    match result {
        Err(ProcessError::Unexpected(cmd)) => assert_eq!(cmd, "sbatch job.sh"),
        other => panic!("expected Unexpected, got {other:?}"),
    }
    assert_eq!(mock.calls().len(), 1);
}
