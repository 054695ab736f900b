use crate::ports::provider::ProviderError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external media tools.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` to completion, or until `cancel` fires. A canceled run
    /// kills the child and returns [`ProviderError::Canceled`].
    async fn run(
        &self,
        program: &str,
        args: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, ProviderError>;
}

pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, ProviderError> {
        debug!(program, args = %args.join(" "), "Spawning");
        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        tokio::select! {
            output = child.wait_with_output() => {
                let output = output?;
                Ok(CommandOutput {
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            // Dropping the wait future drops the child, which kills it.
            _ = cancel.cancelled() => Err(ProviderError::Canceled),
        }
    }
}

/// Run and turn a non-zero exit into [`ProviderError::Command`].
pub async fn run_checked<R>(
    runner: &R,
    program: &str,
    args: Vec<String>,
    cancel: CancellationToken,
) -> Result<CommandOutput, ProviderError>
where
    R: CommandRunner + ?Sized,
{
    let output = runner.run(program, args, cancel).await?;
    if !output.success {
        return Err(ProviderError::Command {
            program: program.to_string(),
            message: last_lines(&output.stderr, 3),
        });
    }
    Ok(output)
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join(" / ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_checked_reports_stderr_tail() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, _, _| {
            Ok(CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: "banner\n\nline one\nline two\nNo such file\n".to_string(),
            })
        });

        let err = run_checked(&runner, "ffmpeg", vec![], CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ProviderError::Command { program, message } => {
                assert_eq!(program, "ffmpeg");
                assert_eq!(message, "line one / line two / No such file");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_process_runner_cancel() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = ProcessRunner
            .run("sleep", vec!["5".to_string()], token)
            .await;
        assert!(matches!(result, Err(ProviderError::Canceled)));
    }
}
