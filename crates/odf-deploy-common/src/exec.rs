//! External command execution
//!
//! The platform installer is a separate binary; everything that shells out
//! goes through [`CommandExecutor`] so callers can be tested without it.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::{Error, Result};

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Output of a command that exited with code 0
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Whether the command exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for running external commands
///
/// A non-zero exit is reported in [`CommandOutput`], not as an error; use
/// [`exec_checked`] when non-zero exit should fail the caller.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` with `args` and extra environment variables, waiting for it to exit
    async fn exec(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<CommandOutput>;
}

/// Render a program and its arguments as a single command line for logs and errors
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command and turn a non-zero exit into [`Error::CommandExecution`]
pub async fn exec_checked<E: CommandExecutor + ?Sized>(
    executor: &E,
    program: &str,
    args: &[String],
    env: &[(String, String)],
) -> Result<CommandOutput> {
    let output = executor.exec(program, args, env).await?;
    if !output.success() {
        return Err(Error::CommandExecution {
            command: command_line(program, args),
            exit_code: output.exit_code,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

/// Read `reader` to the end, logging each line and returning the captured text.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the read,
/// so a stray byte in installer output never detaches us from the child.
async fn stream_lines<R>(reader: R, program: &str, stream: &'static str) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        info!(program, stream, "{}", line);
        captured.push_str(line);
        captured.push('\n');
    }
    Ok(captured)
}

/// Executor backed by `tokio::process`
///
/// Standard output and standard error are forwarded line by line to the log
/// as they are produced, since installer runs take tens of minutes and
/// `openshift-install` reports progress on stderr.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn exec(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<CommandOutput> {
        debug!(command = %command_line(program, args), "Executing command");

        let mut child = Command::new(program)
            .args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let read_stdout = async {
            match stdout {
                Some(out) => stream_lines(out, program, "stdout").await,
                None => Ok(String::new()),
            }
        };
        let read_stderr = async {
            match stderr {
                Some(err) => stream_lines(err, program, "stderr").await,
                None => Ok(String::new()),
            }
        };
        let (stdout, stderr) = tokio::join!(read_stdout, read_stderr);

        // The child is always reaped before a read error is reported
        let status = child.wait().await?;

        Ok(CommandOutput {
            exit_code: status.code(),
            stdout: stdout?,
            stderr: stderr?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn command_line_joins_program_and_args() {
        assert_eq!(
            command_line("openshift-install", &args(&["create", "cluster"])),
            "openshift-install create cluster"
        );
        assert_eq!(command_line("true", &[]), "true");
    }

    #[tokio::test]
    async fn exec_checked_passes_through_successful_output() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_exec()
            .withf(|program, _, _| program == "oc")
            .times(1)
            .returning(|_, _, _| Ok(CommandOutput::ok("done")));

        let output = exec_checked(&executor, "oc", &args(&["version"]), &[])
            .await
            .unwrap();
        assert_eq!(output.stdout, "done");
    }

    #[tokio::test]
    async fn exec_checked_fails_on_non_zero_exit() {
        let mut executor = MockCommandExecutor::new();
        executor.expect_exec().returning(|_, _, _| {
            Ok(CommandOutput {
                exit_code: Some(3),
                stdout: String::new(),
                stderr: "boom".to_string(),
            })
        });

        let err = exec_checked(&executor, "oc", &args(&["apply"]), &[])
            .await
            .unwrap_err();
        match err {
            Error::CommandExecution {
                command,
                exit_code,
                stderr,
            } => {
                assert_eq!(command, "oc apply");
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_executor_captures_stdout_stderr_and_env() {
        let executor = ShellExecutor::new();
        let output = executor
            .exec(
                "sh",
                &args(&["-c", "echo out-$GREETING; echo err >&2; exit 4"]),
                &[("GREETING".to_string(), "hi".to_string())],
            )
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(4));
        assert_eq!(output.stdout, "out-hi\n");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_executor_survives_invalid_utf8_and_waits_for_child() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!(
            "printf 'ok\\377\\n'; printf 'bad\\376\\n' >&2; sleep 1; touch {}",
            marker.display()
        );
        let executor = ShellExecutor::new();

        let output = executor.exec("sh", &args(&["-c", &script]), &[]).await.unwrap();

        assert!(marker.exists());
        assert!(output.success());
        assert_eq!(output.stdout, "ok\u{FFFD}\n");
        assert_eq!(output.stderr, "bad\u{FFFD}\n");
    }
}
