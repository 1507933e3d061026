//! Internal subprocess plumbing for the Calibre command-line tools.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{Error, Result};

/// Captured output of a finished subprocess.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `calibredb` / `ebook-convert` invocations with a shared timeout.
#[derive(Debug, Clone)]
pub(crate) struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run a program to completion, enforcing the timeout.
    ///
    /// A non-zero exit becomes [`Error::CommandFailed`] with trimmed stderr.
    pub async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::CommandNotFound(program.to_string())
                } else {
                    Error::Io(e)
                }
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout {
                command: program.to_string(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(Error::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: program.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_command_not_found() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let err = runner
            .run("calkit-test-no-such-binary", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandNotFound(_)));
    }
}
