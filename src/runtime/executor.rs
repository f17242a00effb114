use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;

use crate::constants::{EXIT_GENERIC_FAILURE, EXIT_SIGNAL_BASE};
use crate::utils::ExecError;

/// Everything a finished command produced; this is what gets cached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a program to completion and captures its output
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor {
    fn execute(&self, program: &Path, args: &[String]) -> Result<CapturedOutput, ExecError>;
}

/// Executor that spawns a real child process.
///
/// stdin is inherited; stdout and stderr are captured as raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl CommandExecutor for ProcessExecutor {
    fn execute(&self, program: &Path, args: &[String]) -> Result<CapturedOutput, ExecError> {
        debug!("Executing {} {:?}", program.display(), args);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| ExecError::from_io(&program.to_string_lossy(), &e))?;

        Ok(CapturedOutput {
            exit_code: exit_code(output.status),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Exit code as a shell reports it: 128+N for death by signal N
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EXIT_SIGNAL_BASE + signal;
        }
    }

    EXIT_GENERIC_FAILURE
}
