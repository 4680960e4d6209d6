//! Process invocations issued by the SSH transport and the runner seam that
//! executes them.

use std::ffi::OsString;
use std::fmt;
use std::process::{Command, Stdio};

use super::TransportError;

/// One external process the transport wants to run.
///
/// Secrets travel in `env` rather than `args` so they never show up in a
/// process listing or in [`Display`](fmt::Display) output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteInvocation {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Extra environment variables for the child process.
    pub env: Vec<(String, String)>,
}

impl RemoteInvocation {
    /// Creates an invocation with no extra environment.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    /// Adds an environment variable for the child process.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Returns the value passed for `key`, if any.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Display for RemoteInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Exit status for log lines: the code, or `signal` when the process was
    /// killed.
    #[must_use]
    pub fn status_label(&self) -> String {
        self.code
            .map_or_else(|| String::from("signal"), |code| code.to_string())
    }
}

/// Executes [`RemoteInvocation`]s; tests substitute a scripted runner.
pub trait CommandRunner {
    /// Runs `invocation`, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the process cannot be started.
    fn run(&self, invocation: &RemoteInvocation) -> Result<CommandOutput, TransportError>;
}

/// Runner that spawns real processes with stdin closed, so a client that
/// wants to prompt fails instead of hanging.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, invocation: &RemoteInvocation) -> Result<CommandOutput, TransportError> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .output()
            .map_err(|err| TransportError::Spawn {
                program: invocation.program.clone(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
