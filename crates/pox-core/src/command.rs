//! External command execution.
//!
//! Every tool the engine shells out to (`ldd`, `mksquashfs`, `zip`,
//! `unzip`) is described as an [`Invocation`] and handed to a
//! [`CommandRunner`], so the constructed command line can be asserted on
//! without the tool being installed.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use pox_common::types::ToolStatus;

/// A single external tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name, looked up on `PATH`.
    pub program: String,
    /// Arguments, excluding the program name.
    pub args: Vec<OsString>,
    /// Working directory for the tool; inherits the caller's when `None`.
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    /// Starts an invocation of `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Runs the tool from `dir` instead of the caller's working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Arguments as lossy UTF-8 strings.
    #[must_use]
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured result of a finished tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// How the tool exited.
    pub status: ToolStatus,
    /// Raw standard output.
    pub stdout: Vec<u8>,
    /// Raw standard error.
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Returns whether the tool exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.status.success()
    }

    /// Standard output decoded lossily.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Standard output followed by standard error.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut out = self.stdout_lossy();
        out.push_str(&self.stderr_lossy());
        out
    }
}

/// Runs external tools to completion.
pub trait CommandRunner {
    /// Runs `invocation`, blocking until the tool exits.
    ///
    /// A non-zero exit is not an error at this level; callers inspect
    /// [`CommandOutput::status`].
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be located or started.
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput>;
}

/// Runs tools as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        let program = which::which(&invocation.program).map_err(|e| {
            io::Error::new(io::ErrorKind::NotFound, format!("{}: {e}", invocation.program))
        })?;
        tracing::debug!(command = %invocation, dir = ?invocation.current_dir, "running external tool");

        // "." keeps the caller's working directory.
        let dir = invocation.current_dir.as_deref().unwrap_or(Path::new("."));
        let output = Command::new(program)
            .args(&invocation.args)
            .current_dir(dir)
            .output()?;

        Ok(CommandOutput {
            status: output.status.into(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
