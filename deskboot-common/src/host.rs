// deskboot-common/src/host.rs
//! The seam between the bootstrap stages and the machine they provision.
//!
//! Stages describe external commands as [`CommandSpec`] values and hand them to
//! a [`Host`]. The production host spawns real processes; tests record them.
use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use crate::error::{BootError, Result};

/// How privileged commands are executed for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Already running with effective uid 0.
    Root,
    /// Privileged commands are prefixed with `sudo`.
    Sudo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<Vec<u8>>,
    /// Inherit the terminal instead of capturing output (password prompts).
    pub interactive: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin_bytes(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Rewrites the command so it runs with elevated privileges.
    ///
    /// sudo resets the environment, so variables are passed through `env`.
    pub fn elevated(self, privilege: Privilege) -> Self {
        match privilege {
            Privilege::Root => self,
            Privilege::Sudo => {
                let mut args = Vec::with_capacity(self.args.len() + self.envs.len() + 2);
                if !self.envs.is_empty() {
                    args.push("env".to_string());
                    args.extend(self.envs.iter().map(|(k, v)| format!("{k}={v}")));
                }
                args.push(self.program);
                args.extend(self.args);
                Self {
                    program: "sudo".to_string(),
                    args,
                    envs: Vec::new(),
                    cwd: self.cwd,
                    stdin: self.stdin,
                    interactive: self.interactive,
                }
            }
        }
    }

    /// True when program and arguments match exactly.
    pub fn matches(&self, program: &str, args: &[&str]) -> bool {
        self.program == program && self.args.iter().map(String::as_str).eq(args.iter().copied())
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turns a non-zero exit into [`BootError::CommandFailed`].
    pub fn check(self, command: &CommandSpec) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let status = match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        Err(BootError::CommandFailed {
            command: command.to_string(),
            status,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Everything the pipeline needs from the machine besides local file writes.
pub trait Host: Send + Sync + 'static {
    /// Runs a command to completion. A non-zero exit is not an error here;
    /// callers decide with [`CommandOutput::check`].
    fn run(&self, command: &CommandSpec) -> impl Future<Output = Result<CommandOutput>> + Send;

    /// Downloads a small text resource such as an installer script.
    fn fetch_text(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}
