//! External command execution.
//!
//! Packaging scripts, pre-packaging scripts and `git` all run through the
//! [`CmdRunner`] capability so tests can substitute a recording fake.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// A command to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmd {
  pub name: String,
  pub args: Vec<String>,
  pub env: BTreeMap<String, String>,
  pub working_dir: Option<PathBuf>,
  /// Start from an empty environment instead of inheriting the caller's.
  pub use_isolated_env: bool,
}

impl Cmd {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
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

  pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
    self.env.insert(key.to_string(), value.into());
    self
  }

  pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.working_dir = Some(dir.into());
    self
  }

  pub fn isolated(mut self) -> Self {
    self.use_isolated_env = true;
    self
  }

  pub fn display(&self) -> String {
    let mut parts = vec![self.name.clone()];
    parts.extend(self.args.iter().cloned());
    parts.join(" ")
  }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
  pub stdout: String,
  pub stderr: String,
  pub exit_code: i32,
}

#[derive(Debug, Error)]
pub enum CmdError {
  #[error("failed to run '{cmd}': {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command '{cmd}' exited with code {code}:\nstdout: {stdout}\nstderr: {stderr}")]
  Failed {
    cmd: String,
    code: i32,
    stdout: String,
    stderr: String,
  },
}

#[async_trait]
pub trait CmdRunner: Send + Sync {
  /// Run a command to completion. A non-zero exit is an error.
  async fn run_complex_command(&self, cmd: &Cmd) -> Result<CmdOutput, CmdError>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessCmdRunner;

impl ProcessCmdRunner {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl CmdRunner for ProcessCmdRunner {
  async fn run_complex_command(&self, cmd: &Cmd) -> Result<CmdOutput, CmdError> {
    info!(cmd = %cmd.display(), "executing command");

    let mut command = Command::new(&cmd.name);
    command.args(&cmd.args);

    if cmd.use_isolated_env {
      command
        .env_clear()
        .env("LANG", "C")
        .env("LC_ALL", "C");
    }

    for (key, value) in &cmd.env {
      command.env(key, value);
    }

    if let Some(dir) = &cmd.working_dir {
      command.current_dir(dir);
    }

    debug!(working_dir = ?cmd.working_dir, isolated = cmd.use_isolated_env, "spawning process");

    let output = command.output().await.map_err(|source| CmdError::Spawn {
      cmd: cmd.display(),
      source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    if !output.status.success() {
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "command stderr");
      }
      return Err(CmdError::Failed {
        cmd: cmd.display(),
        code: exit_code,
        stdout,
        stderr,
      });
    }

    Ok(CmdOutput {
      stdout,
      stderr,
      exit_code,
    })
  }
}
