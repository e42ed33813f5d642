use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use super::ReleaseDirError;
use crate::cmd::{Cmd, CmdError, CmdRunner};

/// Commit hash recorded for release directories outside of git.
pub const NON_GIT_COMMIT: &str = "non-git";

/// Commit hash recorded for git repositories without commits.
pub const EMPTY_REPO_COMMIT: &str = "empty";

/// Git operations on a release directory.
pub struct GitRepo {
  dir: PathBuf,
  runner: Arc<dyn CmdRunner>,
}

impl GitRepo {
  pub fn new(dir: impl Into<PathBuf>, runner: Arc<dyn CmdRunner>) -> Self {
    Self { dir: dir.into(), runner }
  }

  fn git(&self, args: &[&str]) -> Cmd {
    Cmd::new("git").args(args.iter().copied()).working_dir(&self.dir)
  }

  pub async fn init(&self) -> Result<(), ReleaseDirError> {
    self
      .runner
      .run_complex_command(&self.git(&["init", "."]))
      .await
      .map_err(|source| ReleaseDirError::Git { action: "init", source })?;
    Ok(())
  }

  /// Short hash of `HEAD`, or a placeholder for non-git directories and
  /// repositories without commits.
  pub async fn last_commit_sha(&self) -> Result<String, ReleaseDirError> {
    match self.runner.run_complex_command(&self.git(&["rev-parse", "--short", "HEAD"])).await {
      Ok(output) => Ok(output.stdout.trim().to_string()),
      Err(CmdError::Failed { stderr, .. }) if is_not_a_repo(&stderr) => Ok(NON_GIT_COMMIT.to_string()),
      Err(e) if is_git_missing(&e) => Ok(NON_GIT_COMMIT.to_string()),
      Err(CmdError::Failed { stderr, .. }) if stderr.contains("unknown revision") => Ok(EMPTY_REPO_COMMIT.to_string()),
      Err(source) => Err(ReleaseDirError::Git {
        action: "rev-parse",
        source,
      }),
    }
  }

  /// Lines of `git status --short`; empty outside of git.
  pub async fn status(&self) -> Result<Vec<String>, ReleaseDirError> {
    match self.runner.run_complex_command(&self.git(&["status", "--short"])).await {
      Ok(output) => Ok(output.stdout.lines().filter(|l| !l.trim().is_empty()).map(String::from).collect()),
      Err(CmdError::Failed { stderr, .. }) if is_not_a_repo(&stderr) => Ok(Vec::new()),
      Err(e) if is_git_missing(&e) => {
        debug!(dir = ?self.dir, "git not installed, skipping status");
        Ok(Vec::new())
      }
      Err(source) => Err(ReleaseDirError::Git { action: "status", source }),
    }
  }

  /// Whether the working tree has local modifications. Modifications are
  /// an error unless `force` is set.
  pub async fn must_not_be_dirty(&self, force: bool) -> Result<bool, ReleaseDirError> {
    let status = self.status().await?;
    if status.is_empty() {
      return Ok(false);
    }

    if !force {
      return Err(ReleaseDirError::Dirty(status.join("\n")));
    }

    warn!(dir = ?self.dir, "building with uncommitted changes");
    debug!(status = %status.join("\n"), "git status");
    Ok(true)
  }
}

fn is_git_missing(err: &CmdError) -> bool {
  matches!(err, CmdError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
}

fn is_not_a_repo(stderr: &str) -> bool {
  stderr.to_ascii_lowercase().contains("not a git repository")
}
