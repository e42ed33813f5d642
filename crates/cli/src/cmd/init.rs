//! `boshrel init-release` and `boshrel reset-release`.

use std::io::{self, IsTerminal, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;

use super::{open_release_dir, runtime};
use crate::output::{print_note, print_stat, print_success};

pub fn cmd_init_release(dir: &Path, git: bool) -> Result<()> {
  std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
  let dir = dunce::canonicalize(dir).with_context(|| format!("Failed to resolve {}", dir.display()))?;

  let rt = runtime()?;
  let name = rt
    .block_on(async {
      let release_dir = open_release_dir(&dir).await;
      release_dir.init(git).await?;
      release_dir.default_name()
    })
    .context("Failed to initialize release directory")?;

  print_success(&format!("Initialized release '{}'", name.bold()));
  print_stat("Directory", &dir.display().to_string());
  println!();
  println!("{}", "Next steps:".bold());
  println!("  1. Add packages under {} and jobs under {}", "packages/".cyan(), "jobs/".cyan());
  println!("  2. Configure a blobstore in {}", "config/final.yml".cyan());
  println!("  3. Run: {}", "boshrel create-release".cyan());

  Ok(())
}

pub fn cmd_reset_release(dir: &Path, force: bool) -> Result<()> {
  if !confirm(&format!("Remove all dev releases in {}?", dir.display()), force)? {
    print_note("Nothing removed");
    return Ok(());
  }

  let rt = runtime()?;
  rt.block_on(async { open_release_dir(dir).await.reset().await })
    .context("Failed to reset release directory")?;

  print_success("Removed dev releases and dev builds");
  Ok(())
}

/// Ask on stderr unless `force` is set. Refuses to guess without a terminal.
fn confirm(question: &str, force: bool) -> Result<bool> {
  if force {
    return Ok(true);
  }

  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    bail!("Refusing to prompt without a terminal. Use --force to proceed.");
  }

  let mut stderr = io::stderr();
  write!(stderr, "{} [y/N] ", question)?;
  stderr.flush()?;

  let mut answer = String::new();
  io::stdin().read_line(&mut answer)?;
  Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
