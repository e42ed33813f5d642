//! `boshrel create-release`.
//!
//! Builds a dev release from the release directory. With `--final` the
//! dev release is then finalized under the next final version.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use boshrel_lib::releasedir::ReleaseVersion;

use super::{ReleaseSummary, open_release_dir, runtime};
use crate::output::{OutputFormat, format_elapsed, print_note};

#[derive(Args, Debug)]
pub struct CreateReleaseArgs {
  /// Release name (default: `final_name` from config/final.yml)
  #[arg(long)]
  pub name: Option<String>,

  /// Release version (default: next dev or final version)
  #[arg(long)]
  pub version: Option<ReleaseVersion>,

  /// Build even if the git repository has local modifications
  #[arg(long)]
  pub force: bool,

  /// Also write a release tarball to this path
  #[arg(long)]
  pub tarball: Option<PathBuf>,

  /// Finalize the release after building it
  #[arg(long = "final")]
  pub final_release: bool,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

pub fn cmd_create_release(dir: &Path, args: CreateReleaseArgs) -> Result<()> {
  let started = Instant::now();
  let rt = runtime()?;

  let summary = rt.block_on(async {
    let release_dir = open_release_dir(dir).await;

    let name = match args.name {
      Some(name) => name,
      None => release_dir
        .default_name()
        .context("Check that you're in the top-level of the release directory")?,
    };

    let dev_version = match (&args.version, args.final_release) {
      (Some(version), false) => version.clone(),
      _ => release_dir.next_dev_version(&name).await?,
    };

    let mut release = release_dir
      .build_release(&name, &dev_version, args.force)
      .await
      .context("Failed to build release")?;

    if args.final_release {
      let final_version = match args.version {
        Some(version) => version,
        None => release_dir.next_final_version(&name).await?,
      };
      release.set_version(final_version.to_string());
      release_dir
        .finalize_release(&mut release, args.force)
        .await
        .context("Failed to finalize release")?;
    }

    let archive = match &args.tarball {
      Some(path) => Some(
        release_dir
          .build_release_archive(&release, Some(path))
          .await
          .context("Failed to write release tarball")?,
      ),
      None => None,
    };

    info!(release = %release.name(), version = %release.version(), "release created");
    anyhow::Ok(ReleaseSummary::new(&release, archive))
  })?;

  let headline = if args.final_release {
    "Created final release"
  } else {
    "Created dev release"
  };
  summary.print(headline, args.output)?;

  if !args.output.is_json() {
    println!();
    print_note(&format!("Finished in {}", format_elapsed(started.elapsed())));
  }
  Ok(())
}
