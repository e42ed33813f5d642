//! `boshrel finalize-release`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use boshrel_lib::release::ArchiveReader;
use boshrel_lib::releasedir::ReleaseVersion;

use super::{ReleaseSummary, open_release_dir, runtime};
use crate::output::OutputFormat;

#[derive(Args, Debug)]
pub struct FinalizeReleaseArgs {
  /// Release tarball to finalize
  pub tarball: PathBuf,

  /// Final release name (default: name in the tarball)
  #[arg(long)]
  pub name: Option<String>,

  /// Final release version (default: next final version)
  #[arg(long)]
  pub version: Option<ReleaseVersion>,

  /// Finalize even if the git repository has local modifications
  #[arg(long)]
  pub force: bool,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

pub fn cmd_finalize_release(dir: &Path, args: FinalizeReleaseArgs) -> Result<()> {
  let extract = tempfile::Builder::new()
    .prefix("boshrel-finalize-")
    .tempdir()
    .context("Failed to create extraction dir")?;

  let rt = runtime()?;
  let summary = rt.block_on(async {
    let release_dir = open_release_dir(dir).await;

    let mut release = ArchiveReader::new(release_dir.compressor())
      .read(&args.tarball, extract.path())
      .with_context(|| format!("Failed to read release tarball {}", args.tarball.display()))?;

    if let Some(name) = &args.name {
      release.set_name(name);
    }
    let version = match &args.version {
      Some(version) => version.clone(),
      None => release_dir.next_final_version(release.name()).await?,
    };
    release.set_version(version.to_string());

    release_dir
      .finalize_release(&mut release, args.force)
      .await
      .context("Failed to finalize release")?;

    anyhow::Ok(ReleaseSummary::new(&release, None))
  })?;

  summary.print("Finalized release", args.output)
}
