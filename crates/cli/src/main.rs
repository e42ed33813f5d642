//! boshrel: build, finalize, inspect and compile BOSH releases.

mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{BlobCommand, CompileArgs, CreateReleaseArgs, FinalizeReleaseArgs};
use crate::output::{OutputFormat, print_error};

/// Release building for BOSH
#[derive(Parser)]
#[command(name = "boshrel", author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Release directory
  #[arg(long, global = true, default_value = ".")]
  dir: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Lay out a new release directory
  InitRelease {
    /// Also run `git init`
    #[arg(long)]
    git: bool,
  },

  /// Remove every dev release and dev build
  ResetRelease {
    /// Skip the confirmation prompt
    #[arg(long)]
    force: bool,
  },

  /// Build a dev (or final) release from the release directory
  CreateRelease(CreateReleaseArgs),

  /// Publish a release tarball as a final release
  FinalizeRelease(FinalizeReleaseArgs),

  /// Show the jobs and packages of a release tarball
  InspectRelease {
    /// Release tarball
    tarball: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Compile the packages needed by jobs of a release
  Compile(CompileArgs),

  #[command(flatten)]
  Blob(BlobCommand),
}

fn init_logging(verbose: bool) {
  let default = if verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<()> {
  let dir = cli.dir;
  match cli.command {
    Commands::InitRelease { git } => cmd::cmd_init_release(&dir, git),
    Commands::ResetRelease { force } => cmd::cmd_reset_release(&dir, force),
    Commands::CreateRelease(args) => cmd::cmd_create_release(&dir, args),
    Commands::FinalizeRelease(args) => cmd::cmd_finalize_release(&dir, args),
    Commands::InspectRelease { tarball, output } => cmd::cmd_inspect_release(&tarball, output),
    Commands::Compile(args) => cmd::cmd_compile(&dir, args),
    Commands::Blob(command) => cmd::cmd_blob(&dir, command),
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::FAILURE
    }
  }
}
