//! Terminal output for the release commands.
//!
//! Status lines carry a colored symbol; warnings and errors go to stderr.
//! Jobs, packages and blobs are listed one per line as
//! `name/version digest`, with dependencies on an indented line below.
//! `-o json` replaces all of it with a single JSON document on stdout.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const ENTRY: &str = "•";
  pub const STEP: &str = "→";
}

/// Digest or blob id cut to 12 hex characters. A `sha256:` prefix is kept
/// so the two algorithms stay distinguishable.
pub fn short_digest(digest: &str) -> &str {
  let start = digest.find(':').map_or(0, |i| i + 1);
  let end = (start + 12).min(digest.len());
  &digest[..end]
}

/// Blob sizes in binary units.
pub fn format_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

  if bytes < 1024 {
    return format!("{bytes} B");
  }
  let mut size = bytes as f64 / 1024.0;
  let mut unit = 0;
  while size >= 1024.0 && unit < UNITS.len() - 1 {
    size /= 1024.0;
    unit += 1;
  }
  format!("{size:.1} {}", UNITS[unit])
}

/// Elapsed time rounded to milliseconds.
pub fn format_elapsed(elapsed: Duration) -> String {
  let rounded = Duration::from_millis(elapsed.as_millis() as u64);
  humantime::format_duration(rounded).to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

/// Validation problems and other non-fatal findings.
pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

/// A plain note, such as "No blobs tracked".
pub fn print_note(message: &str) {
  println!(
    "{} {}",
    symbols::ENTRY.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

/// `  Label: value` under a headline.
pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// Bold section title preceded by a blank line.
pub fn print_section(title: &str) {
  println!();
  println!("{}", title.if_supports_color(Stream::Stdout, |s| s.bold()));
}

/// One job, package or license: `  • name/version digest`.
pub fn print_entry(name: &str, version: &str, digest: &str) {
  println!(
    "  {} {}/{} {}",
    symbols::ENTRY,
    name.if_supports_color(Stream::Stdout, |s| s.bold()),
    version,
    short_digest(digest).if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

/// Names an entry depends on, on the line below it. Nothing for an empty list.
pub fn print_entry_deps(names: &[String]) {
  if !names.is_empty() {
    println!("      {} {}", symbols::STEP, names.join(", "));
  }
}

/// A tracked blob: path, size, sha1 and its blobstore id (or `(local)`).
pub fn print_blob(path: &str, size: u64, sha1: &str, blob_id: Option<&str>) {
  let state = match blob_id {
    Some(id) => short_digest(id).to_string(),
    None => "(local)"
      .if_supports_color(Stream::Stdout, |s| s.yellow())
      .to_string(),
  };
  println!(
    "  {} {:<40} {:>10}  {}  {}",
    symbols::ENTRY,
    path,
    format_size(size),
    short_digest(sha1),
    state
  );
}

/// A file that was removed from the release directory.
pub fn print_removed(path: &str) {
  println!("  {} removed {}", symbols::STEP, path);
}

pub fn print_step_started(name: &str) {
  println!("  {} {}", symbols::STEP, name);
}

pub fn print_step_finished(name: &str, error: Option<&str>) {
  match error {
    None => println!(
      "  {} {}",
      symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
      name
    ),
    Some(e) => println!(
      "  {} {}: {}",
      symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
      name,
      e
    ),
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}
