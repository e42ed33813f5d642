//! Release shape checks. Every problem is collected so all of them can be
//! reported in one pass.

use std::collections::HashSet;

use thiserror::Error;

use super::{Job, Release, ReleasePackages};
use crate::consts::JOB_MONIT_FILENAME;
use crate::error::MultiError;

/// Target every CPI job must render a template to.
pub const CPI_TEMPLATE_TARGET: &str = "bin/cpi";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("release name is missing")]
  ReleaseNameMissing,

  #[error("release version is missing")]
  ReleaseVersionMissing,

  #[error("{kind} name is missing")]
  NameMissing { kind: &'static str },

  #[error("{kind} '{name}' fingerprint is missing")]
  FingerprintMissing { kind: &'static str, name: String },

  #[error("{kind} '{name}' sha1 is missing")]
  Sha1Missing { kind: &'static str, name: String },

  #[error("{kind} '{name}' is defined more than once")]
  Duplicate { kind: &'static str, name: String },

  #[error("job '{job}' is missing template '{template}'")]
  MissingTemplate { job: String, template: String },

  #[error("job '{0}' is missing monit file")]
  MissingMonit(String),

  #[error("invalid CPI release '{release}': CPI release must contain specified job '{job}'")]
  CpiJobMissing { release: String, job: String },

  #[error(
    "invalid CPI release '{release}': specified CPI release job '{job}' must contain a template that renders to target 'bin/cpi'"
  )]
  CpiTemplateMissing { release: String, job: String },
}

pub fn validate(release: &Release) -> Result<(), MultiError<ValidationError>> {
  let mut errors = Vec::new();

  if release.name().is_empty() {
    errors.push(ValidationError::ReleaseNameMissing);
  }
  if release.version().is_empty() {
    errors.push(ValidationError::ReleaseVersionMissing);
  }

  let mut job_names = HashSet::new();
  for job in release.jobs() {
    check_resource("job", job.name(), job.fingerprint(), job.resource().has_archive(), &mut errors);
    if !job.name().is_empty() && !job_names.insert(job.name()) {
      errors.push(ValidationError::Duplicate {
        kind: "job",
        name: job.name().to_string(),
      });
    }
    check_job_files(job, &mut errors);
  }

  match release.packages() {
    ReleasePackages::Source(graph) => {
      for pkg in graph.iter() {
        check_resource("package", pkg.name(), pkg.fingerprint(), pkg.resource().has_archive(), &mut errors);
      }
    }
    ReleasePackages::Compiled(graph) => {
      for pkg in graph.iter() {
        check_resource(
          "compiled package",
          pkg.name(),
          pkg.fingerprint(),
          pkg.resource().has_archive(),
          &mut errors,
        );
      }
    }
  }

  MultiError::from_results(errors)
}

/// A CPI release must contain `job_name` and that job must render
/// `bin/cpi`.
pub fn validate_cpi(release: &Release, job_name: &str) -> Result<(), MultiError<ValidationError>> {
  let Some(job) = release.find_job(job_name) else {
    return Err(MultiError::new(vec![ValidationError::CpiJobMissing {
      release: release.name().to_string(),
      job: job_name.to_string(),
    }]));
  };

  if !job.templates.values().any(|target| target == CPI_TEMPLATE_TARGET) {
    return Err(MultiError::new(vec![ValidationError::CpiTemplateMissing {
      release: release.name().to_string(),
      job: job_name.to_string(),
    }]));
  }

  Ok(())
}

fn check_resource(kind: &'static str, name: &str, fingerprint: &str, archived: bool, errors: &mut Vec<ValidationError>) {
  if name.is_empty() {
    errors.push(ValidationError::NameMissing { kind });
  }
  if fingerprint.is_empty() {
    errors.push(ValidationError::FingerprintMissing {
      kind,
      name: name.to_string(),
    });
  }
  if !archived {
    errors.push(ValidationError::Sha1Missing {
      kind,
      name: name.to_string(),
    });
  }
}

/// Only jobs unpacked from a tarball have files to check.
fn check_job_files(job: &Job, errors: &mut Vec<ValidationError>) {
  let Some(dir) = job.extracted_path() else {
    return;
  };

  for template in job.templates.keys() {
    if !dir.join("templates").join(template).exists() {
      errors.push(ValidationError::MissingTemplate {
        job: job.name().to_string(),
        template: template.clone(),
      });
    }
  }

  if !dir.join(JOB_MONIT_FILENAME).exists() {
    errors.push(ValidationError::MissingMonit(job.name().to_string()));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::release::graph::DependencyGraph;
  use crate::release::Package;
  use crate::resource::{ArchiveRef, Resource};
  use crate::util::digest::{DigestAlgorithm, calculate_bytes};
  use std::path::PathBuf;
  use tempfile::tempdir;

  fn archived(name: &str, fp: &str) -> Resource {
    Resource::with_archive(name, fp, ArchiveRef {
      path: PathBuf::from(format!("/tmp/{name}.tgz")),
      digest: calculate_bytes(b"x", DigestAlgorithm::Sha1),
    })
  }

  fn release(jobs: Vec<Job>, packages: Vec<Package>) -> Release {
    Release::new("r", "1", jobs, ReleasePackages::Source(DependencyGraph::link(packages).unwrap()), None).unwrap()
  }

  fn messages(err: MultiError<ValidationError>) -> Vec<String> {
    err.errors().iter().map(ToString::to_string).collect()
  }

  #[test]
  fn valid_release_passes() {
    let mut job = Job::new(archived("web", "jfp"));
    job.package_names = vec!["ruby".into()];
    let release = release(vec![job], vec![Package::new(archived("ruby", "rfp"), vec![])]);

    validate(&release).unwrap();
  }

  #[test]
  fn reports_every_problem() {
    let bare = Release::new("", "", vec![], ReleasePackages::default(), None).unwrap();
    let errors = messages(validate(&bare).unwrap_err());
    assert_eq!(errors, vec!["release name is missing", "release version is missing"]);

    let release = release(
      vec![Job::new(Resource::existing("", "")), Job::new(Resource::existing("web", ""))],
      vec![Package::new(Resource::existing("ruby", "rfp"), vec![])],
    );
    let errors = messages(validate(&release).unwrap_err());
    assert!(errors.contains(&"job name is missing".to_string()));
    assert!(errors.contains(&"job '' fingerprint is missing".to_string()));
    assert!(errors.contains(&"job 'web' fingerprint is missing".to_string()));
    assert!(errors.contains(&"job 'web' sha1 is missing".to_string()));
    assert!(errors.contains(&"package 'ruby' sha1 is missing".to_string()));
    assert_eq!(errors.len(), 6);
  }

  #[test]
  fn extracted_jobs_need_templates_and_monit() {
    let temp = tempdir().unwrap();
    let mut job = Job::new(archived("web", "jfp")).with_extracted_path(temp.path());
    job.templates.insert("ctl.erb".into(), "bin/ctl".into());

    let errors = messages(validate(&release(vec![job], vec![])).unwrap_err());
    assert_eq!(errors, vec![
      "job 'web' is missing template 'ctl.erb'",
      "job 'web' is missing monit file"
    ]);
  }

  #[test]
  fn cpi_release_needs_job_with_cpi_template() {
    let mut job = Job::new(archived("cpi", "jfp"));
    job.templates.insert("cpi.erb".into(), "bin/other".into());
    let mut release = release(vec![job], vec![]);
    release.set_name("aws-cpi");

    let err = validate_cpi(&release, "missing").unwrap_err();
    assert_eq!(
      err.to_string(),
      "invalid CPI release 'aws-cpi': CPI release must contain specified job 'missing'"
    );

    let err = validate_cpi(&release, "cpi").unwrap_err();
    assert!(err.to_string().contains("must contain a template that renders to target 'bin/cpi'"));

    release.jobs_mut()[0].templates.insert("cpi".into(), "bin/cpi".into());
    validate_cpi(&release, "cpi").unwrap();
  }
}
