//! Release versions such as `12`, `1.1` and `1.1+dev.3`.
//!
//! A version is a dotted release segment, optionally followed by a
//! `-pre` segment and a `+post` segment. Dev releases carry a `dev.N` post
//! segment on top of the last final version.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const DEV_SEGMENT: &str = "dev";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
  #[error("invalid version '{0}'")]
  Parse(String),

  #[error("cannot increment '{0}': last component is not numeric")]
  Increment(String),

  #[error("cannot increment '{0}': last component is at its maximum")]
  Overflow(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
  Int(u64),
  Str(String),
}

impl Ord for Component {
  fn cmp(&self, other: &Self) -> Ordering {
    match (self, other) {
      (Component::Int(a), Component::Int(b)) => a.cmp(b),
      (Component::Str(a), Component::Str(b)) => a.cmp(b),
      (Component::Int(_), Component::Str(_)) => Ordering::Less,
      (Component::Str(_), Component::Int(_)) => Ordering::Greater,
    }
  }
}

impl PartialOrd for Component {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for Component {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Component::Int(n) => write!(f, "{n}"),
      Component::Str(s) => f.write_str(s),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Segment(Vec<Component>);

impl Segment {
  fn parse(s: &str) -> Option<Self> {
    let mut components = Vec::new();
    for part in s.split('.') {
      if part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
      }
      components.push(match part.parse::<u64>() {
        Ok(n) => Component::Int(n),
        Err(_) => Component::Str(part.to_string()),
      });
    }
    Some(Self(components))
  }

  /// Bump the last component. `version` names the whole version in errors.
  fn increment(&self, version: &ReleaseVersion) -> Result<Self, VersionError> {
    let mut components = self.0.clone();
    match components.last_mut() {
      Some(Component::Int(n)) => {
        *n = n
          .checked_add(1)
          .ok_or_else(|| VersionError::Overflow(version.to_string()))?;
      }
      _ => return Err(VersionError::Increment(version.to_string())),
    }
    Ok(Self(components))
  }
}

impl fmt::Display for Segment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
    f.write_str(&parts.join("."))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseVersion {
  release: Segment,
  pre_release: Option<Segment>,
  post_release: Option<Segment>,
}

impl ReleaseVersion {
  /// The version before the first final release.
  pub fn zero() -> Self {
    Self {
      release: Segment(vec![Component::Int(0)]),
      pre_release: None,
      post_release: None,
    }
  }

  pub fn is_dev(&self) -> bool {
    matches!(&self.post_release, Some(Segment(c)) if c.first() == Some(&Component::Str(DEV_SEGMENT.to_string())))
  }

  /// Next final version: `1.1` becomes `1.2`.
  pub fn next_final(&self) -> Result<Self, VersionError> {
    let release = self.release.increment(self)?;
    Ok(Self {
      release,
      pre_release: None,
      post_release: None,
    })
  }

  /// Next dev version: `1.1` becomes `1.1+dev.1`, `1.1+dev.1` becomes
  /// `1.1+dev.2`.
  pub fn next_dev(&self) -> Result<Self, VersionError> {
    let post_release = match &self.post_release {
      Some(post) => post.increment(self)?,
      None => Segment(vec![Component::Str(DEV_SEGMENT.to_string()), Component::Int(1)]),
    };
    Ok(Self {
      post_release: Some(post_release),
      ..self.clone()
    })
  }
}

impl Ord for ReleaseVersion {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .release
      .cmp(&other.release)
      .then_with(|| match (&self.pre_release, &other.pre_release) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(b),
      })
      .then_with(|| match (&self.post_release, &other.post_release) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(b),
      })
  }
}

impl PartialOrd for ReleaseVersion {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl FromStr for ReleaseVersion {
  type Err = VersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let err = || VersionError::Parse(s.to_string());

    let (rest, post) = match s.split_once('+') {
      Some((rest, post)) => (rest, Some(Segment::parse(post).ok_or_else(err)?)),
      None => (s, None),
    };
    let (release, pre) = match rest.split_once('-') {
      Some((release, pre)) => (release, Some(Segment::parse(pre).ok_or_else(err)?)),
      None => (rest, None),
    };

    Ok(Self {
      release: Segment::parse(release).ok_or_else(err)?,
      pre_release: pre,
      post_release: post,
    })
  }
}

impl fmt::Display for ReleaseVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.release)?;
    if let Some(pre) = &self.pre_release {
      write!(f, "-{pre}")?;
    }
    if let Some(post) = &self.post_release {
      write!(f, "+{post}")?;
    }
    Ok(())
  }
}
