//! Shared error helpers.

use std::fmt;

/// A collection of independent failures from a bulk operation.
///
/// Bulk operations such as parallel blob downloads or release validation keep
/// going after the first failure and report every problem at once.
#[derive(Debug)]
pub struct MultiError<E> {
  errors: Vec<E>,
}

impl<E> MultiError<E> {
  pub fn new(errors: Vec<E>) -> Self {
    Self { errors }
  }

  /// Returns `Ok(())` for an empty list, otherwise the combined error.
  pub fn from_results(errors: Vec<E>) -> Result<(), Self> {
    if errors.is_empty() {
      Ok(())
    } else {
      Err(Self::new(errors))
    }
  }

  pub fn errors(&self) -> &[E] {
    &self.errors
  }

  pub fn len(&self) -> usize {
    self.errors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.errors.is_empty()
  }
}

impl<E: fmt::Display> fmt::Display for MultiError<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
    write!(f, "{}", messages.join("\n"))
  }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for MultiError<E> {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_results_empty_is_ok() {
    assert!(MultiError::<String>::from_results(vec![]).is_ok());
  }

  #[test]
  fn display_joins_every_error() {
    let err = MultiError::from_results(vec!["first".to_string(), "second".to_string()]).unwrap_err();
    assert_eq!(err.len(), 2);
    assert_eq!(err.to_string(), "first\nsecond");
  }
}
