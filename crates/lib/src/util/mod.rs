//! Shared utilities.
//!
//! Common utilities used across the crate including digests, filesystem
//! helpers and test helpers.

pub mod digest;
pub mod fs;

#[cfg(test)]
pub mod testutil;
