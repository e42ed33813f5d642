//! boshrel-lib: release building core for BOSH releases
//!
//! This crate provides the pieces needed to turn a release directory into
//! fingerprinted, content-addressed artifacts:
//! - `resource`: fingerprinted jobs, packages and licenses backed by archives
//! - `release`: the release model, readers, writer and validation
//! - `compile`: package compilation with a cache keyed by dependency closure
//! - `index`: fingerprint indices for dev and final builds
//! - `releasedir`: blobs tracking and the dev/final release lifecycle

pub mod blobstore;
pub mod cmd;
pub mod compile;
pub mod compress;
pub mod consts;
pub mod error;
pub mod index;
pub mod platform;
pub mod progress;
pub mod release;
pub mod releasedir;
pub mod resource;
pub mod util;
