pub const APP_NAME: &str = "boshrel";

/// Prefix mixed into every fingerprint so the format can evolve.
pub const FINGERPRINT_VERSION: &str = "v2";

/// `format-version` written into fingerprint and release indices.
pub const INDEX_FORMAT_VERSION: &str = "2";

pub const PACKAGE_SPEC_FILENAME: &str = "spec";
pub const PACKAGE_SPEC_LOCK_FILENAME: &str = "spec.lock";
pub const PACKAGING_SCRIPT: &str = "packaging";
pub const PRE_PACKAGING_SCRIPT: &str = "pre_packaging";

pub const JOB_SPEC_FILENAME: &str = "spec";
pub const JOB_MANIFEST_FILENAME: &str = "job.MF";
pub const JOB_MONIT_FILENAME: &str = "monit";

pub const RELEASE_MANIFEST_FILENAME: &str = "release.MF";
pub const LICENSE_ARCHIVE_FILENAME: &str = "license.tgz";

pub const BLOBS_INDEX_FILENAME: &str = "blobs.yml";

/// PATH handed to packaging scripts.
pub const COMPILE_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Overrides the local cache directory for index blobs.
pub const CACHE_DIR_ENV: &str = "BOSHREL_CACHE_DIR";
