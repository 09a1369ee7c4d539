//! Maintenance tooling for the driver catalog's package metadata.
//!
//! Every driver directory ships a `package.json` for mip/mpremote/upypi
//! installs. This crate audits those files ([`scan`], [`report`]),
//! rewrites them into one normalized shape ([`rewrite`]) and normalizes
//! README file names ([`rename`]).

pub mod error;
pub mod metadata;
pub mod rename;
pub mod report;
pub mod rewrite;
pub mod scan;
mod walk;

pub use error::{Error, Result};
pub use metadata::{PackageDocument, RewriteDefaults, UrlEntry};
pub use rename::{RenameSummary, rename_markdown};
pub use report::render_scan;
pub use rewrite::{CleanSummary, RewriteOutcome, RewriteSummary, clean_backups, rewrite_all, rewrite_package};
pub use scan::{PackageInfo, group_by_subdir, scan_packages};
