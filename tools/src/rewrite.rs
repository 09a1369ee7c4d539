//! Batch normalizer for `package.json`.
//!
//! Each file is backed up to `package.json.bak`, parsed, and replaced by a
//! [`PackageDocument`] with fixed key order and install targets rewritten
//! to `{dir}/{source}`, where `dir` is the directory that held the last
//! `.py` segment of the old target. A batch removes its backups at the end.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::metadata::{
    self, BACKUP_FILE, Comments, DEFAULT_AUTHOR, DEFAULT_VERSION, PACKAGE_FILE, PackageDocument,
    RewriteDefaults, UrlEntry,
};
use crate::walk;

/// Result of rewriting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub path: PathBuf,
    pub document: PackageDocument,
    /// `urls` exactly as found, for the change log
    pub urls_before: String,
    /// Entries dropped because they were neither a pair nor `{src, dest}`
    pub skipped: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RewriteSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<Error>,
    pub backups: CleanSummary,
}

#[derive(Debug, Default)]
pub struct CleanSummary {
    pub removed: usize,
    pub failed: Vec<Error>,
}

/// Normalize one `package.json` in place. The backup is left behind;
/// [`rewrite_all`] removes backups once the batch is done.
pub fn rewrite_package(path: &Path, defaults: &RewriteDefaults) -> Result<RewriteOutcome> {
    let backup = path.with_file_name(BACKUP_FILE);
    fs::copy(path, &backup).map_err(|source| Error::Backup {
        path: path.to_path_buf(),
        source,
    })?;

    let Value::Object(original) = metadata::read_json(path)? else {
        return Err(Error::Invalid {
            path: path.to_path_buf(),
            reason: "top-level value is not an object".into(),
        });
    };

    let dir_name = path.parent().map(walk::file_name).unwrap_or_default();
    let name = text_or(&original, "name", || dir_name.clone());
    let version = text_or(&original, "version", || DEFAULT_VERSION.into());
    let description = text_or(&original, "description", || {
        format!("A MicroPython library for {name} module")
    });
    let author = text_or(&original, "author", || DEFAULT_AUTHOR.into());

    let raw_urls = original.get("urls").cloned().unwrap_or(Value::Null);
    let (urls, skipped) = rewrite_urls(&raw_urls, &name);
    for entry in &skipped {
        log::warn!("{}: skipped malformed urls entry {entry}", path.display());
    }

    let document = PackageDocument {
        name,
        version,
        description,
        author,
        license: defaults.license.clone(),
        chips: defaults.chips.clone(),
        fw: defaults.fw.clone(),
        comments: Comments::default(),
        urls,
    };
    let text = document.to_json().map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(|e| Error::io(path, e))?;

    log::info!(
        "rewrote {}: name={} version={}",
        path.display(),
        document.name,
        document.version
    );
    Ok(RewriteOutcome {
        path: path.to_path_buf(),
        document,
        urls_before: raw_urls.to_string(),
        skipped,
    })
}

/// Rewrite every `package.json` under `root` (root included), then delete
/// all backups. Per-file failures are collected, not fatal.
pub fn rewrite_all(root: &Path, defaults: &RewriteDefaults) -> Result<RewriteSummary> {
    let mut summary = RewriteSummary::default();
    for dir in walk::directories(root)? {
        let path = dir.join(PACKAGE_FILE);
        if !path.is_file() {
            continue;
        }
        summary.total += 1;
        match rewrite_package(&path, defaults) {
            Ok(_) => summary.succeeded += 1,
            Err(e) => {
                log::warn!("{e}");
                summary.failed.push(e);
            }
        }
    }
    summary.backups = clean_backups(root)?;
    log::info!(
        "rewrite done: {} total, {} ok, {} failed",
        summary.total,
        summary.succeeded,
        summary.failed.len()
    );
    Ok(summary)
}

/// Delete every `package.json.bak` under `root`.
pub fn clean_backups(root: &Path) -> Result<CleanSummary> {
    let mut summary = CleanSummary::default();
    for dir in walk::directories(root)? {
        let backup = dir.join(BACKUP_FILE);
        if !backup.is_file() {
            continue;
        }
        match fs::remove_file(&backup) {
            Ok(()) => {
                log::debug!("removed {}", backup.display());
                summary.removed += 1;
            }
            Err(e) => summary.failed.push(Error::io(backup, e)),
        }
    }
    Ok(summary)
}

/// String field, or the fallback when missing, null or empty. Other JSON
/// values are kept as their text.
fn text_or(
    doc: &serde_json::Map<String, Value>,
    field: &str,
    fallback: impl FnOnce() -> String,
) -> String {
    match metadata::field_str(doc, field) {
        Some(s) => s.to_string(),
        None if metadata::has_field(doc, field) => metadata::field_text(doc, field).unwrap_or_default(),
        None => fallback(),
    }
}

fn rewrite_urls(raw: &Value, name: &str) -> (Vec<[String; 2]>, Vec<String>) {
    let entries = match raw {
        Value::Null => &[][..],
        Value::Array(items) => items.as_slice(),
        other => return (Vec::new(), vec![other.to_string()]),
    };
    if entries.is_empty() {
        let file = format!("{name}.py");
        return (vec![[file.clone(), file]], Vec::new());
    }

    let mut urls = Vec::new();
    let mut skipped = Vec::new();
    for entry in entries {
        match UrlEntry::parse(entry) {
            UrlEntry::Pair { source, target } => {
                let dir = metadata::parent_dir_of_py(&target);
                let target = if dir.is_empty() {
                    source.clone()
                } else {
                    format!("{dir}/{source}")
                };
                urls.push([source, target]);
            }
            UrlEntry::Malformed(text) => skipped.push(text),
        }
    }
    (urls, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn package(root: &Path, dir: &str, text: &str) -> PathBuf {
        let dir = root.join(dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(PACKAGE_FILE);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = package(temp_dir.path(), "ds1307_driver", "{}");
        let out = rewrite_package(&path, &RewriteDefaults::default()).unwrap();
        let doc = &out.document;
        assert_eq!(doc.name, "ds1307_driver");
        assert_eq!(doc.version, "1.0.0");
        assert_eq!(doc.description, "A MicroPython library for ds1307_driver module");
        assert_eq!(doc.author, "unknown");
        assert_eq!(doc.license, "MIT");
        assert_eq!(doc.urls, [["ds1307_driver.py".to_string(), "ds1307_driver.py".to_string()]]);
        assert!(path.with_file_name(BACKUP_FILE).exists());
    }

    #[test]
    fn test_url_forms_and_bom() {
        let temp_dir = TempDir::new().unwrap();
        let path = package(
            temp_dir.path(),
            "pkg",
            "\u{feff}{\"name\":\"温度\",\"urls\":[\
             [\"a.py\",\"github:x/repo/code/a.py\"],\
             {\"src\":\"b.py\",\"dest\":\"b.py\"},\
             [\"lonely\"]]}",
        );
        let defaults = RewriteDefaults {
            license: "Apache-2.0".into(),
            ..RewriteDefaults::default()
        };
        let out = rewrite_package(&path, &defaults).unwrap();
        assert_eq!(
            out.document.urls,
            [
                ["a.py".to_string(), "code/a.py".to_string()],
                ["b.py".to_string(), "b.py".to_string()],
            ]
        );
        assert_eq!(out.skipped, ["[\"lonely\"]"]);

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"name\": \"温度\""));
        assert!(written.contains("\"license\": \"Apache-2.0\""));
        let reparsed: PackageDocument = serde_json::from_str(&written).unwrap();
        assert_eq!(reparsed, out.document);
    }

    #[test]
    fn test_invalid_json_keeps_original() {
        let temp_dir = TempDir::new().unwrap();
        let path = package(temp_dir.path(), "pkg", "{\"name\": ");
        let err = rewrite_package(&path, &RewriteDefaults::default()).unwrap_err();
        assert!(matches!(err, Error::Json { .. }));
        assert!(err.to_string().contains("line 1"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"name\": ");
    }

    #[test]
    fn test_rewrite_all_cleans_backups() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        package(root, "a", r#"{"name":"a"}"#);
        package(root, "b/c", "[1, 2]");
        package(root, "d", "oops");

        let summary = rewrite_all(root, &RewriteDefaults::default()).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed.len(), 2);
        assert_eq!(summary.backups.removed, 3);
        assert!(!root.join("a").join(BACKUP_FILE).exists());
    }

    #[test]
    fn test_rewrite_urls_non_list() {
        let (urls, skipped) = rewrite_urls(&json!({"src": "a.py"}), "x");
        assert!(urls.is_empty());
        assert_eq!(skipped.len(), 1);
        let (urls, _) = rewrite_urls(&json!([]), "x");
        assert_eq!(urls, [["x.py".to_string(), "x.py".to_string()]]);
    }
}
