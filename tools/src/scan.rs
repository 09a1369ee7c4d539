//! Recursive `package.json` audit.
//!
//! Every directory below the root that holds a `package.json` becomes one
//! [`PackageInfo`]. Parse failures are recorded on the entry rather than
//! aborting the scan, so one broken file never hides the rest.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::metadata::{self, PACKAGE_FILE, REQUIRED_FIELDS, UrlEntry};
use crate::walk;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// Category path relative to the root, `/`-separated. Packages directly
    /// under the root use the root's own name.
    pub subdir: String,
    /// Directory holding the package
    pub driver_folder: String,
    pub package_path: PathBuf,
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub urls: Vec<UrlEntry>,
    /// Read or parse failure; the fields above are empty when set
    pub error: Option<String>,
    pub missing_fields: Vec<&'static str>,
}

impl PackageInfo {
    fn new(subdir: &str, dir: &Path) -> Self {
        Self {
            subdir: subdir.to_string(),
            driver_folder: walk::file_name(dir),
            package_path: dir.join(PACKAGE_FILE),
            name: None,
            version: None,
            description: None,
            author: None,
            urls: Vec::new(),
            error: None,
            missing_fields: Vec::new(),
        }
    }

    pub fn malformed_urls(&self) -> impl Iterator<Item = (usize, &str)> {
        self.urls.iter().enumerate().filter_map(|(i, u)| match u {
            UrlEntry::Malformed(text) => Some((i, text.as_str())),
            UrlEntry::Pair { .. } => None,
        })
    }

    /// Missing fields, no urls or malformed url entries.
    pub fn has_warnings(&self) -> bool {
        !self.missing_fields.is_empty() || self.urls.is_empty() || self.malformed_urls().next().is_some()
    }
}

/// Walk `root` and collect every package below it, in sorted path order.
pub fn scan_packages(root: &Path) -> Result<Vec<PackageInfo>> {
    if !root.is_dir() {
        return Err(Error::MissingRoot(root.to_path_buf()));
    }
    let mut found = Vec::new();
    scan_dir(root, "", &walk::file_name(root), &mut found)?;
    log::info!("scanned {}: {} packages", root.display(), found.len());
    Ok(found)
}

/// Packages grouped by `subdir`, groups in order of first appearance.
pub fn group_by_subdir(packages: &[PackageInfo]) -> Vec<(&str, Vec<&PackageInfo>)> {
    let mut groups: Vec<(&str, Vec<&PackageInfo>)> = Vec::new();
    for info in packages {
        match groups.iter_mut().find(|g| g.0 == info.subdir) {
            Some(group) => group.1.push(info),
            None => groups.push((info.subdir.as_str(), vec![info])),
        }
    }
    groups
}

fn scan_dir(dir: &Path, parent: &str, root_name: &str, found: &mut Vec<PackageInfo>) -> Result<()> {
    for sub in walk::subdirectories(dir)? {
        let name = walk::file_name(&sub);
        if sub.join(PACKAGE_FILE).is_file() {
            let subdir = if parent.is_empty() { root_name } else { parent };
            found.push(inspect(subdir, &sub));
        }
        let child = if parent.is_empty() {
            name
        } else {
            format!("{parent}/{name}")
        };
        scan_dir(&sub, &child, root_name, found)?;
    }
    Ok(())
}

fn inspect(subdir: &str, dir: &Path) -> PackageInfo {
    let mut info = PackageInfo::new(subdir, dir);
    let value = match metadata::read_json(&info.package_path) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("{e}");
            info.error = Some(e.to_string());
            return info;
        }
    };
    let Value::Object(doc) = value else {
        info.error = Some("top-level value is not an object".into());
        return info;
    };

    info.missing_fields = REQUIRED_FIELDS
        .into_iter()
        .filter(|f| !metadata::has_field(&doc, f))
        .collect();
    info.name = metadata::field_text(&doc, "name");
    info.version = metadata::field_text(&doc, "version");
    info.description = metadata::field_text(&doc, "description");
    info.author = metadata::field_text(&doc, "author");
    info.urls = match doc.get("urls") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(UrlEntry::parse).collect(),
        Some(other) => vec![UrlEntry::Malformed(other.to_string())],
    };
    if !info.missing_fields.is_empty() {
        log::debug!("{}: missing {:?}", info.package_path.display(), info.missing_fields);
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_subdir_naming() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("catalog");
        write(&root, "top/package.json", r#"{"name":"top"}"#);
        write(&root, "sensors/bh1750/package.json", r#"{"name":"bh1750"}"#);
        write(&root, "sensors/bh1750/extra/package.json", r#"{"name":"extra"}"#);
        write(&root, ".hidden/x/package.json", r#"{"name":"hidden"}"#);

        let found = scan_packages(&root).unwrap();
        let keys: Vec<_> = found
            .iter()
            .map(|p| (p.subdir.as_str(), p.driver_folder.as_str()))
            .collect();
        assert_eq!(
            keys,
            [
                ("sensors", "bh1750"),
                ("sensors/bh1750", "extra"),
                ("catalog", "top"),
            ]
        );
    }

    #[test]
    fn test_missing_fields_and_urls() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "cat/drv/package.json",
            r#"{"name":"drv","version":"","author":null,
                "urls":[["drv.py","code/drv.py"],["broken"]]}"#,
        );
        let found = scan_packages(root).unwrap();
        let info = &found[0];
        assert_eq!(info.missing_fields, ["version", "description", "author"]);
        assert_eq!(info.name.as_deref(), Some("drv"));
        assert_eq!(info.urls.len(), 2);
        assert_eq!(info.malformed_urls().map(|(i, _)| i).collect::<Vec<_>>(), [1]);
        assert!(info.has_warnings());
    }

    #[test]
    fn test_bad_json_recorded_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "cat/bad/package.json", "{ not json");
        write(root, "cat/good/package.json", r#"{"name":"g","version":"1","description":"d","author":"a","urls":[["g.py","g.py"]]}"#);
        let found = scan_packages(root).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].error.as_deref().unwrap().contains("JSON"));
        assert!(found[1].error.is_none());
        assert!(!found[1].has_warnings());
    }

    #[test]
    fn test_grouping_keeps_first_appearance_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for rel in ["b/one", "a/two", "b/three"] {
            write(root, &format!("{rel}/package.json"), "{}");
        }
        let found = scan_packages(root).unwrap();
        let groups = group_by_subdir(&found);
        let names: Vec<_> = groups.iter().map(|(s, m)| (*s, m.len())).collect();
        assert_eq!(names, [("a", 1), ("b", 2)]);
    }
}
