//! Plain-text rendering of a scan.

use std::fmt::Write;
use std::path::Path;

use crate::metadata::{REQUIRED_FIELDS, UrlEntry};
use crate::scan::{PackageInfo, group_by_subdir};

const MISSING: &str = "(missing)";

/// Grouped report: one block per category, one per package, warning
/// lines prefixed with `!`, and a closing tally.
pub fn render_scan(root: &Path, packages: &[PackageInfo]) -> String {
    let mut out = String::new();
    // writes into a String cannot fail
    let _ = writeln!(out, "package.json scan of {}", root.display());
    let _ = writeln!(out, "required fields: {}", REQUIRED_FIELDS.join(", "));

    for (subdir, members) in group_by_subdir(packages) {
        let _ = writeln!(out, "\n[{subdir}]");
        for info in members {
            render_package(&mut out, info);
        }
    }

    let errors = packages.iter().filter(|p| p.error.is_some()).count();
    let warned = packages
        .iter()
        .filter(|p| p.error.is_none() && p.has_warnings())
        .count();
    let _ = writeln!(
        out,
        "\n{} packages, {} unreadable, {} with warnings",
        packages.len(),
        errors,
        warned
    );
    out
}

fn render_package(out: &mut String, info: &PackageInfo) {
    let _ = writeln!(out, "  {} ({})", info.driver_folder, info.package_path.display());
    if let Some(error) = &info.error {
        let _ = writeln!(out, "    ! {error}");
        return;
    }

    let fields = [
        ("name", &info.name),
        ("version", &info.version),
        ("description", &info.description),
        ("author", &info.author),
    ];
    for (label, value) in fields {
        let _ = writeln!(out, "    {label}: {}", value.as_deref().unwrap_or(MISSING));
    }

    let _ = writeln!(out, "    urls:");
    for (i, entry) in info.urls.iter().enumerate() {
        match entry {
            UrlEntry::Pair { source, target } => {
                let _ = writeln!(out, "      {}: {source} → {target}", i + 1);
            }
            UrlEntry::Malformed(text) => {
                let _ = writeln!(out, "      {}: malformed {text}", i + 1);
            }
        }
    }

    if !info.missing_fields.is_empty() {
        let _ = writeln!(
            out,
            "    ! missing required fields: {}",
            info.missing_fields.join(", ")
        );
    }
    if info.urls.is_empty() {
        let _ = writeln!(out, "    ! no urls");
    }
    for (i, _) in info.malformed_urls() {
        let _ = writeln!(out, "    ! urls entry {} is malformed", i + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn info(subdir: &str, folder: &str) -> PackageInfo {
        PackageInfo {
            subdir: subdir.into(),
            driver_folder: folder.into(),
            package_path: PathBuf::from(format!("{subdir}/{folder}/package.json")),
            name: Some(folder.into()),
            version: Some("1.0.0".into()),
            description: Some("d".into()),
            author: Some("a".into()),
            urls: vec![UrlEntry::Pair {
                source: format!("{folder}.py"),
                target: format!("code/{folder}.py"),
            }],
            error: None,
            missing_fields: Vec::new(),
        }
    }

    #[test]
    fn test_clean_package() {
        let text = render_scan(Path::new("root"), &[info("sensors", "bh1750")]);
        assert!(text.contains("\n[sensors]\n  bh1750 (sensors/bh1750/package.json)\n"));
        assert!(text.contains("      1: bh1750.py → code/bh1750.py\n"));
        assert!(!text.contains('!'));
        assert!(text.ends_with("1 packages, 0 unreadable, 0 with warnings\n"));
    }

    #[test]
    fn test_warnings() {
        let mut bad = info("input", "ec11");
        bad.author = None;
        bad.missing_fields = vec!["author"];
        bad.urls = vec![UrlEntry::Malformed("[\"x\"]".into())];
        let mut broken = info("input", "joystick");
        broken.error = Some("JSON error".into());

        let text = render_scan(Path::new("root"), &[bad, broken]);
        assert!(text.contains("    author: (missing)\n"));
        assert!(text.contains("    ! missing required fields: author\n"));
        assert!(text.contains("    ! urls entry 1 is malformed\n"));
        assert!(text.contains("    ! JSON error\n"));
        assert!(text.ends_with("2 packages, 1 unreadable, 1 with warnings\n"));
    }
}
