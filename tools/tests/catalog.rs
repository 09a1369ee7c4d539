//! End-to-end: scan a messy tree, normalize it, scan again.

use std::fs;
use std::path::Path;

use catalog_tools::{
    PackageDocument, RewriteDefaults, UrlEntry, rename_markdown, render_scan, rewrite_all,
    scan_packages,
};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn messy_tree(root: &Path) {
    write(
        root,
        "sensors/bh1750_driver/package.json",
        r#"{"name":"bh1750_driver","version":"1.0.0","description":"BH1750 light sensor","author":"someone",
            "urls":[["bh1750.py","github:someone/repo/sensors/bh1750_driver/code/bh1750.py"]]}"#,
    );
    write(
        root,
        "sensors/bh1750_driver/code/Usage.md",
        "# BH1750",
    );
    write(
        root,
        "motor/fan_driver/package.json",
        r#"{"name":"fan_driver","urls":[{"src":"fan.py","dest":"code/fan.py"},["x"]]}"#,
    );
    write(root, "misc/broken_driver/package.json", "{ nope");
}

#[test]
fn scan_rewrite_rescan() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    messy_tree(root);

    let before = scan_packages(root).unwrap();
    assert_eq!(before.len(), 3);
    let fan = before.iter().find(|p| p.driver_folder == "fan_driver").unwrap();
    assert_eq!(fan.missing_fields, ["version", "description", "author"]);
    assert!(matches!(fan.urls[1], UrlEntry::Malformed(_)));
    let report = render_scan(root, &before);
    assert!(report.contains("[motor]"));
    assert!(report.contains("! missing required fields: version, description, author"));

    let summary = rewrite_all(root, &RewriteDefaults::default()).unwrap();
    assert_eq!((summary.total, summary.succeeded, summary.failed.len()), (3, 2, 1));
    assert_eq!(summary.backups.removed, 3);

    let text = fs::read_to_string(root.join("motor/fan_driver/package.json")).unwrap();
    let doc: PackageDocument = serde_json::from_str(&text).unwrap();
    assert_eq!(doc.author, "unknown");
    assert_eq!(doc.urls, [["fan.py".to_string(), "code/fan.py".to_string()]]);

    let after = scan_packages(root).unwrap();
    let clean: Vec<_> = after
        .iter()
        .filter(|p| p.error.is_none())
        .map(|p| p.has_warnings())
        .collect();
    assert_eq!(clean, [false, false]);

    let renamed = rename_markdown(root, false).unwrap();
    assert_eq!(renamed.renamed.len(), 1);
    assert!(root.join("sensors/bh1750_driver/code/README.md").exists());
}
