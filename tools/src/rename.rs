//! Markdown → README renamer.
//!
//! In each directory the `.md` files (any case) become `README.md`,
//! `README_1.md`, `README_2.md`… in sorted order, with an existing
//! `README.md` keeping first place. Renames go through temporary names so
//! no file in the set can overwrite another.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::walk;

const README: &str = "README.md";

#[derive(Debug, Default)]
pub struct RenameSummary {
    /// Markdown files seen
    pub found: usize,
    /// Files whose name changed (or would change, on a dry run)
    pub renamed: Vec<(PathBuf, PathBuf)>,
    /// Already at their target name
    pub unchanged: usize,
    pub failed: Vec<Error>,
}

pub fn rename_markdown(root: &Path, dry_run: bool) -> Result<RenameSummary> {
    let mut summary = RenameSummary::default();
    for dir in walk::directories(root)? {
        let mut md: Vec<PathBuf> = walk::files(&dir)?
            .into_iter()
            .filter(|p| walk::file_name(p).to_lowercase().ends_with(".md"))
            .collect();
        if md.is_empty() {
            continue;
        }
        md.sort_by_key(|p| walk::file_name(p) != README);
        summary.found += md.len();

        let plan: Vec<(PathBuf, PathBuf)> = md
            .into_iter()
            .enumerate()
            .map(|(i, from)| {
                let to = dir.join(target_name(i));
                (from, to)
            })
            .filter(|(from, to)| {
                let same = from == to;
                if same {
                    summary.unchanged += 1;
                }
                !same
            })
            .collect();
        if plan.is_empty() {
            continue;
        }
        if dry_run {
            summary.renamed.extend(plan);
            continue;
        }
        apply(&plan, &mut summary);
    }
    log::info!(
        "{} markdown files, {} renamed, {} failed",
        summary.found,
        summary.renamed.len(),
        summary.failed.len()
    );
    Ok(summary)
}

fn target_name(index: usize) -> String {
    match index {
        0 => README.to_string(),
        n => format!("README_{n}.md"),
    }
}

fn apply(plan: &[(PathBuf, PathBuf)], summary: &mut RenameSummary) {
    // phase 1: park every moving file under a name outside the target set
    let mut parked = Vec::with_capacity(plan.len());
    for (i, (from, to)) in plan.iter().enumerate() {
        let tmp = from.with_file_name(format!(".readme-rename-{i}.tmp"));
        match fs::rename(from, &tmp) {
            Ok(()) => parked.push((from, tmp, to)),
            Err(e) => summary.failed.push(Error::io(from, e)),
        }
    }
    // phase 2: move into place
    for (from, tmp, to) in parked {
        if to.exists() {
            summary.failed.push(Error::io(
                to,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target exists"),
            ));
            restore(&tmp, from, summary);
            continue;
        }
        match fs::rename(&tmp, to) {
            Ok(()) => {
                log::debug!("{} -> {}", from.display(), to.display());
                summary.renamed.push((from.clone(), to.clone()));
            }
            Err(e) => {
                summary.failed.push(Error::io(from, e));
                restore(&tmp, from, summary);
            }
        }
    }
}

/// Move a parked file back to its original name. A failure here leaves the
/// content under the temporary name, so that path is what gets reported.
fn restore(tmp: &Path, from: &Path, summary: &mut RenameSummary) {
    if let Err(e) = fs::rename(tmp, from) {
        log::warn!("{} stranded at {}", from.display(), tmp.display());
        summary.failed.push(Error::io(tmp, e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_numbered_in_sorted_order() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("drv");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("b.md"), "b").unwrap();
        fs::write(dir.join("A.MD"), "a").unwrap();
        fs::write(dir.join("main.py"), "").unwrap();

        let summary = rename_markdown(temp_dir.path(), false).unwrap();
        assert_eq!(summary.found, 2);
        assert_eq!(summary.renamed.len(), 2);
        assert_eq!(names(&dir), ["README.md", "README_1.md", "main.py"]);
        assert_eq!(fs::read_to_string(dir.join("README.md")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dir.join("README_1.md")).unwrap(), "b");
    }

    #[test]
    fn test_existing_readme_never_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("README.md"), "keep").unwrap();
        fs::write(dir.join("README_1.md"), "old one").unwrap();
        fs::write(dir.join("notes.md"), "notes").unwrap();

        let summary = rename_markdown(dir, false).unwrap();
        assert_eq!(summary.unchanged, 2);
        assert!(summary.failed.is_empty());
        assert_eq!(fs::read_to_string(dir.join("README.md")).unwrap(), "keep");
        assert_eq!(fs::read_to_string(dir.join("README_1.md")).unwrap(), "old one");
        assert_eq!(fs::read_to_string(dir.join("README_2.md")).unwrap(), "notes");
    }

    #[test]
    fn test_swaps_through_temporary_names() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        // sorted: README_1.md, a.md → README.md taken by README_1.md's content
        fs::write(dir.join("README_1.md"), "first").unwrap();
        fs::write(dir.join("a.md"), "second").unwrap();

        rename_markdown(dir, false).unwrap();
        assert_eq!(names(dir), ["README.md", "README_1.md"]);
        assert_eq!(fs::read_to_string(dir.join("README.md")).unwrap(), "first");
        assert_eq!(fs::read_to_string(dir.join("README_1.md")).unwrap(), "second");
    }

    #[test]
    fn test_occupied_target_puts_file_back() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("README.md"), "someone else").unwrap();
        fs::write(dir.join("a.md"), "mine").unwrap();

        let mut summary = RenameSummary::default();
        apply(&[(dir.join("a.md"), dir.join("README.md"))], &mut summary);
        assert!(summary.renamed.is_empty());
        assert_eq!(summary.failed.len(), 1);
        match &summary.failed[0] {
            Error::Io { path, source } => {
                assert_eq!(path, &dir.join("README.md"));
                assert_eq!(source.kind(), std::io::ErrorKind::AlreadyExists);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(names(dir), ["README.md", "a.md"]);
        assert_eq!(fs::read_to_string(dir.join("a.md")).unwrap(), "mine");
        assert_eq!(fs::read_to_string(dir.join("README.md")).unwrap(), "someone else");
    }

    #[test]
    fn test_failed_restore_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let tmp = dir.join(".readme-rename-0.tmp");
        // nothing parked at tmp, so the move back cannot happen
        let mut summary = RenameSummary::default();
        restore(&tmp, &dir.join("a.md"), &mut summary);
        assert_eq!(summary.failed.len(), 1);
        assert!(matches!(&summary.failed[0], Error::Io { path, .. } if path == &tmp));
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("guide.md"), "").unwrap();
        let summary = rename_markdown(dir, true).unwrap();
        assert_eq!(summary.renamed.len(), 1);
        assert_eq!(names(dir), ["guide.md"]);
    }

    #[test]
    fn test_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let err = rename_markdown(&temp_dir.path().join("gone"), false).unwrap_err();
        assert!(matches!(err, Error::MissingRoot(_)));
    }
}
