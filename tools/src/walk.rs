// Directory walk shared by the scanner, rewriter and renamer.
//
// Depth-first, entries sorted by name, directories whose name starts with
// '.' pruned with everything under them. Symlinked directories are not
// followed.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// `root` followed by every non-hidden directory below it.
pub(crate) fn directories(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::MissingRoot(root.to_path_buf()));
    }
    let mut out = vec![root.to_path_buf()];
    descend(root, &mut out)?;
    Ok(out)
}

/// Visible subdirectories of `dir`, sorted by name.
pub(crate) fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| Error::io(entry.path(), e))?;
        if file_type.is_dir() && !is_hidden(&entry.path()) {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Regular files directly inside `dir`, sorted by name.
pub(crate) fn files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| Error::io(entry.path(), e))?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn descend(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for sub in subdirectories(dir)? {
        out.push(sub.clone());
        descend(&sub, out)?;
    }
    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}
