use std::{io, path::{Path, PathBuf}};

use cbz_store_core::cmp::alphanum;

/// Directories of a pack source: every subdirectory in natural name order,
/// or the source itself if it has no subdirectories.
pub fn chapter_dirs(p: &Path) -> io::Result<Vec<PathBuf>> {
    if !p.metadata()?.is_dir() {
        return Err(io::Error::other("Not a directory"))
    }
    let mut dirs = Vec::new();
    for de in walkdir::WalkDir::new(p).min_depth(1).max_depth(1) {
        let de = de?;
        let hidden = de.file_name().to_string_lossy().starts_with('.');
        if de.file_type().is_dir() && !hidden {
            dirs.push(de.into_path());
        }
    }
    if dirs.is_empty() {
        dirs.push(p.to_path_buf());
    }
    dirs.sort_by(|a, b| alphanum(&a.to_string_lossy(), &b.to_string_lossy()));
    Ok(dirs)
}

/// A displayed chapter name of a directory.
pub fn dir_name(p: &Path) -> String {
    p.file_name().map_or_else(|| "Chapter".to_owned(), |n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdirectories_are_chapters() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(chapter_dirs(dir.path()).unwrap(), [dir.path().to_path_buf()]);
        for d in ["Ch 10", "Ch 2", ".git"] {
            std::fs::create_dir(dir.path().join(d)).unwrap();
        }
        let names: Vec<_> = chapter_dirs(dir.path()).unwrap().iter().map(|p| dir_name(p)).collect();
        assert_eq!(names, ["Ch 2", "Ch 10"]);
    }
}
