use std::{
    fs, io,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use walkdir::WalkDir;

use super::{EntryReader, ReadEntry};
use crate::cmp;

/// An extension of archives written by this crate.
pub const ARCHIVE_EXT: &str = "cbz";
const TEMP_SUFFIX: &str = ".tmp";
const MAX_FILE_NAME_LEN: usize = 170;

/// An entry reader implementation for a file system. It reads files of a single directory
/// in natural name order (`2.png` before `10.png`).
pub struct FsEntryReader {
    files: std::vec::IntoIter<PathBuf>,
    len: usize,
}
impl FsEntryReader {
    /// Creates an entry reader with a source directory path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn new(src_dir: &Path) -> io::Result<Self> {
        let mut files = Vec::new();
        for de in WalkDir::new(src_dir).min_depth(1).max_depth(1) {
            let de = de.map_err(io::Error::from)?;
            if de.file_type().is_file() && !is_hidden(de.path()) {
                files.push(de.into_path());
            }
        }
        files.sort_by(|a, b| cmp::alphanum(&a.to_string_lossy(), &b.to_string_lossy()));
        Ok(Self { len: files.len(), files: files.into_iter() })
    }
}
impl EntryReader for FsEntryReader {
    type RE<'a> = ReadFsEntry;
    fn read_next(&mut self) -> Option<Self::RE<'_>> {
        self.files.next().map(ReadFsEntry)
    }
    #[inline]
    fn read_len(&self) -> usize {
        self.len
    }
}

/// A file read from a directory.
pub struct ReadFsEntry(PathBuf);
impl ReadFsEntry {
    /// Returns the path of this file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }
}
impl ReadEntry for ReadFsEntry {
    fn meta(&self) -> (Option<bool>, Box<str>) {
        let name = self.0.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        (Some(false), name.into())
    }
    fn data(self) -> crate::Result_<Bytes> {
        Ok(fs::read(&self.0)?.into())
    }
}

fn is_hidden(p: &Path) -> bool {
    p.file_name().is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

/// Checks if a path is an unfinished temporary archive.
#[must_use]
pub fn is_temp_file(p: &Path) -> bool {
    p.file_name().is_some_and(|n| n.to_string_lossy().ends_with(TEMP_SUFFIX))
}

/// Returns a path of a temporary file that is published over `target` when it is complete.
#[must_use]
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut s = target.as_os_str().to_owned();
    s.push(TEMP_SUFFIX);
    PathBuf::from(s)
}

/// Checks if a path looks like an archive of the library (`.cbz` or `.zip`).
#[must_use]
pub fn is_archive(p: &Path) -> bool {
    p.extension().is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXT) || e.eq_ignore_ascii_case("zip"))
}

/// Lists archives of a directory (non-recursively). Hidden and temporary files are skipped.
/// A missing directory has no archives.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn list_archives(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new())
    }
    let mut v = Vec::new();
    for de in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let de = match de {
            Ok(de) => de,
            Err(e) if e.depth() > 0 => {
                log::warn!("skipping unreadable entry: {e}");
                continue
            }
            Err(e) => return Err(e.into()),
        };
        let p = de.path();
        if de.file_type().is_file() && !is_hidden(p) && !is_temp_file(p) && is_archive(p) {
            v.push(de.into_path());
        }
    }
    Ok(v)
}

/// Removes temporary files left by interrupted writes. Returns the count of removed files.
/// Running it again does nothing.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or a file cannot be removed.
pub fn cleanup_temp_files(dir: &Path) -> io::Result<usize> {
    if !dir.is_dir() {
        return Ok(0)
    }
    let mut n = 0;
    for de in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let de = de?;
        if de.file_type().is_file() && is_temp_file(de.path()) {
            match fs::remove_file(de.path()) {
                Ok(()) => n += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(n)
}

/// Replaces an existing file with a completed temporary file in a single rename.
///
/// # Errors
///
/// Returns an error if the rename fails.
pub fn publish(temp: &Path, target: &Path) -> io::Result<()> {
    fs::rename(temp, target)
}

/// Converts a title to a file name that is safe on common file systems.
#[must_use]
pub fn to_file_name_safe(title: &str) -> String {
    let s: String = title.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let s = s.trim_matches(|c: char| c.is_whitespace() || c == '.');
    let mut end = s.len().min(MAX_FILE_NAME_LEN);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let s = s[..end].trim_end();
    if s.is_empty() { "manga".to_owned() } else { s.to_owned() }
}

/// Returns a file name of an archive for a title.
#[must_use]
pub fn archive_file_name(title: &str) -> String {
    format!("{}.{ARCHIVE_EXT}", to_file_name_safe(title))
}
