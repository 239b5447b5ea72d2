use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Provides directories of the local library.
pub trait StorageManager: Send + Sync {
    /// Returns directories that are searched for archives.
    fn readable_dirs(&self) -> Vec<PathBuf>;
    /// Returns directories where archives may be written or deleted.
    fn writeable_dirs(&self) -> Vec<PathBuf>;
    /// Returns a directory for new archives. `None` if there is no writeable directory.
    fn default_writeable_dir(&self) -> Option<PathBuf>;
}

/// A storage manager over a fixed list of directories, all readable and writeable.
#[derive(Debug, Clone)]
pub struct DirStorage {
    dirs: Vec<PathBuf>,
    preferred: Option<PathBuf>,
}

impl DirStorage {
    /// Creates a storage over directories. Missing directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> io::Result<Self> {
        let dirs: Vec<PathBuf> = dirs.into_iter().collect();
        for d in &dirs {
            fs::create_dir_all(d)?;
        }
        Ok(Self { dirs, preferred: None })
    }

    /// Sets a preferred directory for new archives. It is added to the list if it is not there.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_preferred(mut self, dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        if !self.dirs.iter().any(|d| d == dir) {
            self.dirs.push(dir.to_path_buf());
        }
        self.preferred = Some(dir.to_path_buf());
        Ok(self)
    }
}

impl StorageManager for DirStorage {
    fn readable_dirs(&self) -> Vec<PathBuf> {
        self.dirs.iter().filter(|d| d.is_dir()).cloned().collect()
    }
    fn writeable_dirs(&self) -> Vec<PathBuf> {
        self.dirs.iter()
            .filter(|d| fs::metadata(d).is_ok_and(|m| m.is_dir() && !m.permissions().readonly()))
            .cloned()
            .collect()
    }
    fn default_writeable_dir(&self) -> Option<PathBuf> {
        let w = self.writeable_dirs();
        self.preferred.as_ref()
            .filter(|p| w.contains(p))
            .cloned()
            .or_else(|| w.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_dir_is_default() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        let s = DirStorage::new([a.clone()]).unwrap();
        assert_eq!(s.default_writeable_dir(), Some(a.clone()));
        let s = s.with_preferred(&b).unwrap();
        assert_eq!(s.default_writeable_dir(), Some(b.clone()));
        assert_eq!(s.readable_dirs(), [a, b]);
    }
}
