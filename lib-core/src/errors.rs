use std::{error::Error, fmt::Display, io, sync::Arc};

use zip::result::ZipError;

/// Errors raised while reading or mutating archives of the local library.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The `index.json` entry is missing or cannot be parsed.
    /// The archive is unreadable and must be excluded from listings.
    #[error("cannot read archive index: {0}")]
    IndexCorrupt(String),
    /// The ZIP container itself is damaged or not a ZIP file.
    #[error("cannot read this archive: {0}")]
    Archive(ZipError),
    /// A requested work, chapter or page is not present.
    #[error("not found: {0}")]
    NotFound(String),
    /// An archive holds a different work than the one being written.
    #[error("archive belongs to another manga: {0}")]
    ForeignArchive(String),
    /// A remote work was given where a locally stored one is required.
    #[error("manga is not stored on local storage: {0}")]
    NotLocal(String),
    /// The index could not be serialized.
    #[error("cannot serialize index: {0}")]
    Serialize(#[from] serde_json::Error),
    /// A worker pool could not be created.
    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// An underlying file system failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<ZipError> for StoreError {
    fn from(e: ZipError) -> Self {
        match e {
            ZipError::Io(e) => Self::Io(e),
            e => Self::Archive(e),
        }
    }
}

impl StoreError {
    /// Returns `true` if the error means "this archive cannot be read" rather than a failure of the environment.
    #[must_use]
    pub const fn is_unreadable_archive(&self) -> bool {
        matches!(self, Self::IndexCorrupt(_) | Self::Archive(_))
    }
}

/// A struct for collecting errors of independent archive operations.
pub struct ErrorCollector {
    silent: bool,
    vec: Vec<ArchiveOpError>,
    name: Arc<str>,
}
impl ErrorCollector {
    /// Creates a new `ErrorCollector` with a `silent` option.
    #[must_use]
    pub fn new(silent: bool) -> Self { Self { silent, vec: Vec::new(), name: "".into() } }

    /// Sets the new prefix name for collected errors.
    pub fn rename(&mut self, name: &str)  {
        self.name = name.into();
    }

    /// Collects an error for an archive based on its name (path).
    pub fn collect(&mut self, name: impl Into<Arc<str>>, e: StoreError) {
        if !self.silent {
            self.vec.push(ArchiveOpError {
                parent: self.name.clone(),
                name: name.into(),
                inner: e
            });
        }
    }

    /// Returns all currently gathered results.
    #[must_use]
    pub fn results(&self) -> &[ArchiveOpError] {
        &self.vec
    }

    /// Returns `true` if no errors were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }
}

/// An error struct that wraps an inner error thrown while an archive was processed.
#[derive(Debug)]
pub struct ArchiveOpError {
    /// An operation or directory the archive belongs to.
    pub parent: Arc<str>,
    /// An associated archive name from the error.
    pub name: Arc<str>,
    inner: StoreError
}
impl ArchiveOpError {
    /// Returns the inner error.
    #[must_use]
    pub const fn inner_error(&self) -> &StoreError {
        &self.inner
    }
}
impl Error for ArchiveOpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.inner)
    }
}
impl Display for ArchiveOpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.parent, self.name, self.inner)
    }
}
