//! CBZ-Store keeps downloaded manga as self-contained ZIP archives ("CBZ").
//! Every archive carries an `index.json` entry describing the work, its chapters and its cover,
//! and page entries are named so that a plain lexicographic sort gives the reading order.
//!
//! You should be interested in the `repository` module. It lists, searches and mutates
//! the local library, serializing every mutation of a work through a per-work lock.
//! The `output` module writes, merges and filters single archives.

/// Data model shared by readers, writers and the repository.
pub mod model;
/// The logical index stored inside every archive.
pub mod index;
/// Reading and saving entries (file system or ZIP archive).
pub mod entry;
/// Reading works, chapters and pages back from an archive.
pub mod input;
/// Writing, merging and filtering archives.
pub mod output;
/// Keyed mutual exclusion for archive mutations.
pub mod lock;
/// Directories that hold the local library.
pub mod storage;
/// Listing, searching and mutating the local library.
pub mod repository;
/// Errors and error collecting for archives.
pub mod errors;
/// Engine configuration.
pub mod cfg;
/// Natural ordering of names with embedded numbers.
pub mod cmp;
/// Known image formats.
pub mod ext;

pub use errors::StoreError;

/// A result type used by this crate.
pub type Result_<T> = Result<T, StoreError>;

/// A progress state to update information about a currently processed archive
#[derive(Debug, Clone)]
pub enum ProgressState {
    /// Starts a progress with a step count
    Start(usize),
    /// Pushes a new step with text
    Push(usize, std::sync::Arc<str>),
    /// Marks a progress as finished
    Finish
}

const CHANNEL_CLOSED_EARLY: &str = "channel closed early";

/// Sends a progress message, turning a closed channel into an error.
///
/// # Errors
///
/// Returns an error if the receiving side is gone.
pub fn wrap_send<T>(s: &crossbeam_channel::Sender<T>, t: T) -> Result_<()> {
    s.send(t).map_err(|_| StoreError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, CHANNEL_CLOSED_EARLY)))
}
