/// Entry reader for directories and archive file helpers.
pub mod fs;
/// Entry reader and saver for ZIP archives.
pub mod zip;

use bytes::Bytes;

/// Trait for reading entries one by one.
pub trait EntryReader {
    /// A type of a read entry.
    type RE<'a>: ReadEntry where Self: 'a;
    /// Reads the next entry. Returns `None` if there are no more entries.
    fn read_next(&mut self) -> Option<Self::RE<'_>>;
    /// Returns the count of all entries.
    fn read_len(&self) -> usize;

    /// Collects names of all remaining file entries (directories are skipped).
    fn file_names(&mut self) -> Vec<Box<str>> where Self: Sized {
        let mut v = Vec::with_capacity(self.read_len());
        while let Some(re) = self.read_next() {
            if let (Some(false), name) = re.meta() {
                v.push(name);
            }
        }
        v
    }
}

/// A single entry that can be inspected and read.
pub trait ReadEntry {
    /// Returns a pair of "is a directory" (`None` if unknown) and an entry name.
    fn meta(&self) -> (Option<bool>, Box<str>);
    /// Reads the whole entry content.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    fn data(self) -> crate::Result_<Bytes>;
}

/// An entry to be saved.
pub enum SavingEntry<'a> {
    /// A directory marker.
    Directory,
    /// A file with its content.
    File(&'a [u8]),
}

/// Trait for saving entries. Entry names are unique: saving a name that is already present does nothing.
pub trait EntrySaver {
    /// Saves an entry. Returns `false` if an entry with the same name was already saved.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn save(&mut self, name: &str, entry: SavingEntry) -> crate::Result_<bool>;
}
