use bytes::Bytes;
use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, BufWriter, Cursor, Read, Seek, Write},
    path::Path,
};
use zip::{
    result::ZipError,
    write::{FileOptions, SimpleFileOptions},
    CompressionMethod, ZipArchive, ZipWriter,
};

use super::{EntryReader, EntrySaver, ReadEntry, SavingEntry};
use crate::Result_;

/// Entries smaller than this are never compressed.
pub const MIN_COMPRESS: usize = 24;

const MAX_LEVEL: i64 = 9;

/// An entry reader implementation for ZIP archive. It reads its contents from a provided reader (with seeking).
pub struct ZipEntryReader<R: Read + Seek> {
    za: ZipArchive<R>,
    cur: usize,
}
impl<R: Read + Seek> ZipEntryReader<R> {
    /// Creates an entry reader with a specified reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader content is not a valid ZIP archive.
    pub fn new(r: R) -> Result_<Self> {
        Ok(Self { za: ZipArchive::new(r)?, cur: 0 })
    }

    /// Gives access to the underlying archive (for raw entry copies).
    pub fn archive(&mut self) -> &mut ZipArchive<R> {
        &mut self.za
    }

    /// Reads an entry by name. Returns `None` if the archive has no such entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be read.
    pub fn read_bytes(&mut self, name: &str) -> Result_<Option<Bytes>> {
        let mut zf = match self.za.by_name(name) {
            Ok(zf) => zf,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut obuf = Vec::with_capacity(zf.size() as usize);
        zf.read_to_end(&mut obuf)?;
        Ok(Some(obuf.into()))
    }

    /// Reads an entry by name as UTF-8 text. Returns `None` if the archive has no such entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be read or it is not valid UTF-8.
    pub fn read_text(&mut self, name: &str) -> Result_<Option<String>> {
        let Some(b) = self.read_bytes(name)? else { return Ok(None) };
        String::from_utf8(b.to_vec())
            .map(Some)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
    }
}
impl ZipEntryReader<BufReader<File>> {
    /// Opens an archive file with a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or it is not a valid ZIP archive.
    #[inline]
    pub fn open(p: &Path) -> Result_<Self> {
        Self::new(BufReader::new(File::open(p)?))
    }
}
impl<T: AsRef<[u8]>> ZipEntryReader<Cursor<T>> {
    /// Creates an entry reader wrapping a specified reader with a [`Cursor`].
    ///
    /// # Errors
    ///
    /// Returns an error if the reader content is not a valid ZIP archive.
    #[inline]
    pub fn new_mem(t: T) -> Result_<Self> {
        Self::new(Cursor::new(t))
    }
}
impl<R: Read + Seek> EntryReader for ZipEntryReader<R> {
    type RE<'a> = ReadZipFileEntry<'a, R> where R: 'a;
    fn read_next(&mut self) -> Option<Self::RE<'_>> {
        if self.cur >= self.za.len() {
            None
        } else {
            let idx = self.cur;
            self.cur += 1;
            Some(ReadZipFileEntry { zip: &mut self.za, idx })
        }
    }
    #[inline]
    fn read_len(&self) -> usize {
        self.za.len()
    }
}

/// A read entry of a ZIP archive.
pub struct ReadZipFileEntry<'a, RS: Read + Seek> {
    zip: &'a mut ZipArchive<RS>,
    idx: usize,
}
impl<RS: Read + Seek> ReadZipFileEntry<'_, RS> {
    /// Returns the index of this entry in the archive.
    #[inline]
    pub const fn index(&self) -> usize {
        self.idx
    }
}
impl<RS: Read + Seek> ReadEntry for ReadZipFileEntry<'_, RS> {
    fn meta(&self) -> (Option<bool>, Box<str>) {
        self.zip
            .name_for_index(self.idx)
            .map_or_else(|| (None, "".into()), |n| (Some(n.ends_with('/')), n.into()))
    }
    fn data(self) -> Result_<Bytes> {
        let mut obuf = Vec::new();
        let mut jf = self.zip.by_index(self.idx)?;
        obuf.reserve_exact(jf.size() as usize);
        jf.read_to_end(&mut obuf)?;
        Ok(obuf.into())
    }
}

/// An entry saver implementation for ZIP archive. It writes entries to it using a provided writer.
/// Every entry name is written at most once.
pub struct ZipEntrySaver<W: Write + Seek> {
    w: ZipWriter<BufWriter<W>>,
    names: HashSet<Box<str>>,
    opts_deflated: SimpleFileOptions,
    opts_stored: SimpleFileOptions,
}
impl<W: Write + Seek> ZipEntrySaver<W> {
    /// Creates an entry saver with the maximum compression level for deflated entries.
    pub fn new(w: W) -> Self {
        Self::custom_compress(w, MAX_LEVEL)
    }
    /// Creates an entry saver with custom compression level for deflated entries.
    pub fn custom_compress(w: W, level: impl Into<i64>) -> Self {
        Self {
            w: ZipWriter::new(BufWriter::new(w)),
            names: HashSet::new(),
            opts_deflated: FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(level.into().clamp(0, MAX_LEVEL))),
            opts_stored: FileOptions::default().compression_method(CompressionMethod::Stored),
        }
    }

    /// Checks if an entry name was already written.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Copies an entry from another archive without recompressing it.
    /// Returns `false` if an entry with the same name was already written.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be read or written.
    pub fn copy_from<R: Read + Seek>(&mut self, za: &mut ZipArchive<R>, idx: usize) -> Result_<bool> {
        let zf = za.by_index_raw(idx)?;
        if self.names.contains(zf.name()) {
            return Ok(false)
        }
        let name: Box<str> = zf.name().into();
        self.w.raw_copy_file(zf)?;
        self.names.insert(name);
        Ok(true)
    }

    /// Copies an entry from another archive under a new name without recompressing it.
    /// Returns `false` if an entry with the new name was already written.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be read or written.
    pub fn copy_from_as<R: Read + Seek>(&mut self, za: &mut ZipArchive<R>, idx: usize, name: &str) -> Result_<bool> {
        if self.names.contains(name) {
            return Ok(false)
        }
        let zf = za.by_index_raw(idx)?;
        self.w.raw_copy_file_rename(zf, name)?;
        self.names.insert(name.into());
        Ok(true)
    }

    /// Finishes the archive and returns the inner writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the central directory cannot be written.
    pub fn finish(self) -> Result_<W> {
        let bw = self.w.finish()?;
        Ok(bw.into_inner().map_err(std::io::IntoInnerError::into_error)?)
    }
}
impl<W: Write + Seek> EntrySaver for ZipEntrySaver<W> {
    fn save(&mut self, name: &str, entry: SavingEntry) -> Result_<bool> {
        let z = &mut self.w;
        match entry {
            SavingEntry::Directory => {
                let name = if name.ends_with('/') { name.to_owned() } else { format!("{name}/") };
                if !self.names.insert(name.as_str().into()) {
                    return Ok(false)
                }
                z.add_directory(name, self.opts_stored)?;
            }
            SavingEntry::File(data) => {
                if !self.names.insert(name.into()) {
                    return Ok(false)
                }
                z.start_file(
                    name,
                    if compress_check(data, MIN_COMPRESS) { self.opts_deflated } else { self.opts_stored },
                )?;
                z.write_all(data)?;
            }
        }
        Ok(true)
    }
}

/// Check if data should be compressed. If the compressed size is smaller than original, then the compression should be chosen.
pub fn compress_check(b: &[u8], compress_min: usize) -> bool {
    let lb = b.len();
    if lb > compress_min {
        if calc_entropy(b) < 7.0 {
            return true;
        }
        let mut d = flate2::write::DeflateEncoder::new(std::io::sink(), flate2::Compression::best());
        if d.write_all(b).and_then(|()| d.try_finish()).is_ok() && d.total_out() as usize + 8 < lb {
            return true;
        }
    }
    false
}

fn calc_entropy(b: &[u8]) -> f64 {
    if b.is_empty() {
        return 0.0;
    }
    let mut freq = [0usize; 256];
    for &b in b {
        freq[b as usize] += 1;
    }
    let total = b.len() as f64;
    let logt = total.log2();
    freq.into_iter()
        .filter(|&f| f != 0)
        .map(|n| {
            let nf = n as f64;
            -nf * (nf.log2() - logt)
        })
        .sum::<f64>()
        / total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(len: usize) -> Vec<u8> {
        let mut x: u32 = 0x9e37_79b9;
        (0..len).map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        }).collect()
    }

    #[test]
    fn text_is_compressed_and_noise_is_stored() {
        assert!(compress_check(br#"{"id":42,"title":"Sample","chapters":{"1":{"number":1.0}}}"#, MIN_COMPRESS));
        assert!(!compress_check(&noise(4096), MIN_COMPRESS));
        assert!(!compress_check(b"tiny", MIN_COMPRESS));
    }

    #[test]
    fn saver_writes_each_name_once() {
        let mut zs = ZipEntrySaver::new(Cursor::new(Vec::new()));
        assert!(zs.save("a.png", SavingEntry::File(b"first")).unwrap());
        assert!(!zs.save("a.png", SavingEntry::File(b"second")).unwrap());
        assert!(zs.save("dir", SavingEntry::Directory).unwrap());
        assert!(!zs.save("dir/", SavingEntry::Directory).unwrap());
        let buf = zs.finish().unwrap().into_inner();

        let mut zr = ZipEntryReader::new_mem(buf).unwrap();
        assert_eq!(zr.read_len(), 2);
        assert_eq!(zr.read_bytes("a.png").unwrap().as_deref(), Some(&b"first"[..]));
        assert_eq!(zr.read_bytes("missing").unwrap(), None);
        assert_eq!(zr.file_names(), vec![Box::from("a.png")]);
    }

    #[test]
    fn raw_copy_keeps_bytes() {
        let mut zs = ZipEntrySaver::new(Cursor::new(Vec::new()));
        zs.save("index.json", SavingEntry::File(br#"{"id":1,"title":"t","url":"u","source":"s"}"#)).unwrap();
        zs.save("p.jpg", SavingEntry::File(&noise(512))).unwrap();
        let src = zs.finish().unwrap().into_inner();

        let mut zr = ZipEntryReader::new_mem(src).unwrap();
        let mut zs = ZipEntrySaver::new(Cursor::new(Vec::new()));
        zs.save("p.jpg", SavingEntry::File(b"newer")).unwrap();
        for i in 0..zr.read_len() {
            zs.copy_from(zr.archive(), i).unwrap();
        }
        assert!(zs.copy_from_as(zr.archive(), 1, "q.jpg").unwrap());
        assert!(!zs.copy_from_as(zr.archive(), 1, "p.jpg").unwrap());
        let dst = zs.finish().unwrap().into_inner();

        let mut zr = ZipEntryReader::new_mem(dst).unwrap();
        assert_eq!(zr.read_bytes("p.jpg").unwrap().as_deref(), Some(&b"newer"[..]));
        assert_eq!(zr.read_bytes("q.jpg").unwrap().as_deref(), Some(&noise(512)[..]));
        assert!(zr.read_text("index.json").unwrap().unwrap().contains("\"title\""));
    }
}
