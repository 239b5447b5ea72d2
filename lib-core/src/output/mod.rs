/// Removing chapters from an existing archive.
pub mod filter;

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use crate::{
    entry::{
        fs::{archive_file_name, list_archives, publish, temp_path_for, to_file_name_safe, ARCHIVE_EXT},
        zip::{ZipEntryReader, ZipEntrySaver},
        EntryReader, EntrySaver, SavingEntry,
    },
    errors::StoreError,
    index::{cover_entry_name, MangaIndex, ENTRY_NAME_INDEX, MAX_PAGES_PER_CHAPTER},
    input::CbzMangaInput,
    model::{Manga, MangaChapter},
    Result_,
};

/// A writer of a single archive.
///
/// Entries are written to `<archive>.tmp` and the finished file is renamed over the live archive,
/// so readers never see a half-written archive. Dropping an unfinished writer removes its temporary file.
pub struct CbzMangaOutput {
    manga_id: i64,
    root_file: PathBuf,
    temp_file: PathBuf,
    output: Option<ZipEntrySaver<File>>,
    index: MangaIndex,
    finished: bool,
}

impl CbzMangaOutput {
    /// Starts writing an archive that will replace `root_file`.
    /// Metadata of a remote work is stored in the index; a local work keeps the stored one after merging.
    /// Chapters of the live archive are known from the start, so new chapters never reuse their entry names.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ForeignArchive`] if the live archive holds another work,
    /// or an error if its index cannot be read or the temporary file cannot be created.
    pub fn open(root_file: impl Into<PathBuf>, manga: &Manga, compression_level: u8) -> Result_<Self> {
        let root_file = root_file.into();
        let mut index = MangaIndex::new();
        if !manga.is_local() {
            index.set_manga_info(manga, false);
        }
        if root_file.is_file() {
            let existing = CbzMangaInput::new(&root_file).read_index()?;
            if existing.manga_id().is_some_and(|id| id != manga.id) {
                return Err(StoreError::ForeignArchive(root_file.display().to_string()))
            }
            let _ = index.merge_chapters_from(&existing);
        }
        let temp_file = temp_path_for(&root_file);
        let f = File::create(&temp_file)?;
        log::debug!("writing {}", temp_file.display());
        Ok(Self {
            manga_id: manga.id,
            root_file,
            temp_file,
            output: Some(ZipEntrySaver::custom_compress(f, compression_level)),
            index,
            finished: false,
        })
    }

    /// Returns the archive path this writer publishes to.
    #[must_use]
    pub fn root_file(&self) -> &Path {
        &self.root_file
    }

    /// Returns the index being written.
    #[must_use]
    pub const fn index(&self) -> &MangaIndex {
        &self.index
    }

    fn saver(&mut self) -> io::Result<&mut ZipEntrySaver<File>> {
        self.output.as_mut().ok_or_else(|| io::Error::other("archive is already closed"))
    }

    /// Copies every entry of the live archive that was not written in this session
    /// and folds its chapters into the new index. Does nothing if the live archive does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the live archive or its index cannot be read.
    pub fn merge_with_existing(&mut self) -> Result_<()> {
        if self.root_file.is_file() {
            let other = self.root_file.clone();
            self.merge_from(&other)?;
        }
        Ok(())
    }

    /// Copies every entry of another archive that was not written yet and folds its chapters into the new index.
    /// Pages of a chapter whose entry names are taken here are copied under free names.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IndexCorrupt`] if the archive has no valid index, [`StoreError::ForeignArchive`]
    /// if it holds another work, or an error if it cannot be read.
    pub fn merge_from(&mut self, other: &Path) -> Result_<()> {
        let mut zr = ZipEntryReader::open(other)?;
        let text = zr.read_text(ENTRY_NAME_INDEX)?
            .ok_or_else(|| StoreError::IndexCorrupt(format!("{} has no {ENTRY_NAME_INDEX}", other.display())))?;
        let oi = MangaIndex::parse(&text)?;
        if oi.manga_id().is_some_and(|id| id != self.manga_id) {
            return Err(StoreError::ForeignArchive(other.display().to_string()))
        }
        if self.index.manga_id().is_none() {
            self.index.adopt_manga_info(&oi);
        }
        let renames = self.index.merge_chapters_from(&oi);
        for i in 0..zr.read_len() {
            let Some(name) = zr.archive().name_for_index(i).map(str::to_owned) else { continue };
            if name == ENTRY_NAME_INDEX {
                continue
            }
            match renames.iter().find(|(from, _)| from.matches(&name)) {
                None => {
                    self.saver()?.copy_from(zr.archive(), i)?;
                }
                Some((from, to)) => match to.rename(from, &name) {
                    Some(new_name) => {
                        self.saver()?.copy_from_as(zr.archive(), i, &new_name)?;
                    }
                    None => log::warn!("skipping {name} of {}: page number does not fit", other.display()),
                },
            }
        }
        log::debug!("merged {} into {}", other.display(), self.temp_file.display());
        Ok(())
    }

    /// Adds a cover from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written.
    pub fn add_cover(&mut self, file: &Path, ext: &str) -> Result_<()> {
        let data = fs::read(file)?;
        self.add_cover_data(&data, ext)
    }

    /// Adds a cover. It takes the `(0, 0, 0)` entry slot.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn add_cover_data(&mut self, data: &[u8], ext: &str) -> Result_<()> {
        let name = cover_entry_name(ext);
        self.saver()?.save(&name, SavingEntry::File(data))?;
        self.index.set_cover_entry(name);
        Ok(())
    }

    /// Adds a page of a chapter from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written.
    pub fn add_page(&mut self, chapter: &MangaChapter, file: &Path, page_number: u32, ext: &str) -> Result_<()> {
        let data = fs::read(file)?;
        self.add_page_data(chapter, &data, page_number, ext)
    }

    /// Adds a page of a chapter and registers the chapter in the index.
    /// A page that was already written under the same name is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the page number does not fit in an entry name or writing fails.
    pub fn add_page_data(&mut self, chapter: &MangaChapter, data: &[u8], page_number: u32, ext: &str) -> Result_<()> {
        if page_number >= MAX_PAGES_PER_CHAPTER {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("page number {page_number} exceeds {}", MAX_PAGES_PER_CHAPTER - 1),
            ).into())
        }
        self.index.add_chapter(chapter);
        let name = self.index.chapter_names_pattern(chapter).entry_name(page_number, ext);
        if !self.saver()?.save(&name, SavingEntry::File(data))? {
            log::debug!("entry {name} is already written");
        }
        Ok(())
    }

    /// Writes the index and publishes the archive over the live file. Returns the archive path.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be completed; the live file is then left untouched.
    pub fn finish(mut self) -> Result_<PathBuf> {
        let text = self.index.serialize()?;
        let mut saver = self.output.take()
            .ok_or_else(|| io::Error::other("archive is already closed"))?;
        saver.save(ENTRY_NAME_INDEX, SavingEntry::File(text.as_bytes()))?;
        let f = saver.finish()?;
        f.sync_all()?;
        drop(f);
        publish(&self.temp_file, &self.root_file)?;
        self.finished = true;
        log::info!("saved {}", self.root_file.display());
        Ok(self.root_file.clone())
    }

    /// Discards everything written so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be removed.
    pub fn cleanup(mut self) -> Result_<()> {
        self.output = None;
        self.finished = true;
        match fs::remove_file(&self.temp_file) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Returns the canonical archive path of a work in a directory.
    #[must_use]
    pub fn canonical_file(root_dir: &Path, manga: &Manga) -> PathBuf {
        root_dir.join(archive_file_name(&manga.title))
    }

    /// Returns a path for a new archive of a work: the canonical file if nothing is stored there,
    /// else a name suffixed with the work id.
    #[must_use]
    pub fn new_file(root_dir: &Path, manga: &Manga) -> PathBuf {
        let canonical = Self::canonical_file(root_dir, manga);
        if !canonical.exists() {
            return canonical
        }
        let stem = to_file_name_safe(&manga.title);
        let mut p = root_dir.join(format!("{stem}_{}.{ARCHIVE_EXT}", manga.id));
        let mut n = 1;
        while p.exists() {
            p = root_dir.join(format!("{stem}_{}_{n}.{ARCHIVE_EXT}", manga.id));
            n += 1;
        }
        p
    }

    /// Finds an existing archive of a work in a directory: the canonical file first,
    /// then any archive whose index has the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn find(root_dir: &Path, manga: &Manga) -> Result_<Option<PathBuf>> {
        let canonical = Self::canonical_file(root_dir, manga);
        if canonical.is_file() && has_id(&canonical, manga.id) {
            return Ok(Some(canonical))
        }
        Ok(list_archives(root_dir)?.into_iter().find(|p| *p != canonical && has_id(p, manga.id)))
    }

    /// Removes chapters from an existing archive. See [`filter::filter_chapters`].
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read or rewritten.
    pub fn filter_chapters(root_file: &Path, ids: &std::collections::HashSet<i64>, compression_level: u8) -> Result_<bool> {
        filter::filter_chapters(root_file, ids, compression_level)
    }
}

fn has_id(p: &Path, id: i64) -> bool {
    CbzMangaInput::new(p).read_index().is_ok_and(|i| i.manga_id() == Some(id))
}

impl Drop for CbzMangaOutput {
    fn drop(&mut self) {
        if !self.finished {
            self.output = None;
            if fs::remove_file(&self.temp_file).is_ok() {
                log::debug!("discarded {}", self.temp_file.display());
            }
        }
    }
}
