use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use bytes::Bytes;

use crate::{
    cmp,
    entry::{zip::ZipEntryReader, EntryReader},
    errors::StoreError,
    ext::ImageFmt,
    index::{MangaIndex, ENTRY_NAME_INDEX},
    model::{file_uri, long_hash_code, parse_zip_uri, path_from_file_uri, zip_uri, LocalManga, Manga, MangaChapter, MangaPage, LOCAL_SOURCE},
    Result_,
};

/// A reader of a single archive.
#[derive(Debug, Clone)]
pub struct CbzMangaInput {
    path: PathBuf,
}

impl CbzMangaInput {
    /// Creates a reader of an archive file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a reader of the archive a local work was read from.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotLocal`] if the work does not point to an archive.
    pub fn of(manga: &Manga) -> Result_<Self> {
        if !manga.is_local() {
            return Err(StoreError::NotLocal(manga.title.clone()))
        }
        path_from_file_uri(&manga.url)
            .map(Self::new)
            .ok_or_else(|| StoreError::NotLocal(manga.url.clone()))
    }

    /// Returns the archive path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result_<ZipEntryReader<BufReader<File>>> {
        ZipEntryReader::open(&self.path)
    }

    fn index_of(zr: &mut ZipEntryReader<BufReader<File>>) -> Result_<MangaIndex> {
        let text = zr.read_text(ENTRY_NAME_INDEX)?
            .ok_or_else(|| StoreError::IndexCorrupt(format!("{ENTRY_NAME_INDEX} is missing")))?;
        MangaIndex::parse(&text)
    }

    /// Reads the index of the archive.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IndexCorrupt`] if the index is missing or malformed, or an error if the archive cannot be read.
    pub fn read_index(&self) -> Result_<MangaIndex> {
        Self::index_of(&mut self.open()?)
    }

    /// Reads the work as it was stored (with its original source and URLs).
    ///
    /// # Errors
    ///
    /// Returns an error if the archive or its index cannot be read.
    pub fn get_manga_info(&self) -> Result_<Option<Manga>> {
        Ok(self.read_index()?.manga_info())
    }

    /// Reads the work as a local one. URLs point to the archive and the cover falls back
    /// to the first image if the index does not name one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IndexCorrupt`] if the index has no work metadata, or an error if the archive cannot be read.
    pub fn get_manga(&self) -> Result_<LocalManga> {
        let mut zr = self.open()?;
        let index = Self::index_of(&mut zr)?;
        let mut manga = index.manga_info()
            .ok_or_else(|| StoreError::IndexCorrupt("index has no manga info".into()))?;
        let names = zr.file_names();
        let cover = index.cover_entry()
            .filter(|c| names.iter().any(|n| &**n == *c))
            .map(str::to_owned)
            .or_else(|| {
                names.iter()
                    .filter(|n| ImageFmt::by_name(n).is_some())
                    .min_by(|a, b| cmp::alphanum(a, b))
                    .map(|n| n.to_string())
            });
        let uri = file_uri(&self.path);
        manga.cover_url = cover.as_deref().map_or_else(String::new, |c| zip_uri(&self.path, c));
        manga.large_cover_url = None;
        manga.url.clone_from(&uri);
        manga.source = LOCAL_SOURCE.to_owned();
        for c in &mut manga.chapters {
            c.url.clone_from(&uri);
            c.source = LOCAL_SOURCE.to_owned();
        }
        Ok(LocalManga::new(manga, self.path.clone()))
    }

    /// Lists pages of a chapter in reading order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the chapter is not stored in this archive,
    /// or an error if the archive or its index cannot be read.
    pub fn get_pages(&self, chapter: &MangaChapter) -> Result_<Vec<MangaPage>> {
        let mut zr = self.open()?;
        let index = Self::index_of(&mut zr)?;
        if !index.has_chapter(chapter.id) {
            return Err(StoreError::NotFound(format!("chapter {} in {}", chapter.id, self.path.display())))
        }
        let pattern = index.chapter_names_pattern(chapter);
        let mut names: Vec<_> = zr.file_names().into_iter()
            .filter(|n| &**n != ENTRY_NAME_INDEX && pattern.matches(n))
            .collect();
        names.sort_by(|a, b| cmp::alphanum(a, b));
        Ok(names.into_iter().map(|n| {
            let url = zip_uri(&self.path, &n);
            MangaPage { id: long_hash_code(&url), url, preview: None, source: LOCAL_SOURCE.to_owned() }
        }).collect())
    }

    /// Reads an entry of the archive.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no such entry, or an error if the archive cannot be read.
    pub fn read_entry(&self, name: &str) -> Result_<Bytes> {
        self.open()?.read_bytes(name)?.ok_or_else(|| StoreError::NotFound(zip_uri(&self.path, name)))
    }
}

/// Reads page data from a `cbz://` page URL.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if the URL does not point into an archive or the entry does not exist.
pub fn read_page(url: &str) -> Result_<Bytes> {
    let (path, entry) = parse_zip_uri(url).ok_or_else(|| StoreError::NotFound(url.to_owned()))?;
    CbzMangaInput::new(path).read_entry(entry)
}
