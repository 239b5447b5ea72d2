use std::{
    collections::{HashMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use bytes::Bytes;
use crossbeam_channel::Sender;
use rayon::prelude::*;

use crate::{
    cfg::StoreConfig,
    entry::fs::{cleanup_temp_files, list_archives},
    errors::{ErrorCollector, StoreError},
    input::{self, CbzMangaInput},
    lock::MultiMutex,
    model::{path_from_file_uri, ListFilter, LocalManga, Manga, MangaChapter, MangaPage},
    output::CbzMangaOutput,
    storage::StorageManager,
    wrap_send, ProgressState, Result_,
};

/// The local library: every archive found in the readable directories of a storage.
///
/// Mutations of one work (saving, importing, deleting chapters) are serialized by a per-work lock.
/// Listing does not lock anything; it sees each archive either before or after a mutation.
pub struct LocalMangaRepository<S: StorageManager> {
    storage: S,
    locks: MultiMutex<i64>,
    pool: rayon::ThreadPool,
    cfg: StoreConfig,
    cache: Mutex<HashMap<i64, PathBuf>>,
}

impl<S: StorageManager> LocalMangaRepository<S> {
    /// Creates a repository over a storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot be started.
    pub fn new(storage: S, cfg: StoreConfig) -> Result_<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.workers())
            .thread_name(|i| format!("cbz-store-{i}"))
            .build()?;
        Ok(Self { storage, locks: MultiMutex::new(), pool, cfg, cache: Mutex::new(HashMap::new()) })
    }

    /// Returns the storage of this repository.
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the configuration of this repository.
    pub const fn config(&self) -> &StoreConfig {
        &self.cfg
    }

    fn archive_files(&self) -> Vec<PathBuf> {
        let mut v = Vec::new();
        for dir in self.storage.readable_dirs() {
            match list_archives(&dir) {
                Ok(files) => v.extend(files),
                Err(e) => log::warn!("cannot list {}: {e}", dir.display()),
            }
        }
        v
    }

    /// Reads every archive of the library. Archives that cannot be read are skipped.
    pub fn get_raw_list(&self) -> Vec<LocalManga> {
        let files = self.archive_files();
        self.pool.install(|| {
            files.par_iter()
                .filter_map(|p| match CbzMangaInput::new(p).get_manga() {
                    Ok(lm) => Some(lm),
                    Err(e) => {
                        log::warn!("skipping {}: {e}", p.display());
                        None
                    }
                })
                .collect()
        })
    }

    /// Lists the library, filtered and sorted. The whole library is a single page,
    /// so any `offset` greater than zero gives an empty list.
    #[must_use]
    pub fn get_list(&self, offset: usize, filter: &ListFilter) -> Vec<LocalManga> {
        if offset > 0 {
            return Vec::new()
        }
        let mut list = self.get_raw_list();
        filter.apply(&mut list);
        list
    }

    /// Returns a reader of the archive of a work. A remote work is looked up among saved ones.
    fn resolve(&self, manga: &Manga) -> Result_<CbzMangaInput> {
        if manga.is_local() {
            return CbzMangaInput::of(manga)
        }
        self.find_saved_manga(manga)
            .map(|lm| CbzMangaInput::new(lm.file))
            .ok_or_else(|| StoreError::NotFound(format!("saved copy of {}", manga.title)))
    }

    /// Reads a work again from its archive. A remote work is resolved to its saved copy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for a remote work that is not saved, or an error if the archive cannot be read.
    pub fn get_details(&self, manga: &Manga) -> Result_<Manga> {
        Ok(self.resolve(manga)?.get_manga()?.manga)
    }

    /// Lists pages of a local chapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotLocal`] if the chapter does not point to an archive, or an error if it cannot be read.
    pub fn get_pages(&self, chapter: &MangaChapter) -> Result_<Vec<MangaPage>> {
        let path = path_from_file_uri(&chapter.url).ok_or_else(|| StoreError::NotLocal(chapter.url.clone()))?;
        CbzMangaInput::new(path).get_pages(chapter)
    }

    /// Reads the content of a local page.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the page does not exist.
    pub fn read_page(&self, page: &MangaPage) -> Result_<Bytes> {
        input::read_page(&page.url)
    }

    fn is_writeable(&self, p: &Path) -> bool {
        let Some(parent) = p.parent() else { return false };
        self.storage.writeable_dirs().iter().any(|d| {
            d == parent || fs::canonicalize(d).ok().zip(fs::canonicalize(parent).ok()).is_some_and(|(a, b)| a == b)
        })
    }

    /// Deletes the archive of a local work. Returns `false` if it was already gone.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotLocal`] for a remote work, or an error if the archive is not in a writeable directory
    /// or cannot be removed.
    pub fn delete(&self, manga: &Manga) -> Result_<bool> {
        let input = CbzMangaInput::of(manga)?;
        if !self.is_writeable(input.path()) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, format!("{} is read-only", input.path().display())).into())
        }
        let _g = self.locks.guard(manga.id);
        self.forget(manga.id);
        match fs::remove_file(input.path()) {
            Ok(()) => {
                log::info!("deleted {}", input.path().display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes chapters from the archive of a work. Returns `false` if none of them was stored.
    /// A remote work is resolved to its saved copy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for a remote work that is not saved, or an error if the archive cannot be rewritten.
    pub fn delete_chapters(&self, manga: &Manga, ids: &HashSet<i64>) -> Result_<bool> {
        let input = self.resolve(manga)?;
        let _g = self.locks.guard(manga.id);
        CbzMangaOutput::filter_chapters(input.path(), ids, self.cfg.compression_level)
    }

    /// Removes chapters from many works. A failure of one work is collected and the rest continue.
    /// Returns the count of rewritten archives.
    ///
    /// # Errors
    ///
    /// Returns an error only if the progress channel is closed.
    pub fn delete_chapters_batch(
        &self,
        items: &[(Manga, HashSet<i64>)],
        ec: &mut ErrorCollector,
        ps: &Sender<ProgressState>,
    ) -> Result_<usize> {
        wrap_send(ps, ProgressState::Start(items.len()))?;
        let mut n = 0;
        for (i, (manga, ids)) in items.iter().enumerate() {
            wrap_send(ps, ProgressState::Push(i, manga.title.as_str().into()))?;
            match self.delete_chapters(manga, ids) {
                Ok(true) => n += 1,
                Ok(false) => {}
                Err(e) => ec.collect(manga.title.as_str(), e),
            }
        }
        wrap_send(ps, ProgressState::Finish)?;
        Ok(n)
    }

    fn cached(&self, id: i64) -> Option<LocalManga> {
        let p = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&id).cloned()?;
        match CbzMangaInput::new(&p).get_manga() {
            Ok(lm) if lm.manga.id == id => Some(lm),
            _ => {
                self.forget(id);
                None
            }
        }
    }

    fn remember(&self, id: i64, p: PathBuf) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).insert(id, p);
    }

    fn forget(&self, id: i64) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
    }

    /// Finds the local copy of a remote work.
    #[must_use]
    pub fn find_saved_manga(&self, remote: &Manga) -> Option<LocalManga> {
        if let Some(lm) = self.cached(remote.id) {
            return Some(lm)
        }
        let files = self.archive_files();
        let found = self.pool.install(|| {
            files.par_iter().find_map_first(|p| {
                let input = CbzMangaInput::new(p);
                match input.read_index() {
                    Ok(index) if index.manga_id() == Some(remote.id) => input.get_manga().ok(),
                    _ => None,
                }
            })
        })?;
        self.remember(remote.id, found.file.clone());
        Some(found)
    }

    /// Returns the work as it was stored (with its original source), if the archive of a local work has one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotLocal`] for a remote work, or an error if the archive cannot be read.
    pub fn get_remote_manga(&self, local: &Manga) -> Result_<Option<Manga>> {
        Ok(CbzMangaInput::of(local)?.get_manga_info()?.filter(|m| !m.is_local()))
    }

    /// Takes the lock of a work, blocking until it is free.
    /// Operations of this repository take the lock themselves, so do not call them while holding it.
    pub fn lock_manga(&self, id: i64) {
        self.locks.lock(&id);
    }

    /// Releases the lock of a work.
    pub fn unlock_manga(&self, id: i64) {
        self.locks.unlock(&id);
    }

    /// Returns a directory for the archive of a work: the default directory if it already holds the work,
    /// else the first writeable directory holding it, else the default directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no writeable directory.
    pub fn get_output_dir(&self, manga: &Manga) -> Result_<PathBuf> {
        let default = self.storage.default_writeable_dir()
            .ok_or_else(|| StoreError::NotFound("writeable directory".into()))?;
        if CbzMangaOutput::find(&default, manga)?.is_some() {
            return Ok(default)
        }
        for dir in self.storage.writeable_dirs() {
            if CbzMangaOutput::find(&dir, manga)?.is_some() {
                return Ok(dir)
            }
        }
        Ok(default)
    }

    /// Writes a work: `f` adds entries, then the existing archive (if any) is merged in and the result is published.
    /// Any failure discards the new entries and leaves the existing archive untouched.
    ///
    /// # Errors
    ///
    /// Returns an error of `f` or of writing the archive.
    pub fn save<F>(&self, manga: &Manga, f: F) -> Result_<PathBuf>
    where F: FnOnce(&mut CbzMangaOutput) -> Result_<()> {
        let _g = self.locks.guard(manga.id);
        let dir = self.get_output_dir(manga)?;
        let target = CbzMangaOutput::find(&dir, manga)?
            .unwrap_or_else(|| CbzMangaOutput::new_file(&dir, manga));
        let mut out = CbzMangaOutput::open(&target, manga, self.cfg.compression_level)?;
        f(&mut out)?;
        out.merge_with_existing()?;
        let p = out.finish()?;
        self.remember(manga.id, p.clone());
        Ok(p)
    }

    /// Imports an external archive into the default directory. If the library already has the work,
    /// both archives are merged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IndexCorrupt`] if the archive has no valid index, or an error if it cannot be copied.
    pub fn import(&self, path: &Path) -> Result_<LocalManga> {
        let info = CbzMangaInput::new(path).get_manga_info()?
            .ok_or_else(|| StoreError::IndexCorrupt(format!("{} has no manga info", path.display())))?;
        let target = self.save(&info, |out| {
            if out.root_file() == path {
                Ok(())
            } else {
                out.merge_from(path)
            }
        })?;
        CbzMangaInput::new(target).get_manga()
    }

    /// Removes temporary files of interrupted writes from every writeable directory.
    /// Returns `false` without touching anything while any work is locked.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be cleaned.
    pub fn cleanup(&self) -> Result_<bool> {
        if !self.locks.is_idle() {
            return Ok(false)
        }
        for dir in self.storage.writeable_dirs() {
            let n = cleanup_temp_files(&dir)?;
            if n > 0 {
                log::info!("removed {n} temporary file(s) from {}", dir.display());
            }
        }
        Ok(true)
    }
}
