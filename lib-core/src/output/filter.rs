use std::{collections::HashSet, fs::File, path::Path};

use crate::{
    entry::{
        fs::{publish, temp_path_for},
        zip::{ZipEntryReader, ZipEntrySaver},
        EntryReader, EntrySaver, SavingEntry,
    },
    errors::StoreError,
    index::{MangaIndex, ENTRY_NAME_INDEX},
    Result_,
};

/// Removes chapters (their index records and page entries) from an archive.
///
/// The rewritten archive keeps directory markers, the cover and every entry of a surviving chapter,
/// copied without recompression. Ids that are not in the archive are ignored; if none of `ids`
/// is present, the archive is left untouched and `false` is returned.
///
/// # Errors
///
/// Returns [`StoreError::IndexCorrupt`] if the archive has no valid index, or an error if it cannot be rewritten.
/// On error the original archive is unchanged.
pub fn filter_chapters(root_file: &Path, ids: &HashSet<i64>, compression_level: u8) -> Result_<bool> {
    let mut zr = ZipEntryReader::open(root_file)?;
    let text = zr.read_text(ENTRY_NAME_INDEX)?
        .ok_or_else(|| StoreError::IndexCorrupt(format!("{ENTRY_NAME_INDEX} is missing")))?;
    let mut index = MangaIndex::parse(&text)?;
    let removed = ids.iter().filter(|&&id| index.remove_chapter(id)).count();
    if removed == 0 {
        return Ok(false)
    }
    let patterns = index.chapter_patterns();
    let cover = index.cover_entry().map(str::to_owned);

    let temp_file = temp_path_for(root_file);
    let res = (|| -> Result_<()> {
        let mut saver = ZipEntrySaver::custom_compress(File::create(&temp_file)?, compression_level);
        saver.save(ENTRY_NAME_INDEX, SavingEntry::File(index.serialize()?.as_bytes()))?;
        for i in 0..zr.read_len() {
            let keep = match zr.archive().name_for_index(i) {
                None => false,
                Some(ENTRY_NAME_INDEX) => false,
                Some(n) if n.ends_with('/') => true,
                Some(n) => cover.as_deref() == Some(n) || patterns.iter().any(|p| p.matches(n)),
            };
            if keep {
                saver.copy_from(zr.archive(), i)?;
            }
        }
        let f = saver.finish()?;
        f.sync_all()?;
        Ok(())
    })();
    drop(zr);
    if let Err(e) = res.and_then(|()| Ok(publish(&temp_file, root_file)?)) {
        let _ = std::fs::remove_file(&temp_file);
        return Err(e)
    }
    log::info!("removed {removed} chapter(s) from {}", root_file.display());
    Ok(true)
}
