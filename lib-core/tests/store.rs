use std::{
    collections::HashSet,
    fs,
    io::Read,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cbz_store_core::{
    cfg::StoreConfig,
    entry::fs::temp_path_for,
    errors::ErrorCollector,
    index::ENTRY_NAME_INDEX,
    input::CbzMangaInput,
    model::{ListFilter, Manga, MangaChapter, MangaPage, MangaTag, SortOrder},
    output::CbzMangaOutput,
    repository::LocalMangaRepository,
    storage::DirStorage,
    ProgressState, StoreError,
};

fn remote(id: i64, title: &str) -> Manga {
    let mut m = Manga::new(id, title, format!("/manga/{id}"), "TEST");
    m.tags = vec![MangaTag { key: "action".into(), title: "Action".into() }];
    m
}

fn chapter(id: i64) -> MangaChapter {
    MangaChapter::new(id, format!("Chapter {id}"), id as f32, format!("/ch/{id}"), "TEST")
}

fn page(ch: i64, p: u32) -> Vec<u8> {
    format!("page {ch}-{p}").into_bytes()
}

fn repo(dir: &Path) -> LocalMangaRepository<DirStorage> {
    LocalMangaRepository::new(DirStorage::new([dir.to_path_buf()]).unwrap(), StoreConfig::default()).unwrap()
}

fn write_chapters(repo: &LocalMangaRepository<DirStorage>, manga: &Manga, ids: &[i64]) {
    repo.save(manga, |out| {
        out.add_cover_data(b"cover", "png")?;
        for &id in ids {
            for p in 0..3 {
                out.add_page_data(&chapter(id), &page(id, p), p, "jpg")?;
            }
        }
        Ok(())
    }).unwrap();
}

fn entries(p: &Path) -> Vec<(String, Vec<u8>)> {
    let mut za = zip::ZipArchive::new(fs::File::open(p).unwrap()).unwrap();
    let mut v = Vec::new();
    for i in 0..za.len() {
        let mut zf = za.by_index(i).unwrap();
        let mut buf = Vec::new();
        zf.read_to_end(&mut buf).unwrap();
        v.push((zf.name().to_owned(), buf));
    }
    v.sort();
    v
}

#[test]
fn sample_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let manga = remote(42, "Sample");
    write_chapters(&repo, &manga, &[1]);

    let target = dir.path().join("Sample.cbz");
    let names: Vec<_> = entries(&target).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, [
        "00000000_000000.png",
        "00000000_001000.jpg",
        "00000000_001001.jpg",
        "00000000_001002.jpg",
        ENTRY_NAME_INDEX,
    ]);

    let local = repo.find_saved_manga(&manga).unwrap();
    assert_eq!(local.manga.id, 42);
    assert_eq!(local.manga.title, "Sample");
    assert!(local.manga.is_local());
    assert!(local.manga.cover_url.ends_with("#00000000_000000.png"));

    let pages = repo.get_pages(&local.manga.chapters[0]).unwrap();
    assert_eq!(pages.len(), 3);
    assert_eq!(&repo.read_page(&pages[2]).unwrap()[..], page(1, 2));

    let remote_info = repo.get_remote_manga(&local.manga).unwrap().unwrap();
    assert_eq!(remote_info.source, "TEST");
    assert_eq!(repo.get_details(&local.manga).unwrap().chapters.len(), 1);
    assert_eq!(repo.get_details(&manga).unwrap().id, 42);
    assert!(matches!(repo.get_details(&remote(43, "Unsaved")), Err(StoreError::NotFound(_))));

    let mut unknown = local.manga.chapters[0].clone();
    unknown.id = 999;
    assert!(matches!(repo.get_pages(&unknown), Err(StoreError::NotFound(_))));
}

#[test]
fn merge_converges_and_keeps_earlier_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let manga = remote(7, "Merge");
    write_chapters(&repo, &manga, &[1, 2]);
    let target = dir.path().join("Merge.cbz");
    let first = entries(&target);

    write_chapters(&repo, &manga, &[3, 4]);
    let second = entries(&target);
    for e in first.iter().filter(|(n, _)| n != ENTRY_NAME_INDEX) {
        assert!(second.contains(e), "{} changed or lost", e.0);
    }
    let index = CbzMangaInput::new(&target).read_index().unwrap();
    let mut ids: Vec<_> = index.chapter_ids().collect();
    ids.sort_unstable();
    assert_eq!(ids, [1, 2, 3, 4]);

    write_chapters(&repo, &manga, &[3, 4]);
    assert_eq!(entries(&target).len(), second.len());
    assert_eq!(CbzMangaInput::new(&target).read_index().unwrap().chapter_ids().count(), 4);
}

#[test]
fn failed_write_leaves_live_archive() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let manga = remote(8, "Atomic");
    write_chapters(&repo, &manga, &[1]);
    let target = dir.path().join("Atomic.cbz");
    let before = fs::read(&target).unwrap();

    let res = repo.save(&manga, |out| {
        out.add_page_data(&chapter(2), b"partial", 0, "jpg")?;
        Err(StoreError::NotFound("download interrupted".into()))
    });
    assert!(res.is_err());
    assert_eq!(fs::read(&target).unwrap(), before);
    assert!(!temp_path_for(&target).exists());
}

#[test]
fn chapter_deletion_is_idempotent_and_preserves_survivors() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let manga = remote(9, "Delete");
    write_chapters(&repo, &manga, &[1, 2, 3]);
    let target = dir.path().join("Delete.cbz");
    let before = entries(&target);
    let local = repo.find_saved_manga(&manga).unwrap().manga;

    assert!(repo.delete_chapters(&local, &HashSet::from([2])).unwrap());
    let once = entries(&target);
    assert!(!repo.delete_chapters(&local, &HashSet::from([2])).unwrap());
    assert_eq!(entries(&target), once);

    for e in &before {
        let removed = e.0.starts_with("00000000_002");
        if e.0 != ENTRY_NAME_INDEX {
            assert_eq!(once.contains(e), !removed, "{}", e.0);
        }
    }
    let index = CbzMangaInput::new(&target).read_index().unwrap();
    assert_eq!(index.cover_entry(), Some("00000000_000000.png"));
    assert_eq!(index.chapter_ids().collect::<Vec<_>>(), [1, 3]);
}

#[test]
fn batch_deletion_collects_failures() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    write_chapters(&repo, &remote(1, "One"), &[1, 2]);
    let local = repo.find_saved_manga(&remote(1, "One")).unwrap().manga;
    let items = vec![
        (remote(2, "Remote"), HashSet::from([1])),
        (local, HashSet::from([1])),
    ];
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut ec = ErrorCollector::new(false);
    assert_eq!(repo.delete_chapters_batch(&items, &mut ec, &tx).unwrap(), 1);
    drop(tx);
    assert_eq!(ec.results().len(), 1);
    assert!(matches!(ec.results()[0].inner_error(), StoreError::NotFound(_)));
    assert!(matches!(rx.iter().last(), Some(ProgressState::Finish)));
}

#[test]
fn listing_skips_unreadable_archives() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    write_chapters(&repo, &remote(1, "Vol 10"), &[1]);
    write_chapters(&repo, &remote(2, "Vol 2"), &[1]);
    fs::write(dir.path().join("broken.cbz"), b"not a zip").unwrap();
    {
        let mut zw = zip::ZipWriter::new(fs::File::create(dir.path().join("noindex.cbz")).unwrap());
        zw.start_file(ENTRY_NAME_INDEX, zip::write::SimpleFileOptions::default()).unwrap();
        std::io::Write::write_all(&mut zw, b"{").unwrap();
        zw.finish().unwrap();
    }
    fs::write(dir.path().join("Vol 3.cbz.tmp"), b"partial").unwrap();

    let filter = ListFilter { sort_order: Some(SortOrder::Alphabetical), ..ListFilter::default() };
    let titles: Vec<_> = repo.get_list(0, &filter).into_iter().map(|x| x.manga.title).collect();
    assert_eq!(titles, ["Vol 2", "Vol 10"]);
    assert!(repo.get_list(1, &filter).is_empty());
    assert_eq!(repo.get_list(0, &ListFilter::search("10")).len(), 1);

    assert!(repo.cleanup().unwrap());
    assert!(!dir.path().join("Vol 3.cbz.tmp").exists());
}

#[test]
fn saves_of_one_work_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(repo(dir.path()));
    let inside = Arc::new(AtomicUsize::new(0));
    let manga = remote(5, "Locked");
    let handles: Vec<_> = (1..=4).map(|ch| {
        let repo = Arc::clone(&repo);
        let inside = Arc::clone(&inside);
        let manga = manga.clone();
        thread::spawn(move || {
            repo.save(&manga, |out| {
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                out.add_page_data(&chapter(ch), &page(ch, 0), 0, "jpg")?;
                thread::sleep(Duration::from_millis(20));
                inside.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }).unwrap();
        })
    }).collect();
    for h in handles {
        h.join().unwrap();
    }
    let index = CbzMangaInput::new(dir.path().join("Locked.cbz")).read_index().unwrap();
    assert_eq!(index.chapter_ids().count(), 4);
    assert!(repo.cleanup().unwrap());
}

#[test]
fn cleanup_refuses_while_locked() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    repo.lock_manga(3);
    assert!(!repo.cleanup().unwrap());
    repo.unlock_manga(3);
    assert!(repo.cleanup().unwrap());
}

#[test]
fn import_merges_into_library() {
    let lib = tempfile::tempdir().unwrap();
    let ext = tempfile::tempdir().unwrap();
    let repo = repo(lib.path());
    let manga = remote(11, "Imported");
    write_chapters(&repo, &manga, &[1]);

    let external = ext.path().join("download.cbz");
    let mut out = CbzMangaOutput::open(&external, &manga, 9).unwrap();
    out.add_page_data(&chapter(2), &page(2, 0), 0, "jpg").unwrap();
    out.finish().unwrap();

    let local = repo.import(&external).unwrap();
    assert_eq!(local.file, lib.path().join("Imported.cbz"));
    let mut ids: Vec<_> = local.manga.chapters.iter().map(|c| c.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, [1, 2]);
    assert!(external.exists());

    let bad = ext.path().join("bad.cbz");
    fs::write(&bad, b"garbage").unwrap();
    assert!(repo.import(&bad).is_err());
}

fn page_texts(repo: &LocalMangaRepository<DirStorage>, ch: &MangaChapter) -> Vec<String> {
    repo.get_pages(ch).unwrap().iter()
        .map(|p| String::from_utf8(repo.read_page(p).unwrap().to_vec()).unwrap())
        .collect()
}

#[test]
fn fractional_chapters_keep_own_pages() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let manga = remote(20, "Fractions");
    let one = MangaChapter::new(10, "One", 1.0, "/ch/10", "TEST");
    let half = MangaChapter::new(15, "One and a half", 1.5, "/ch/15", "TEST");
    let zero = MangaChapter::new(5, "Prologue", 0.0, "/ch/5", "TEST");
    repo.save(&manga, |out| {
        out.add_cover_data(b"cover", "png")?;
        out.add_page_data(&one, b"one-a", 0, "jpg")?;
        out.add_page_data(&zero, b"zero-a", 0, "png")
    }).unwrap();
    repo.save(&manga, |out| out.add_page_data(&half, b"half-a", 0, "jpg")).unwrap();

    let local = repo.find_saved_manga(&manga).unwrap().manga;
    let by_id = |id: i64| local.chapters.iter().find(|c| c.id == id).unwrap().clone();
    assert_eq!(page_texts(&repo, &by_id(10)), ["one-a"]);
    assert_eq!(page_texts(&repo, &by_id(15)), ["half-a"]);
    assert_eq!(page_texts(&repo, &by_id(5)), ["zero-a"]);
    let cover = repo.read_page(&MangaPage {
        id: 0,
        url: local.cover_url.clone(),
        preview: None,
        source: local.source.clone(),
    }).unwrap();
    assert_eq!(&cover[..], b"cover");

    assert!(repo.delete_chapters(&local, &HashSet::from([10])).unwrap());
    assert_eq!(page_texts(&repo, &by_id(15)), ["half-a"]);
    let contents: Vec<_> = entries(&dir.path().join("Fractions.cbz")).into_iter().map(|(_, b)| b).collect();
    assert!(!contents.contains(&b"one-a".to_vec()));
    assert!(contents.contains(&b"zero-a".to_vec()));
}

#[test]
fn same_title_keeps_works_apart() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let first = remote(1, "Same");
    let second = remote(2, "Same");
    write_chapters(&repo, &first, &[1]);
    write_chapters(&repo, &second, &[2]);
    write_chapters(&repo, &second, &[3]);

    let a = repo.find_saved_manga(&first).unwrap();
    let b = repo.find_saved_manga(&second).unwrap();
    assert_eq!(a.file, dir.path().join("Same.cbz"));
    assert_ne!(a.file, b.file);
    assert_eq!(a.manga.chapters.iter().map(|c| c.id).collect::<Vec<_>>(), [1]);
    assert_eq!(b.manga.chapters.iter().map(|c| c.id).collect::<Vec<_>>(), [2, 3]);
    assert_eq!(repo.get_list(0, &ListFilter::default()).len(), 2);
}

#[test]
fn save_and_chapter_deletion_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(repo(dir.path()));
    let manga = remote(6, "Busy");
    write_chapters(&repo, &manga, &[1]);
    let local = repo.find_saved_manga(&manga).unwrap().manga;

    let inside = Arc::new(AtomicUsize::new(0));
    let writer = {
        let repo = Arc::clone(&repo);
        let inside = Arc::clone(&inside);
        let manga = manga.clone();
        thread::spawn(move || {
            repo.save(&manga, |out| {
                inside.store(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(100));
                out.add_page_data(&chapter(2), &page(2, 0), 0, "jpg")?;
                inside.store(2, Ordering::SeqCst);
                Ok(())
            }).unwrap();
        })
    };
    while inside.load(Ordering::SeqCst) == 0 {
        thread::yield_now();
    }
    assert!(repo.delete_chapters(&local, &HashSet::from([1])).unwrap());
    assert_eq!(inside.load(Ordering::SeqCst), 2);
    writer.join().unwrap();

    let index = CbzMangaInput::new(dir.path().join("Busy.cbz")).read_index().unwrap();
    assert_eq!(index.chapter_ids().collect::<Vec<_>>(), [2]);
}

#[test]
fn delete_removes_archive_once() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repo(dir.path());
    let manga = remote(12, "Gone");
    write_chapters(&repo, &manga, &[1]);
    let local = repo.find_saved_manga(&manga).unwrap().manga;
    assert!(repo.delete(&local).unwrap());
    assert!(!repo.delete(&local).unwrap());
    assert!(repo.find_saved_manga(&manga).is_none());
}
