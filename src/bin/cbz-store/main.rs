use std::{collections::HashSet, env, error::Error, io, path::{Path, PathBuf}, thread::{self, JoinHandle}};

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::Sender;
use indicatif::{ProgressBar, ProgressStyle};

use cbz_store_core::{
    entry::{fs::FsEntryReader, EntryReader, ReadEntry},
    errors::{ArchiveOpError, ErrorCollector},
    ext::ImageFmt,
    input::CbzMangaInput,
    model::{long_hash_code, ListFilter, LocalManga, Manga, MangaChapter},
    repository::LocalMangaRepository,
    storage::{DirStorage, StorageManager},
    wrap_send, ProgressState,
};

mod cli_args;
mod config;
mod iter;

use cli_args::{Cmd, CommonArgs};

type Repo = LocalMangaRepository<DirStorage>;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = cli_args::Args::parse();
    match args.cmd {
        Cmd::List(a) => list(&a),
        Cmd::Info(a) => info(&a),
        Cmd::Pages(a) => pages(&a),
        Cmd::Pack(a) => pack(&a),
        Cmd::Rm(a) => rm(&a),
        Cmd::RmChapters(a) => rm_chapters(&a),
        Cmd::Import(a) => import(&a),
        Cmd::Cleanup(a) => cleanup(&a),
        Cmd::Check(a) => check(&a),
    }
}

const PB_STYLE_ZIP: &str = "# {pos}/{len} {wide_msg}";

fn file_progress_bar() -> ProgressBar {
    ProgressBar::new(0).with_style(
        ProgressStyle::with_template(PB_STYLE_ZIP).unwrap_or_else(|_| ProgressStyle::default_bar())
    )
}

fn thread_progress_bar(pb: ProgressBar) -> (JoinHandle<()>, Sender<ProgressState>) {
    let (ps, pr) = crossbeam_channel::unbounded();
    let pj = thread::spawn(move || {
        use ProgressState::*;
        for st in pr {
            match st {
                Start(u) => { pb.set_length(u as u64); }
                Push(num, msg) => {
                    pb.set_position(num as u64);
                    pb.set_message(msg.to_string());
                }
                Finish => {
                    pb.finish_with_message("Done");
                }
            }
        }
    });
    (pj, ps)
}

fn join_progress(pj: JoinHandle<()>) -> anyhow::Result<()> {
    pj.join().map_err(|_| anyhow::anyhow!("Progress task failed"))
}

fn open_repo(args: &CommonArgs) -> anyhow::Result<Repo> {
    let cfg = match config::read_config(args.config.clone()) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound && args.config.is_none() => config::Config::default(),
        Err(e) => return Err(e).context("Failed to read config"),
    };
    let storage = if args.dirs.is_empty() {
        let s = DirStorage::new(cfg.dirs)?;
        match &cfg.default_dir {
            Some(d) => s.with_preferred(d)?,
            None => s,
        }
    } else {
        DirStorage::new(args.dirs.iter().cloned())?
    };
    log::debug!("library directories: {:?}", storage.readable_dirs());
    Ok(LocalMangaRepository::new(storage, cfg.store)?)
}

fn rel(p: &Path) -> String {
    env::current_dir().ok()
        .and_then(|cwd| pathdiff::diff_paths(p, cwd))
        .unwrap_or_else(|| p.to_path_buf())
        .display()
        .to_string()
}

fn local_of(p: &Path) -> anyhow::Result<LocalManga> {
    CbzMangaInput::new(p).get_manga().with_context(|| format!("Cannot read {}", p.display()))
}

fn list(a: &cli_args::ListArgs) -> anyhow::Result<()> {
    let repo = open_repo(&a.common)?;
    let filter = ListFilter {
        query: a.query.clone(),
        tags: a.tags.iter().cloned().collect(),
        tags_exclude: a.tags_exclude.iter().cloned().collect(),
        sort_order: a.sort,
    };
    let list = repo.get_list(0, &filter);
    for lm in &list {
        println!("{:>20}  {} [{} ch]  {}", lm.manga.id, lm.manga.title, lm.manga.chapters.len(), rel(&lm.file));
    }
    println!("{} work(s)", list.len());
    Ok(())
}

fn info(a: &cli_args::ArchiveArgs) -> anyhow::Result<()> {
    let repo = open_repo(&a.common)?;
    let m = local_of(&a.path)?.manga;
    println!("{} (id {})", m.title, m.id);
    if let Some(alt) = &m.alt_title {
        println!("  Also known as: {alt}");
    }
    if let Some(author) = &m.author {
        println!("  Author: {author}");
    }
    if let Some(state) = m.state {
        println!("  State: {}", state.name());
    }
    if m.rating >= 0.0 {
        println!("  Rating: {:.0}%", m.rating * 100.0);
    }
    if !m.tags.is_empty() {
        let tags: Vec<_> = m.tags.iter().map(|t| t.title.as_str()).collect();
        println!("  Tags: {}", tags.join(", "));
    }
    if let Some(remote) = repo.get_remote_manga(&m)? {
        println!("  Source: {} {}", remote.source, remote.url);
    }
    println!("  Chapters:");
    for c in &m.chapters {
        let branch = c.branch.as_deref().map(|b| format!(" [{b}]")).unwrap_or_default();
        println!("  {:>6} {}{branch} (id {})", c.number, c.name, c.id);
    }
    Ok(())
}

fn pages(a: &cli_args::PagesArgs) -> anyhow::Result<()> {
    let repo = open_repo(&a.common)?;
    let m = local_of(&a.path)?.manga;
    for c in m.chapters.iter().filter(|c| a.chapter.map_or(true, |id| id == c.id)) {
        let pages = repo.get_pages(c)?;
        println!("{} ({} pages)", c.name, pages.len());
        for p in pages {
            println!("  {}", p.url.rsplit_once('#').map_or(p.url.as_str(), |(_, e)| e));
        }
    }
    Ok(())
}

fn pack(a: &cli_args::PackArgs) -> anyhow::Result<()> {
    let repo = open_repo(&a.common)?;
    let id = a.id.unwrap_or_else(|| long_hash_code(&a.title));
    let mut manga = Manga::new(id, &a.title, format!("/manga/{id}"), &a.source);
    let mut readers = Vec::new();
    for (i, dir) in iter::chapter_dirs(&a.path)?.into_iter().enumerate() {
        let name = iter::dir_name(&dir);
        let ch = MangaChapter::new(long_hash_code(&format!("{id}/{name}")), name, (i + 1) as f32, format!("/manga/{id}/{}", i + 1), &a.source);
        manga.chapters.push(ch.clone());
        readers.push((ch, FsEntryReader::new(&dir)?));
    }

    let pb = file_progress_bar();
    let (pj, ps) = thread_progress_bar(pb);
    wrap_send(&ps, ProgressState::Start(readers.iter().map(|(_, r)| r.read_len()).sum()))?;
    let saved = repo.save(&manga, |out| {
        let mut has_cover = false;
        if let Some(c) = &a.cover {
            out.add_cover(c, c.extension().and_then(|e| e.to_str()).unwrap_or_default())?;
            has_cover = true;
        }
        let mut n = 0;
        for (ch, mut reader) in readers {
            let mut page = 0;
            while let Some(re) = reader.read_next() {
                let (_, name) = re.meta();
                n += 1;
                let Some(fmt) = ImageFmt::by_name(&name) else { continue };
                wrap_send(&ps, ProgressState::Push(n, name.into()))?;
                let data = re.data()?;
                if !has_cover {
                    out.add_cover_data(&data, fmt.extension())?;
                    has_cover = true;
                }
                out.add_page_data(&ch, &data, page, fmt.extension())?;
                page += 1;
            }
        }
        Ok(())
    });
    let finished = wrap_send(&ps, ProgressState::Finish);
    drop(ps);
    join_progress(pj)?;
    let saved = saved?;
    finished?;
    println!("Saved {} chapter(s) to {}", manga.chapters.len(), rel(&saved));
    Ok(())
}

fn rm(a: &cli_args::RmArgs) -> anyhow::Result<()> {
    let repo = open_repo(&a.common)?;
    let mut ec = ErrorCollector::new(a.common.silent);
    ec.rename("rm");
    for p in &a.paths {
        let res = CbzMangaInput::new(p).get_manga().and_then(|lm| repo.delete(&lm.manga));
        match res {
            Ok(true) => println!("Deleted {}", rel(p)),
            Ok(false) => println!("Already deleted: {}", rel(p)),
            Err(e) => ec.collect(rel(p), e),
        }
    }
    print_errors(ec.results());
    Ok(())
}

fn rm_chapters(a: &cli_args::RmChaptersArgs) -> anyhow::Result<()> {
    let repo = open_repo(&a.common)?;
    let ids: HashSet<i64> = a.ids.iter().copied().collect();
    let mut ec = ErrorCollector::new(a.common.silent);
    ec.rename("rm-chapters");
    let mut items = Vec::new();
    for p in &a.paths {
        match CbzMangaInput::new(p).get_manga() {
            Ok(lm) => items.push((lm.manga, ids.clone())),
            Err(e) => ec.collect(rel(p), e),
        }
    }
    let (pj, ps) = thread_progress_bar(file_progress_bar());
    let n = repo.delete_chapters_batch(&items, &mut ec, &ps);
    drop(ps);
    join_progress(pj)?;
    println!("{} archive(s) rewritten", n?);
    print_errors(ec.results());
    Ok(())
}

fn import(a: &cli_args::ImportArgs) -> anyhow::Result<()> {
    let repo = open_repo(&a.common)?;
    let mut ec = ErrorCollector::new(a.common.silent);
    ec.rename("import");
    for p in &a.paths {
        match repo.import(p) {
            Ok(lm) => println!("Imported {} -> {}", lm.manga.title, rel(&lm.file)),
            Err(e) => ec.collect(rel(p), e),
        }
    }
    print_errors(ec.results());
    Ok(())
}

fn cleanup(a: &CommonArgs) -> anyhow::Result<()> {
    let repo = open_repo(a)?;
    if repo.cleanup()? {
        println!("Temporary files removed");
    } else {
        println!("The library is busy, try again later");
    }
    Ok(())
}

fn check(a: &CommonArgs) -> anyhow::Result<()> {
    let path: Option<PathBuf> = a.config.clone();
    if config::check(path)? {
        println!("Config file is valid");
    } else {
        println!("Config file was missing, default values were written");
    }
    Ok(())
}

fn print_errors(v: &[ArchiveOpError]) {
    if !v.is_empty() {
        eprintln!("Errors found in archives:");
        for e in v {
            eprintln!(" # {} {}: {}", e.parent, e.name, e.source().map_or_else(|| "no error".to_string(), ToString::to_string));
        }
    }
}
