use cbz_store_core::{
    cmp::alphanum,
    index::{branch_hash, page_entry_name, EntryPattern},
    model::MangaChapter,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn chapters() -> Vec<MangaChapter> {
    (1..=200).map(|i| {
        let mut c = MangaChapter::new(i, format!("Chapter {i}"), i as f32, format!("/ch/{i}"), "TEST");
        c.branch = (i % 2 == 0).then(|| "English".to_owned());
        c
    }).collect()
}

fn bench_naming(c: &mut Criterion) {
    let chapters = chapters();
    let names: Vec<String> = chapters.iter()
        .flat_map(|ch| (0..20).map(move |p| page_entry_name(ch, p, "jpg")))
        .collect();
    let pattern = EntryPattern::for_chapter(&chapters[100]);

    c.bench_function("branch hash", |b| b.iter(|| branch_hash(black_box(Some("English (Fan translation)")))));
    c.bench_function("entry names", |b| b.iter(|| {
        chapters.iter().map(|ch| page_entry_name(ch, black_box(7), "jpg")).count()
    }));
    c.bench_function("pattern match", |b| b.iter(|| {
        names.iter().filter(|n| pattern.matches(n)).count()
    }));
    c.bench_function("alphanum sort", |b| b.iter(|| {
        let mut v: Vec<_> = chapters.iter().map(|c| c.name.as_str()).collect();
        v.reverse();
        v.sort_by(|a, b| alphanum(a, b));
        v.len()
    }));
}

criterion_group!(ben, bench_naming);
criterion_main!(ben);
