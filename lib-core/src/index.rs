//! The logical index stored as `index.json` inside every archive.
//!
//! Page entries are named `{branch hash:08}_{chapter:03}{page:03}[.ext]`, so a plain
//! lexicographic sort of entry names reproduces branch, chapter and page order.
//! The cover always takes the `(0, 0, 0)` slot.

use std::fmt;

use serde::{
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::{
    cmp,
    errors::StoreError,
    model::{Manga, MangaChapter, MangaState, MangaTag, RATING_UNKNOWN},
    Result_,
};

/// A name of the index entry. It must exist exactly once per archive.
pub const ENTRY_NAME_INDEX: &str = "index.json";
/// Page numbers must stay below this value to fit in the entry name.
pub const MAX_PAGES_PER_CHAPTER: u32 = 1000;

const PAGE_DIGITS: usize = 3;
const MAX_EXT_LEN: usize = 4;

/// Computes a 32-bit string hash of a branch, compatible with archives written by the Android app.
/// A missing branch hashes to `0`.
#[must_use]
pub fn branch_hash(branch: Option<&str>) -> i32 {
    branch.map_or(0, |s| {
        s.encode_utf16().fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(i32::from(c)))
    })
}

/// Returns the preferred chapter slot used in entry names: the integer part of a chapter number, at least 1.
/// Slot 0 is reserved for the cover.
#[must_use]
pub fn chapter_slot(number: f32) -> u32 {
    if number.is_finite() && number >= 1.0 { number as u32 } else { 1 }
}

/// Builds an entry name for a `(branch hash, chapter, page)` triple.
/// An extension is appended only if it has 1 to 4 characters.
#[must_use]
pub fn entry_name(branch_hash: i32, chapter: u32, page: u32, ext: &str) -> String {
    with_ext(format!("{branch_hash:08}_{chapter:03}{page:03}"), ext)
}

fn with_ext(mut name: String, ext: &str) -> String {
    let ext = ext.trim_start_matches('.');
    if !ext.is_empty() && ext.chars().count() <= MAX_EXT_LEN {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Builds an entry name of a chapter page.
#[must_use]
pub fn page_entry_name(chapter: &MangaChapter, page: u32, ext: &str) -> String {
    EntryPattern::for_chapter(chapter).entry_name(page, ext)
}

/// Builds an entry name of a cover.
#[must_use]
pub fn cover_entry_name(ext: &str) -> String {
    entry_name(0, 0, 0, ext)
}

/// A matcher of entry names that belong to one chapter (any page, any extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPattern {
    prefix: String,
    digits: usize,
}

impl EntryPattern {
    /// Derives a pattern from the naming scheme of a chapter.
    #[must_use]
    pub fn for_chapter(chapter: &MangaChapter) -> Self {
        Self::derive(chapter.branch.as_deref(), chapter.number)
    }

    fn derive(branch: Option<&str>, number: f32) -> Self {
        Self::with_slot(branch, chapter_slot(number))
    }

    fn with_slot(branch: Option<&str>, slot: u32) -> Self {
        Self {
            prefix: format!("{:08}_{:03}", branch_hash(branch), slot),
            digits: PAGE_DIGITS,
        }
    }

    /// Checks if some entry name can match both patterns.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.prefix.len() + self.digits == other.prefix.len() + other.digits
            && (self.prefix.starts_with(other.prefix.as_str()) || other.prefix.starts_with(self.prefix.as_str()))
    }

    /// Renames an entry matched by `from` to the same page of this pattern.
    /// Returns `None` if `from` does not match or the page number does not fit.
    #[must_use]
    pub fn rename(&self, from: &Self, entry_name: &str) -> Option<String> {
        if !from.matches(entry_name) {
            return None
        }
        let rest = &entry_name[from.prefix.len()..];
        let (digits, tail) = rest.split_at(from.digits);
        let page: u32 = digits.parse().ok()?;
        if page.checked_ilog10().unwrap_or(0) as usize >= self.digits {
            return None
        }
        Some(format!("{}{:0width$}{tail}", self.prefix, page, width = self.digits))
    }

    /// Checks if an entry name (with or without an extension) belongs to this chapter.
    #[must_use]
    pub fn matches(&self, entry_name: &str) -> bool {
        let stem = entry_name.split_once('.').map_or(entry_name, |(s, _)| s);
        stem.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.len() == self.digits && rest.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Builds a name of a page entry that this pattern matches.
    #[must_use]
    pub fn entry_name(&self, page: u32, ext: &str) -> String {
        with_ext(format!("{}{:0width$}", self.prefix, page, width = self.digits), ext)
    }

    /// Parses a stored pattern in the `<prefix>\d{N}` form.
    fn parse(s: &str) -> Option<Self> {
        let (prefix, n) = s.strip_suffix('}')?.rsplit_once("\\d{")?;
        let digits = n.parse().ok()?;
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit() || b == b'_' || b == b'-') {
            return None
        }
        Some(Self { prefix: prefix.to_owned(), digits })
    }
}

impl fmt::Display for EntryPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\\d{{{}}}", self.prefix, self.digits)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TagRecord {
    key: String,
    title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChapterRecord {
    #[serde(skip)]
    id: i64,
    #[serde(default)]
    number: f32,
    #[serde(default)]
    volume: i32,
    #[serde(default)]
    url: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "uploadDate")]
    upload_date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scanlator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entries: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
}

impl ChapterRecord {
    fn new(chapter: &MangaChapter, pattern: &EntryPattern) -> Self {
        let mut r = Self {
            id: chapter.id,
            number: 0.0,
            volume: 0,
            url: String::new(),
            name: String::new(),
            upload_date: 0,
            scanlator: None,
            branch: None,
            entries: Some(pattern.to_string()),
            file: None,
        };
        r.update(chapter);
        r
    }

    fn update(&mut self, chapter: &MangaChapter) {
        self.number = chapter.number;
        self.volume = chapter.volume;
        self.url.clone_from(&chapter.url);
        self.name.clone_from(&chapter.name);
        self.upload_date = chapter.upload_date;
        self.scanlator.clone_from(&chapter.scanlator);
        self.branch.clone_from(&chapter.branch);
    }

    fn pattern(&self) -> EntryPattern {
        self.entries.as_deref()
            .and_then(EntryPattern::parse)
            .unwrap_or_else(|| EntryPattern::derive(self.branch.as_deref(), self.number))
    }

    fn to_chapter(&self, source: &str) -> MangaChapter {
        MangaChapter {
            id: self.id,
            name: self.name.clone(),
            number: self.number,
            volume: self.volume,
            url: self.url.clone(),
            scanlator: self.scanlator.clone(),
            upload_date: self.upload_date,
            branch: self.branch.clone(),
            source: source.to_owned(),
        }
    }
}

/// Chapters keyed by id, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
struct ChapterTable(Vec<ChapterRecord>);

impl ChapterTable {
    fn get_mut(&mut self, id: i64) -> Option<&mut ChapterRecord> {
        self.0.iter_mut().find(|r| r.id == id)
    }
    fn contains(&self, id: i64) -> bool {
        self.0.iter().any(|r| r.id == id)
    }
    fn upsert(&mut self, r: ChapterRecord) {
        match self.get_mut(r.id) {
            Some(x) => *x = r,
            None => self.0.push(r),
        }
    }
}

impl Serialize for ChapterTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for r in &self.0 {
            map.serialize_entry(&r.id.to_string(), r)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ChapterTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;
        impl<'de> Visitor<'de> for TableVisitor {
            type Value = ChapterTable;
            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of chapters keyed by id")
            }
            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut table = ChapterTable(Vec::with_capacity(access.size_hint().unwrap_or(0)));
                while let Some((k, mut r)) = access.next_entry::<String, ChapterRecord>()? {
                    r.id = k.parse().map_err(|_| de::Error::custom(format!("invalid chapter id: {k}")))?;
                    table.upsert(r);
                }
                Ok(table)
            }
        }
        deserializer.deserialize_map(TableVisitor)
    }
}

/// An index of a single archive: work metadata, chapters and the cover entry name.
///
/// Unknown fields are ignored and missing optional fields are defaulted,
/// so indexes written by older versions stay readable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MangaIndex {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(rename = "title_alt", skip_serializing_if = "Option::is_none")]
    alt_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alt_titles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rating: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nsfw: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(rename = "cover_large", skip_serializing_if = "Option::is_none")]
    large_cover: Option<String>,
    tags: Vec<TagRecord>,
    chapters: ChapterTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    cover_entry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_version: Option<serde_json::Value>,
}

impl MangaIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an index from the text of an index entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IndexCorrupt`] if the text is empty or not a valid index.
    pub fn parse(text: &str) -> Result_<Self> {
        if text.trim().len() <= 2 {
            return Err(StoreError::IndexCorrupt("index is empty".into()))
        }
        serde_json::from_str(text).map_err(|e| StoreError::IndexCorrupt(e.to_string()))
    }

    /// Serializes this index as the text of an index entry.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result_<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Stores the work metadata. Chapters already known to the index are kept unless
    /// `replace_chapters` is set, in which case the chapter list becomes the one of `manga`.
    pub fn set_manga_info(&mut self, manga: &Manga, replace_chapters: bool) {
        self.id = Some(manga.id);
        self.title = Some(manga.title.clone());
        self.alt_title.clone_from(&manga.alt_title);
        self.url = Some(manga.url.clone());
        self.public_url = Some(manga.public_url.clone());
        self.author.clone_from(&manga.author);
        self.alt_titles = Some(manga.alt_title.iter().cloned().collect());
        self.authors = Some(manga.author.iter().cloned().collect());
        self.cover = Some(manga.cover_url.clone());
        self.description.clone_from(&manga.description);
        self.rating = Some(manga.rating);
        self.content_rating.clone_from(&manga.content_rating);
        self.nsfw = Some(manga.is_nsfw);
        self.state = manga.state.map(|s| s.name().to_owned());
        self.source = Some(manga.source.clone());
        self.large_cover.clone_from(&manga.large_cover_url);
        self.tags = manga.tags.iter().map(|t| TagRecord { key: t.key.clone(), title: t.title.clone() }).collect();
        if replace_chapters {
            self.chapters = ChapterTable::default();
            for c in &manga.chapters {
                self.add_chapter(c);
            }
        }
        self.app_id = Some(env!("CARGO_PKG_NAME").to_owned());
        self.app_version = Some(env!("CARGO_PKG_VERSION").into());
    }

    /// Materializes the stored work, with chapters ordered by number.
    /// Returns `None` if the index lacks an id, a title, an URL or a source.
    #[must_use]
    pub fn manga_info(&self) -> Option<Manga> {
        let source = self.source.clone()?;
        let mut chapters: Vec<_> = self.chapters.0.iter().map(|r| r.to_chapter(&source)).collect();
        chapters.sort_by(|a, b| a.number.total_cmp(&b.number));
        let is_nsfw = match self.content_rating.as_deref() {
            Some(cr) => cr == "ADULT",
            None => self.nsfw.unwrap_or(false),
        };
        Some(Manga {
            id: self.id?,
            title: self.title.clone()?,
            alt_title: self.alt_title.clone().or_else(|| first_of(self.alt_titles.as_deref())),
            url: self.url.clone()?,
            public_url: self.public_url.clone().unwrap_or_default(),
            rating: self.rating.unwrap_or(RATING_UNKNOWN),
            is_nsfw,
            content_rating: self.content_rating.clone(),
            cover_url: self.cover.clone().unwrap_or_default(),
            large_cover_url: self.large_cover.clone(),
            description: self.description.clone(),
            tags: self.tags.iter().map(|t| MangaTag { key: t.key.clone(), title: t.title.clone() }).collect(),
            state: self.state.as_deref().and_then(MangaState::from_name),
            author: self.author.clone().or_else(|| first_of(self.authors.as_deref())),
            source,
            chapters,
        })
    }

    /// Returns the id of the stored work.
    #[must_use]
    pub const fn manga_id(&self) -> Option<i64> {
        self.id
    }

    /// Inserts a chapter or updates its metadata. Chapters stay unique by id
    /// and an updated chapter keeps the entry pattern it was stored with.
    /// A new chapter gets a pattern that no other chapter of this index can match.
    pub fn add_chapter(&mut self, chapter: &MangaChapter) {
        match self.chapters.get_mut(chapter.id) {
            Some(r) => r.update(chapter),
            None => {
                let pattern = self.free_pattern(chapter.branch.as_deref(), chapter_slot(chapter.number), PAGE_DIGITS);
                self.chapters.0.push(ChapterRecord::new(chapter, &pattern));
            }
        }
    }

    fn is_taken(&self, p: &EntryPattern) -> bool {
        self.chapters.0.iter().any(|r| r.pattern().overlaps(p))
    }

    /// Finds a free slot of a branch, starting from `slot` and going up.
    fn free_pattern(&self, branch: Option<&str>, slot: u32, digits: usize) -> EntryPattern {
        let mut slot = slot.max(1);
        loop {
            let p = EntryPattern { digits, ..EntryPattern::with_slot(branch, slot) };
            if !self.is_taken(&p) {
                return p
            }
            slot += 1;
        }
    }

    /// Removes a chapter from the list. Returns `false` if it was not present.
    /// Entries of the chapter are not touched.
    pub fn remove_chapter(&mut self, id: i64) -> bool {
        let len = self.chapters.0.len();
        self.chapters.0.retain(|r| r.id != id);
        self.chapters.0.len() != len
    }

    /// Checks if a chapter is known to this index.
    #[must_use]
    pub fn has_chapter(&self, id: i64) -> bool {
        self.chapters.contains(id)
    }

    /// Returns ids of all known chapters in stored order.
    pub fn chapter_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.chapters.0.iter().map(|r| r.id)
    }

    /// Folds every chapter of another index into this one. Chapters already present are kept as-is.
    /// The other cover entry is adopted if this index has none.
    ///
    /// Returns pattern renames `(from, to)` for entries of `other`: a chapter known to both indexes
    /// with different patterns, or a new chapter whose pattern is already taken here.
    /// Entries copied from the other archive must be renamed accordingly.
    #[must_use]
    pub fn merge_chapters_from(&mut self, other: &Self) -> Vec<(EntryPattern, EntryPattern)> {
        let mut renames = Vec::new();
        for r in &other.chapters.0 {
            let from = r.pattern();
            if let Some(own) = self.chapters.0.iter().find(|x| x.id == r.id) {
                let to = own.pattern();
                if to != from {
                    renames.push((from, to));
                }
            } else if self.is_taken(&from) {
                let to = self.free_pattern(r.branch.as_deref(), chapter_slot(r.number), from.digits);
                let mut r = r.clone();
                r.entries = Some(to.to_string());
                self.chapters.0.push(r);
                renames.push((from, to));
            } else {
                self.chapters.0.push(r.clone());
            }
        }
        if self.cover_entry.is_none() {
            self.cover_entry.clone_from(&other.cover_entry);
        }
        renames
    }

    /// Takes the work metadata of another index, keeping chapters and the cover entry of this one.
    pub fn adopt_manga_info(&mut self, other: &Self) {
        let chapters = std::mem::take(&mut self.chapters);
        let cover_entry = self.cover_entry.take();
        *self = Self { chapters, cover_entry, ..other.clone() };
    }

    /// Returns the name of the cover entry.
    #[must_use]
    pub fn cover_entry(&self) -> Option<&str> {
        self.cover_entry.as_deref()
    }

    /// Sets the name of the cover entry.
    pub fn set_cover_entry(&mut self, name: impl Into<String>) {
        self.cover_entry = Some(name.into());
    }

    /// Returns a matcher of entry names that belong to a chapter.
    /// A chapter stored in this index uses its recorded pattern.
    #[must_use]
    pub fn chapter_names_pattern(&self, chapter: &MangaChapter) -> EntryPattern {
        self.chapters.0.iter()
            .find(|r| r.id == chapter.id)
            .map_or_else(|| EntryPattern::for_chapter(chapter), ChapterRecord::pattern)
    }

    /// Returns matchers of all known chapters.
    #[must_use]
    pub fn chapter_patterns(&self) -> Vec<EntryPattern> {
        self.chapters.0.iter().map(ChapterRecord::pattern).collect()
    }

    /// Sorts chapters by name (numbers compared numerically) and renumbers them from 1.
    /// Entry names are not changed.
    pub fn sort_chapters_by_name(&mut self) {
        self.chapters.0.sort_by(|a, b| cmp::alphanum(&a.name, &b.name));
        for (i, r) in self.chapters.0.iter_mut().enumerate() {
            r.number = (i + 1) as f32;
        }
    }
}

fn first_of(v: Option<&[String]>) -> Option<String> {
    v.and_then(|v| v.first()).cloned()
}
