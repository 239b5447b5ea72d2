use std::{
    cmp::Ordering,
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::OnceLock,
    time::SystemTime,
};

/// A source name of works read back from local archives.
pub const LOCAL_SOURCE: &str = "LOCAL";
/// A rating value meaning "no rating".
pub const RATING_UNKNOWN: f32 = -1.0;

/// A top-level content item (a comic/manga series).
#[derive(Debug, Clone, PartialEq)]
pub struct Manga {
    /// A stable identifier (shared by the remote and local copies of a work).
    pub id: i64,
    /// A title, also used to derive the archive file name.
    pub title: String,
    /// An alternative title.
    pub alt_title: Option<String>,
    /// A source-relative URL. For local works this is a `file://` URI of the archive.
    pub url: String,
    /// A public URL of the work.
    pub public_url: String,
    /// A rating in range `0.0..=1.0`, or [`RATING_UNKNOWN`].
    pub rating: f32,
    /// Marks adult content.
    pub is_nsfw: bool,
    /// A content rating name (`SAFE`, `SUGGESTIVE`, `ADULT`).
    pub content_rating: Option<String>,
    /// A cover URL. For local works this points into the archive.
    pub cover_url: String,
    /// A large cover URL.
    pub large_cover_url: Option<String>,
    /// A description.
    pub description: Option<String>,
    /// Tags (genres).
    pub tags: Vec<MangaTag>,
    /// A publication state.
    pub state: Option<MangaState>,
    /// An author.
    pub author: Option<String>,
    /// A source name the work was fetched from.
    pub source: String,
    /// Known chapters.
    pub chapters: Vec<MangaChapter>,
}

impl Manga {
    /// Creates a work with required fields and default values for everything else.
    pub fn new(id: i64, title: impl Into<String>, url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            alt_title: None,
            url: url.into(),
            public_url: String::new(),
            rating: RATING_UNKNOWN,
            is_nsfw: false,
            content_rating: None,
            cover_url: String::new(),
            large_cover_url: None,
            description: None,
            tags: Vec::new(),
            state: None,
            author: None,
            source: source.into(),
            chapters: Vec::new(),
        }
    }

    /// Returns `true` if this work was read back from a local archive.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.source == LOCAL_SOURCE
    }

    /// Finds a chapter by its id.
    #[must_use]
    pub fn chapter(&self, id: i64) -> Option<&MangaChapter> {
        self.chapters.iter().find(|c| c.id == id)
    }
}

/// A tag (genre) of a work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MangaTag {
    /// A source-specific key.
    pub key: String,
    /// A displayed title.
    pub title: String,
}

/// A publication state of a work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MangaState {
    /// Still being published.
    Ongoing,
    /// Completed.
    Finished,
    /// Dropped by its authors.
    Abandoned,
    /// On hiatus.
    Paused,
    /// Announced.
    Upcoming,
}

impl MangaState {
    /// Returns a name as stored in archive indexes.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ongoing => "ONGOING",
            Self::Finished => "FINISHED",
            Self::Abandoned => "ABANDONED",
            Self::Paused => "PAUSED",
            Self::Upcoming => "UPCOMING",
        }
    }

    /// Parses a stored name. Unknown names give `None`.
    #[must_use]
    pub fn from_name(s: &str) -> Option<Self> {
        Some(match s {
            "ONGOING" => Self::Ongoing,
            "FINISHED" => Self::Finished,
            "ABANDONED" => Self::Abandoned,
            "PAUSED" => Self::Paused,
            "UPCOMING" => Self::Upcoming,
            _ => return None
        })
    }
}

/// An ordered sub-unit of a work.
#[derive(Debug, Clone, PartialEq)]
pub struct MangaChapter {
    /// A stable identifier.
    pub id: i64,
    /// A displayed name.
    pub name: String,
    /// An ordering key within a branch. Its integer part is used in page entry names.
    pub number: f32,
    /// A volume number (`0` if unknown).
    pub volume: i32,
    /// A source-relative URL. For local chapters this is a `file://` URI of the archive.
    pub url: String,
    /// A scanlation group.
    pub scanlator: Option<String>,
    /// An upload date in milliseconds since the Unix epoch.
    pub upload_date: i64,
    /// A logical grouping (translation or language variant).
    pub branch: Option<String>,
    /// A source name.
    pub source: String,
}

impl MangaChapter {
    /// Creates a chapter with required fields and default values for everything else.
    pub fn new(id: i64, name: impl Into<String>, number: f32, url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            number,
            volume: 0,
            url: url.into(),
            scanlator: None,
            upload_date: 0,
            branch: None,
            source: source.into(),
        }
    }
}

/// A single page of a chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MangaPage {
    /// An identifier derived from the page URL.
    pub id: i64,
    /// A page URL. Local pages use `cbz://<archive>#<entry>`.
    pub url: String,
    /// A thumbnail URL.
    pub preview: Option<String>,
    /// A source name.
    pub source: String,
}

/// A work read back from an archive, paired with its backing file.
#[derive(Debug, Clone)]
pub struct LocalManga {
    /// The parsed work.
    pub manga: Manga,
    /// The archive file.
    pub file: PathBuf,
    created_at: OnceLock<SystemTime>,
}

impl LocalManga {
    /// Pairs a work with its archive file.
    pub fn new(manga: Manga, file: PathBuf) -> Self {
        Self { manga, file, created_at: OnceLock::new() }
    }

    /// Returns the modification time of the archive. It is read once and cached.
    pub fn created_at(&self) -> SystemTime {
        *self.created_at.get_or_init(|| {
            self.file.metadata().and_then(|m| m.modified()).unwrap_or(SystemTime::UNIX_EPOCH)
        })
    }

    /// Checks if a title or an alternative title contains a query (case-insensitive).
    #[must_use]
    pub fn is_matches_query(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.manga.title.to_lowercase().contains(&q)
            || self.manga.alt_title.as_ref().is_some_and(|t| t.to_lowercase().contains(&q))
    }

    /// Checks if all tag keys are present.
    #[must_use]
    pub fn contains_tags(&self, keys: &HashSet<String>) -> bool {
        keys.iter().all(|k| self.manga.tags.iter().any(|t| &t.key == k))
    }

    /// Checks if at least one of tag keys is present.
    #[must_use]
    pub fn contains_any_tag(&self, keys: &HashSet<String>) -> bool {
        self.manga.tags.iter().any(|t| keys.contains(&t.key))
    }
}

/// A sort order of the local library listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// By title, comparing embedded numbers numerically.
    Alphabetical,
    /// By rating, highest first.
    Rating,
    /// By archive modification time, newest first.
    Newest,
    /// By archive modification time, newest first.
    Updated,
}

impl SortOrder {
    pub(crate) fn compare(self, a: &LocalManga, b: &LocalManga) -> Ordering {
        match self {
            Self::Alphabetical => crate::cmp::alphanum(&a.manga.title, &b.manga.title),
            Self::Rating => b.manga.rating.total_cmp(&a.manga.rating),
            Self::Newest | Self::Updated => b.created_at().cmp(&a.created_at()),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "alphabetical" | "title" => Self::Alphabetical,
            "rating" => Self::Rating,
            "newest" => Self::Newest,
            "updated" => Self::Updated,
            _ => return Err(format!("unknown sort order: {s}"))
        })
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alphabetical => "alphabetical",
            Self::Rating => "rating",
            Self::Newest => "newest",
            Self::Updated => "updated",
        })
    }
}

/// A filter for the local library listing.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// A case-insensitive substring of a title or an alternative title.
    pub query: Option<String>,
    /// Tag keys that must all be present.
    pub tags: HashSet<String>,
    /// Tag keys that must all be absent.
    pub tags_exclude: HashSet<String>,
    /// An optional sort order.
    pub sort_order: Option<SortOrder>,
}

impl ListFilter {
    /// Creates a filter that matches a query.
    pub fn search(query: impl Into<String>) -> Self {
        Self { query: Some(query.into()), ..Self::default() }
    }

    pub(crate) fn apply(&self, list: &mut Vec<LocalManga>) {
        if let Some(q) = self.query.as_deref().filter(|q| !q.is_empty()) {
            list.retain(|x| x.is_matches_query(q));
        }
        if !self.tags.is_empty() {
            list.retain(|x| x.contains_tags(&self.tags));
        }
        if !self.tags_exclude.is_empty() {
            list.retain(|x| !x.contains_any_tag(&self.tags_exclude));
        }
        if let Some(so) = self.sort_order {
            list.sort_by(|a, b| so.compare(a, b));
        }
    }
}

/// Returns a `file://` URI of a path.
#[must_use]
pub fn file_uri(p: &Path) -> String {
    format!("file://{}", p.display())
}

/// Returns a path of a `file://` URI.
#[must_use]
pub fn path_from_file_uri(uri: &str) -> Option<PathBuf> {
    uri.strip_prefix("file://").map(PathBuf::from)
}

/// Returns a `cbz://` URI of an entry inside an archive.
#[must_use]
pub fn zip_uri(p: &Path, entry: &str) -> String {
    format!("cbz://{}#{entry}", p.display())
}

/// Splits a `cbz://` URI into an archive path and an entry name.
#[must_use]
pub fn parse_zip_uri(uri: &str) -> Option<(PathBuf, &str)> {
    let (p, entry) = uri.strip_prefix("cbz://")?.rsplit_once('#')?;
    Some((PathBuf::from(p), entry))
}

/// A 64-bit string hash used for identifiers derived from names and URLs.
#[must_use]
pub fn long_hash_code(s: &str) -> i64 {
    let mut h: i64 = 1_125_899_906_842_597;
    for c in s.encode_utf16() {
        h = h.wrapping_mul(31).wrapping_add(i64::from(c));
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(title: &str, tags: &[&str], rating: f32) -> LocalManga {
        let mut m = Manga::new(long_hash_code(title), title, "", LOCAL_SOURCE);
        m.rating = rating;
        m.tags = tags.iter().map(|k| MangaTag { key: (*k).into(), title: (*k).into() }).collect();
        LocalManga::new(m, PathBuf::from(format!("/nonexistent/{title}.cbz")))
    }

    #[test]
    fn zip_uri_roundtrip_keeps_hash_in_path() {
        let p = Path::new("/data/a#b/Some_Title.cbz");
        let uri = zip_uri(p, "00000000_001002.png");
        let (path, entry) = parse_zip_uri(&uri).unwrap();
        assert_eq!(path, p);
        assert_eq!(entry, "00000000_001002.png");
    }

    #[test]
    fn filter_by_query_and_tags() {
        let mut list = vec![
            local("One Piece", &["action", "comedy"], 0.9),
            local("Another", &["drama"], 0.5),
            local("Piece of Cake", &["comedy"], 0.7),
        ];
        let filter = ListFilter {
            query: Some("PIECE".into()),
            tags: HashSet::from(["comedy".to_string()]),
            tags_exclude: HashSet::from(["action".to_string()]),
            sort_order: None,
        };
        filter.apply(&mut list);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].manga.title, "Piece of Cake");
    }

    #[test]
    fn sort_by_rating_and_title() {
        let mut list = vec![local("Vol 10", &[], 0.1), local("Vol 2", &[], 0.8), local("Vol 1", &[], 0.5)];
        ListFilter { sort_order: Some(SortOrder::Rating), ..ListFilter::default() }.apply(&mut list);
        let titles: Vec<_> = list.iter().map(|x| x.manga.title.as_str()).collect();
        assert_eq!(titles, ["Vol 2", "Vol 1", "Vol 10"]);

        ListFilter { sort_order: Some(SortOrder::Alphabetical), ..ListFilter::default() }.apply(&mut list);
        let titles: Vec<_> = list.iter().map(|x| x.manga.title.as_str()).collect();
        assert_eq!(titles, ["Vol 1", "Vol 2", "Vol 10"]);
    }

    #[test]
    fn long_hash_is_stable() {
        assert_eq!(long_hash_code(""), 1_125_899_906_842_597);
        assert_eq!(long_hash_code("a"), long_hash_code("a"));
        assert_ne!(long_hash_code("a"), long_hash_code("b"));
    }
}
