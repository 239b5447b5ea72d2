use std::path::PathBuf;

use cbz_store_core::model::SortOrder;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Cmd
}

#[derive(Debug, clap::Subcommand)]
pub enum Cmd {
    /// List works of the library
    List(ListArgs),

    /// Show a work stored in an archive
    Info(ArchiveArgs),

    /// List pages of a stored work
    Pages(PagesArgs),

    /// Pack a directory of images into the library
    Pack(PackArgs),

    /// Delete archives
    Rm(RmArgs),

    /// Delete chapters from archives
    RmChapters(RmChaptersArgs),

    /// Import an external archive into the library
    Import(ImportArgs),

    /// Remove temporary files of interrupted writes
    Cleanup(CommonArgs),

    /// Check the config file
    Check(CommonArgs)
}

#[derive(Debug, clap::Args)]
pub struct ListArgs {
    /// Show only works whose title contains this text
    #[arg(short, long)]
    pub query: Option<String>,

    /// Show only works with this tag key (can be repeated)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Hide works with this tag key (can be repeated)
    #[arg(short = 'x', long = "exclude-tag")]
    pub tags_exclude: Vec<String>,

    /// Sort order: alphabetical, rating, newest or updated
    #[arg(short, long)]
    pub sort: Option<SortOrder>,

    #[command(flatten)]
    pub common: CommonArgs
}

#[derive(Debug, clap::Args)]
pub struct ArchiveArgs {
    /// Path to an archive of the library
    pub path: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs
}

#[derive(Debug, clap::Args)]
pub struct PagesArgs {
    /// Path to an archive of the library
    pub path: PathBuf,

    /// Show only this chapter
    #[arg(long)]
    pub chapter: Option<i64>,

    #[command(flatten)]
    pub common: CommonArgs
}

#[derive(Debug, clap::Args)]
pub struct PackArgs {
    /// A directory of images. Each subdirectory becomes a chapter; without subdirectories the images form one chapter
    #[arg(short = 'i', long = "in")]
    pub path: PathBuf,

    /// Title of the work
    #[arg(short, long)]
    pub title: String,

    /// Identifier of the work (derived from the title if missing)
    #[arg(long)]
    pub id: Option<i64>,

    /// Source name of the work
    #[arg(long, default_value = "MANUAL")]
    pub source: String,

    /// Cover image (the first page is used if missing)
    #[arg(long)]
    pub cover: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs
}

#[derive(Debug, clap::Args)]
pub struct RmArgs {
    /// Paths to archives of the library
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs
}

#[derive(Debug, clap::Args)]
pub struct RmChaptersArgs {
    /// Paths to archives of the library
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Chapter ids to remove
    #[arg(long, value_delimiter = ',', required = true)]
    pub ids: Vec<i64>,

    #[command(flatten)]
    pub common: CommonArgs
}

#[derive(Debug, clap::Args)]
pub struct ImportArgs {
    /// Paths to external archives
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs
}

#[derive(Debug, clap::Args)]
pub struct CommonArgs {
    /// Do not print per-archive errors
    #[arg(long)]
    pub silent: bool,

    /// Library directory (can be repeated). Overrides directories of the config file
    #[arg(short = 'd', long = "dir")]
    pub dirs: Vec<PathBuf>,

    /// (Optional) Use custom .toml config file. If no path is provided, it will use `cbz-store.toml`
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>
}
