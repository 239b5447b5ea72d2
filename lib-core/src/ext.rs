/// An enum containing image formats that can be stored as pages or covers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFmt {
    /// Joint Photographic Experts Group, also known as JPEG
    Jpeg,
    /// Portable Network Graphics, also known as PNG
    Png,
    /// WebP
    Webp,
    /// Graphics Interchange Format, also known as GIF
    Gif,
    /// AV1 Image File Format, also known as AVIF
    Avif,
    /// Bitmap
    Bmp,
}
impl ImageFmt {
    /// Return an `ImageFmt` based on file extension.
    #[must_use]
    pub fn by_extension(ftype: &str) -> Option<Self> {
        Some(match ftype.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jfif" => Self::Jpeg,
            "png" => Self::Png,
            "webp" => Self::Webp,
            "gif" => Self::Gif,
            "avif" => Self::Avif,
            "bmp" => Self::Bmp,
            _ => return None
        })
    }

    /// Return an `ImageFmt` based on the extension of an entry or file name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<Self> {
        let (_, ftype) = name.rsplit_once('.')?;
        Self::by_extension(ftype)
    }

    /// A canonical extension of this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Avif => "avif",
            Self::Bmp => "bmp",
        }
    }
}
