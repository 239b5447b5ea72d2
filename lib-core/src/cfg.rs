/// Configuration of the storage engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-cfg", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-cfg", serde(default))]
pub struct StoreConfig {
    /// How many archives are parsed at once while listing the library.
    pub max_parallelism: usize,
    /// A deflate level (0-9) for compressible entries.
    pub compression_level: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_parallelism: 4, compression_level: 9 }
    }
}

impl StoreConfig {
    /// Returns the worker count, never less than 1.
    #[inline]
    #[must_use]
    pub fn workers(&self) -> usize {
        self.max_parallelism.max(1)
    }
}
