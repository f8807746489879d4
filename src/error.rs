use thiserror::Error;

/// Why one detail page failed to become a record.
///
/// Sitemap discovery failures are deliberately not represented here: a broken
/// root index or sub-sitemap aborts the whole run instead of being counted
/// per item.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The page fetch failed (network fault, timeout, non-success status) or
    /// the finished record could not be written out.
    #[error("transport: {0:#}")]
    Transport(anyhow::Error),

    /// The page carried no usable ld+json block, or its URL carried no id.
    #[error("structured data: {0:#}")]
    StructuredData(anyhow::Error),
}

impl ItemError {
    /// Stable label used in logs and the failure tally.
    pub fn kind(&self) -> &'static str {
        match self {
            ItemError::Transport(_) => "transport",
            ItemError::StructuredData(_) => "structured-data",
        }
    }
}
