use harvest_core::SiteId;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Browser error: {0}")]
    Browser(#[from] harvest_browser::BrowserError),

    #[error("No result containers for site {site_id}: {candidates} candidates tried within {waited:?}")]
    ContentNotFound {
        site_id: SiteId,
        candidates: usize,
        waited: Duration,
    },

    #[error("Selectors outdated for site {site_id}: {reason}")]
    SelectorsOutdated { site_id: SiteId, reason: String },

    #[error("Record sink error: {0}")]
    Sink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Whether a fresh attempt with a fresh session may succeed.
    ///
    /// Browser-level failures and readiness timeouts are transient; a
    /// profile that doesn't compile fails identically on every attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Browser(_) | Self::ContentNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
