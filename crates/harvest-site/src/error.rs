//! Error types for the site profile subsystem.

use thiserror::Error;

/// Errors that can occur in site profile operations.
#[derive(Error, Debug)]
pub enum SiteError {
    /// Site profile not found
    #[error("site profile not found: {site_id}")]
    NotFound {
        /// The site ID that was not found
        site_id: String,
    },

    /// Failed to load site profile from file
    #[error("failed to load site profile from {path}: {source}")]
    LoadError {
        /// Path to the profile file
        path: String,
        /// Underlying error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to parse site profile TOML
    #[error("failed to parse site profile TOML in {path}: {source}")]
    ParseError {
        /// Path to the profile file
        path: String,
        /// TOML parse error
        #[source]
        source: toml::de::Error,
    },

    /// Invalid site profile (validation failed)
    #[error("invalid site profile for {site_id}: {reason}")]
    ValidationError {
        /// Site ID being validated
        site_id: String,
        /// Reason for validation failure
        reason: String,
    },

    /// Site profile directory not found
    #[error("site profiles directory not found at {path}")]
    DirectoryNotFound {
        /// Expected directory path
        path: String,
    },

    /// I/O error while accessing site profiles
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid site ID format
    #[error("invalid site ID: {0}")]
    InvalidId(#[from] harvest_core::HarvestError),
}

/// Result type for site profile operations.
pub type Result<T> = std::result::Result<T, SiteError>;
