//! Harvest Core - Foundation crate for the harvest extraction engine.
//!
//! This crate provides shared types, error handling and configuration
//! management that all other harvest crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes (`SiteId`, `SessionId`)
//!
//! # Example
//!
//! ```rust
//! use harvest_core::{AppConfig, SiteId};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.scanning.max_attempts, 5);
//!
//! let site = SiteId::new("copetran")?;
//! println!("scraping {site}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, BrowserConfig, ProfilesConfig, ScanningConfig};
pub use error::{ConfigError, ConfigResult, HarvestError, Result};
pub use types::{SessionId, SiteId};
