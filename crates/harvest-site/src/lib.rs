//! Harvest Site - Site profiles for the extraction engine.
//!
//! A site profile carries everything site-specific: the results URL, the
//! ordered selector candidates for result containers, lazy-load nudges
//! (scrolls, consent banner, "show more" button), locale rules, and the
//! field schema. Profiles are plain TOML under `site-profiles/`.
//!
//! # Architecture
//!
//! - **Definition Types** ([`definition`]): Strongly-typed profile structure and validation
//! - **Loader** ([`loader`]): TOML file loading from `site-profiles/`
//! - **Registry** ([`registry`]): In-memory cache with category queries
//! - **Errors** ([`error`]): Site-specific error types
//!
//! # Example
//!
//! ```rust,no_run
//! use harvest_core::SiteId;
//! use harvest_site::{SiteLoader, SiteRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = SiteLoader::with_default_dir()?;
//! let registry = SiteRegistry::load_from(&loader)?;
//!
//! let profile = registry.get(&SiteId::new("copetran")?)?;
//! println!("{} ({})", profile.name(), profile.category().display_name());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod definition;
pub mod error;
pub mod loader;
pub mod registry;

pub use definition::{
    DefaultValue, DerivedField, DerivedKind, ElementLookup, FieldKind, FieldSource, FieldSpec,
    LocaleRules, Meridiem, ReadinessProfile, SelectorCandidate, SiteCategory, SiteMetadata,
    SiteProfile,
};
pub use error::{Result, SiteError};
pub use loader::{SiteLoader, DEFAULT_PROFILES_DIR};
pub use registry::SiteRegistry;
