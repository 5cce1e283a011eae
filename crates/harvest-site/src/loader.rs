//! Site profile loading from TOML files.
//!
//! Profiles live under `site-profiles/<category>/<site-id>.toml`.

use crate::{
    definition::SiteProfile,
    error::{Result, SiteError},
};
use harvest_core::SiteId;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the bundled profile directory at the workspace root.
pub const DEFAULT_PROFILES_DIR: &str = "site-profiles";

/// Loader for site profiles from TOML files.
pub struct SiteLoader {
    profiles_dir: PathBuf,
}

impl SiteLoader {
    /// Create a new loader over the given directory.
    ///
    /// # Errors
    /// Returns error if the directory doesn't exist.
    pub fn new(profiles_dir: impl Into<PathBuf>) -> Result<Self> {
        let profiles_dir = profiles_dir.into();

        if !profiles_dir.is_dir() {
            return Err(SiteError::DirectoryNotFound {
                path: profiles_dir.display().to_string(),
            });
        }

        Ok(Self { profiles_dir })
    }

    /// Create a loader using the bundled `site-profiles/` directory.
    ///
    /// Walks up from the current directory to the workspace root.
    ///
    /// # Errors
    /// Returns error if the default directory doesn't exist.
    pub fn with_default_dir() -> Result<Self> {
        let mut current_dir = std::env::current_dir()?;

        loop {
            let cargo_toml = current_dir.join("Cargo.toml");
            if let Ok(contents) = std::fs::read_to_string(&cargo_toml) {
                if contents.contains("[workspace]") {
                    return Self::new(current_dir.join(DEFAULT_PROFILES_DIR));
                }
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        Self::new(PathBuf::from(DEFAULT_PROFILES_DIR))
    }

    /// Directory this loader reads from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.profiles_dir
    }

    /// Load and validate a single profile by site ID.
    ///
    /// # Errors
    /// Returns error if the file doesn't exist, can't be read, or is invalid.
    pub fn load(&self, site_id: &SiteId) -> Result<SiteProfile> {
        let filename = format!("{}.toml", site_id.as_str());

        let path = Self::find_file(&self.profiles_dir, &filename)?.ok_or_else(|| {
            SiteError::NotFound {
                site_id: site_id.to_string(),
            }
        })?;

        let profile = Self::load_from_path(&path)?;
        profile.validate()?;

        debug!(
            site_id = %site_id,
            name = %profile.name(),
            candidates = profile.readiness.candidates.len(),
            "loaded site profile"
        );

        Ok(profile)
    }

    /// Load every profile below the directory.
    ///
    /// Unreadable or invalid profiles are logged and skipped.
    ///
    /// # Errors
    /// Returns error if the directory can't be read.
    pub fn load_all(&self) -> Result<Vec<SiteProfile>> {
        let mut profiles = Vec::new();

        Self::walk_and_load(&self.profiles_dir, &mut profiles)?;

        info!(
            count = profiles.len(),
            dir = %self.profiles_dir.display(),
            "loaded site profiles"
        );

        Ok(profiles)
    }

    /// Parse and validate a profile from an arbitrary file.
    ///
    /// # Errors
    /// Returns error if the file can't be read, parsed or validated.
    pub fn load_file(path: &Path) -> Result<SiteProfile> {
        let profile = Self::load_from_path(path)?;
        profile.validate()?;
        Ok(profile)
    }

    fn walk_and_load(dir: &Path, profiles: &mut Vec<SiteProfile>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();

            if path.is_dir() {
                Self::walk_and_load(&path, profiles)?;
                continue;
            }

            if path.extension().and_then(|s| s.to_str()) != Some("toml") {
                continue;
            }

            match Self::load_file(&path) {
                Ok(profile) => profiles.push(profile),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping site profile"
                ),
            }
        }

        Ok(())
    }

    fn find_file(dir: &Path, filename: &str) -> Result<Option<PathBuf>> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();

            if path.is_dir() {
                if let Some(found) = Self::find_file(&path, filename)? {
                    return Ok(Some(found));
                }
            } else if path.file_name().and_then(|s| s.to_str()) == Some(filename) {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    fn load_from_path(path: &Path) -> Result<SiteProfile> {
        let contents = std::fs::read_to_string(path).map_err(|e| SiteError::LoadError {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        toml::from_str(&contents).map_err(|e| SiteError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::SiteCategory;
    use tempfile::TempDir;

    fn write_profile(dir: &Path, site_id: &str, category: &str) -> PathBuf {
        let category_dir = dir.join(category);
        std::fs::create_dir_all(&category_dir).expect("create category dir");

        let file_path = category_dir.join(format!("{site_id}.toml"));
        let content = format!(
            r#"
[site]
id = "{site_id}"
name = "Test Site"
url = "https://test.example"
search_url = "https://test.example/search"
category = "{category}"
last_verified = "2025-05-01"

[readiness]
candidates = [".result-card", ".card"]
scroll_cycles = 2

[[fields]]
name = "title"
kind = "text"
source = {{ from = "element", selector = "h2" }}
required = true

[[fields]]
name = "price"
kind = "money"
default = 0
"#
        );

        std::fs::write(&file_path, content).expect("write profile");
        file_path
    }

    #[test]
    fn test_loader_new_with_existing_dir() {
        let temp_dir = TempDir::new().expect("create temp dir");
        assert!(SiteLoader::new(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_loader_new_with_missing_dir() {
        let result = SiteLoader::new("/nonexistent/site-profiles");
        assert!(matches!(result, Err(SiteError::DirectoryNotFound { .. })));
    }

    #[test]
    fn test_load_single_profile() {
        let temp_dir = TempDir::new().expect("create temp dir");
        write_profile(temp_dir.path(), "test-site", "lodging");

        let loader = SiteLoader::new(temp_dir.path()).expect("create loader");
        let site_id = SiteId::new("test-site").expect("valid site ID");
        let profile = loader.load(&site_id).expect("load profile");

        assert_eq!(profile.id(), &site_id);
        assert_eq!(profile.name(), "Test Site");
        assert_eq!(profile.category(), SiteCategory::Lodging);
        assert_eq!(profile.readiness.scroll_cycles, 2);
    }

    #[test]
    fn test_load_missing_profile() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let loader = SiteLoader::new(temp_dir.path()).expect("create loader");
        let site_id = SiteId::new("nowhere").expect("valid site ID");

        assert!(matches!(
            loader.load(&site_id),
            Err(SiteError::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_all_walks_categories() {
        let temp_dir = TempDir::new().expect("create temp dir");
        write_profile(temp_dir.path(), "site-one", "flights");
        write_profile(temp_dir.path(), "site-two", "buses");
        write_profile(temp_dir.path(), "site-three", "buses");

        let loader = SiteLoader::new(temp_dir.path()).expect("create loader");
        let profiles = loader.load_all().expect("load all");

        assert_eq!(profiles.len(), 3);
    }

    #[test]
    fn test_load_all_skips_invalid() {
        let temp_dir = TempDir::new().expect("create temp dir");
        write_profile(temp_dir.path(), "good-site", "flights");
        std::fs::write(temp_dir.path().join("broken.toml"), "[[[ not toml")
            .expect("write broken file");
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").expect("write notes");

        let loader = SiteLoader::new(temp_dir.path()).expect("create loader");
        let profiles = loader.load_all().expect("load all");

        assert_eq!(profiles.len(), 1);
    }

    #[test]
    fn test_load_file_validates() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = write_profile(temp_dir.path(), "check-site", "other");
        let contents = std::fs::read_to_string(&path)
            .expect("read")
            .replace("required = true", "required = false");
        std::fs::write(&path, contents).expect("rewrite");

        assert!(matches!(
            SiteLoader::load_file(&path),
            Err(SiteError::ValidationError { .. })
        ));
    }
}
