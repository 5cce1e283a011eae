//! In-memory site profile registry.

use crate::{
    definition::{SiteCategory, SiteProfile},
    error::{Result, SiteError},
    loader::SiteLoader,
};
use harvest_core::SiteId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Cached site profiles indexed by site ID.
#[derive(Clone, Default)]
pub struct SiteRegistry {
    profiles: Arc<RwLock<HashMap<SiteId, SiteProfile>>>,
}

impl SiteRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every valid profile the loader finds.
    pub fn load_from(loader: &SiteLoader) -> Result<Self> {
        let registry = Self::new();
        registry.reload(loader)?;
        Ok(registry)
    }

    /// Replace the cache with freshly loaded profiles.
    pub fn reload(&self, loader: &SiteLoader) -> Result<()> {
        let profiles = loader.load_all()?;

        let mut cache = self.write();
        cache.clear();
        for profile in profiles {
            cache.insert(profile.id().clone(), profile);
        }

        info!(count = cache.len(), "reloaded site profiles");
        Ok(())
    }

    /// Get a profile by ID.
    pub fn get(&self, site_id: &SiteId) -> Result<SiteProfile> {
        self.read()
            .get(site_id)
            .cloned()
            .ok_or_else(|| SiteError::NotFound {
                site_id: site_id.to_string(),
            })
    }

    /// All profiles, sorted by site ID.
    #[must_use]
    pub fn get_all(&self) -> Vec<SiteProfile> {
        let mut profiles: Vec<_> = self.read().values().cloned().collect();
        profiles.sort_by(|a, b| a.id().cmp(b.id()));
        profiles
    }

    /// Profiles of one category, sorted by site ID.
    #[must_use]
    pub fn get_by_category(&self, category: SiteCategory) -> Vec<SiteProfile> {
        let mut profiles: Vec<_> = self
            .read()
            .values()
            .filter(|p| p.category() == category)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.id().cmp(b.id()));
        profiles
    }

    /// Number of cached profiles.
    #[must_use]
    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Whether a profile is cached for the ID.
    #[must_use]
    pub fn contains(&self, site_id: &SiteId) -> bool {
        self.read().contains_key(site_id)
    }

    /// Add or replace a profile after validating it.
    pub fn insert(&self, profile: SiteProfile) -> Result<()> {
        profile.validate()?;
        debug!(site_id = %profile.id(), "registered site profile");
        self.write().insert(profile.id().clone(), profile);
        Ok(())
    }

    /// Remove a profile, returning it if present.
    pub fn remove(&self, site_id: &SiteId) -> Option<SiteProfile> {
        self.write().remove(site_id)
    }

    // A panicked writer cannot leave a half-inserted profile behind
    fn read(&self) -> RwLockReadGuard<'_, HashMap<SiteId, SiteProfile>> {
        self.profiles.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SiteId, SiteProfile>> {
        self.profiles.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile(id: &str, category: &str) -> SiteProfile {
        toml::from_str(&format!(
            r#"
[site]
id = "{id}"
name = "{id}"
url = "https://{id}.example"
search_url = "https://{id}.example/results"
category = "{category}"
last_verified = "2025-05-01"

[readiness]
candidates = [".card"]

[[fields]]
name = "title"
kind = "text"
required = true
"#
        ))
        .expect("parse profile")
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = SiteRegistry::new();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_insert_and_get() {
        let registry = SiteRegistry::new();
        registry.insert(profile("omega", "buses")).expect("insert");

        let id = SiteId::new("omega").expect("valid ID");
        assert!(registry.contains(&id));
        assert_eq!(registry.get(&id).expect("get").name(), "omega");
    }

    #[test]
    fn test_insert_rejects_invalid_profile() {
        let registry = SiteRegistry::new();
        let mut bad = profile("broken", "other");
        bad.readiness.candidates.clear();

        assert!(registry.insert(bad).is_err());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_get_missing() {
        let registry = SiteRegistry::new();
        let id = SiteId::new("missing").expect("valid ID");
        assert!(matches!(registry.get(&id), Err(SiteError::NotFound { .. })));
    }

    #[test]
    fn test_get_by_category_sorted() {
        let registry = SiteRegistry::new();
        registry.insert(profile("omega", "buses")).expect("insert");
        registry.insert(profile("copetran", "buses")).expect("insert");
        registry.insert(profile("avianca", "flights")).expect("insert");

        let buses = registry.get_by_category(SiteCategory::Buses);
        let ids: Vec<_> = buses.iter().map(|p| p.id().as_str()).collect();
        assert_eq!(ids, vec!["copetran", "omega"]);
        assert_eq!(registry.get_all().len(), 3);
    }

    #[test]
    fn test_remove() {
        let registry = SiteRegistry::new();
        registry.insert(profile("avianca", "flights")).expect("insert");
        let id = SiteId::new("avianca").expect("valid ID");

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_reload_replaces_cache() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let loader = SiteLoader::new(temp_dir.path()).expect("create loader");
        let registry = SiteRegistry::new();
        registry.insert(profile("stale-site", "other")).expect("insert");

        registry.reload(&loader).expect("reload");
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_bundled_profiles_are_valid() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../site-profiles");
        let loader = SiteLoader::new(dir).expect("bundled profiles dir");
        let registry = SiteRegistry::load_from(&loader).expect("load bundled profiles");

        assert_eq!(registry.count(), 4);
        assert_eq!(registry.get_by_category(SiteCategory::Buses).len(), 2);
    }
}
