//! Package metadata cache
//!
//! Keeps the manifests of every published version per package name. A lookup
//! refetches the whole package when it is unknown, when the requested version
//! is missing, or when `latest` is requested.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::cache::store::{CacheDocument, CacheStore};
use crate::version::error::CacheError;
use crate::version::registry::Registry;
use crate::version::types::{LATEST, Manifest, PackageMetadata};

pub struct MetadataCache {
    registry: Arc<dyn Registry>,
    store: Box<dyn CacheStore>,
    entries: Mutex<HashMap<String, Arc<PackageMetadata>>>,
}

impl MetadataCache {
    /// Create the cache and load the persisted document
    ///
    /// Entries that no longer deserialize are dropped with a warning.
    pub fn load(registry: Arc<dyn Registry>, store: Box<dyn CacheStore>) -> Result<Self, CacheError> {
        let document = store.load()?;

        let mut entries = HashMap::with_capacity(document.len());
        for (name, value) in document {
            match serde_json::from_value::<PackageMetadata>(value) {
                Ok(metadata) => {
                    entries.insert(name, Arc::new(metadata));
                }
                Err(e) => warn!("Dropping cached metadata for {}: {}", name, e),
            }
        }

        info!(
            "Loaded metadata for {} packages from {}",
            entries.len(),
            store.location()
        );

        Ok(Self {
            registry,
            store,
            entries: Mutex::new(entries),
        })
    }

    fn lock_entries(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, Arc<PackageMetadata>>>, CacheError> {
        self.entries.lock().map_err(|_| CacheError::LockPoisoned)
    }

    /// Package metadata that contains `version`, refetching when needed
    ///
    /// Does not fail when the version is still missing after the refetch;
    /// use [`MetadataCache::get`] for that.
    pub async fn get_package(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Arc<PackageMetadata>, CacheError> {
        if version != LATEST {
            let entries = self.lock_entries()?;
            if let Some(metadata) = entries.get(package_name) {
                if metadata.versions.contains_key(version) {
                    return Ok(Arc::clone(metadata));
                }
                debug!(
                    "{}@{} missing from cached metadata",
                    package_name, version
                );
            }
        }

        debug!("Requesting {} metadata", package_name);
        let metadata = Arc::new(
            self.registry
                .fetch_package(package_name)
                .await?
                .with_max_version(),
        );

        self.lock_entries()?
            .insert(package_name.to_string(), Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Manifest of `package_name@version` (`version` may be `latest`)
    pub async fn get(&self, package_name: &str, version: &str) -> Result<Manifest, CacheError> {
        let metadata = self.get_package(package_name, version).await?;

        metadata
            .manifest(version)
            .cloned()
            .ok_or_else(|| CacheError::VersionNotFound {
                name: package_name.to_string(),
                version: metadata.resolve(version).unwrap_or(version).to_string(),
            })
    }

    /// Persist every entry, replacing the stored document
    pub fn save(&self) -> Result<(), CacheError> {
        let document = {
            let entries = self.lock_entries()?;
            entries
                .iter()
                .map(|(name, metadata)| Ok((name.clone(), serde_json::to_value(&**metadata)?)))
                .collect::<Result<CacheDocument, CacheError>>()?
        };

        self.store.save(&document)?;
        info!(
            "Saved metadata for {} packages to {}",
            document.len(),
            self.store.location()
        );
        Ok(())
    }
}
