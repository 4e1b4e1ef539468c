//! Registry trait for read-only package queries

use std::collections::HashMap;

#[cfg(test)]
use mockall::automock;

use crate::version::error::RegistryError;
use crate::version::types::{Manifest, PackageMetadata, SearchPage};

/// Trait for querying a package registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Search packages by free text
    ///
    /// # Arguments
    /// * `text` - Query text (e.g., `keywords:"jupyterlab-extension"`)
    /// * `page` - Zero-based page index
    /// * `page_size` - Number of results per page
    async fn search(
        &self,
        text: &str,
        page: usize,
        page_size: usize,
    ) -> Result<SearchPage, RegistryError>;

    /// Fetches dist-tags and the manifests of every published version
    async fn fetch_package(&self, package_name: &str) -> Result<PackageMetadata, RegistryError>;

    /// Fetches the manifest of a single version (or dist-tag such as `latest`)
    async fn fetch_manifest(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Manifest, RegistryError>;

    /// Fetches the authoritative list of published versions
    async fn fetch_version_list(&self, package_name: &str) -> Result<Vec<String>, RegistryError>;

    /// Fetches the raw publish-time record
    ///
    /// # Returns
    /// * `Ok(HashMap)` - version (or sentinel such as `created`/`modified`) -> timestamp
    /// * `Err(RegistryError)` - If the fetch fails
    async fn fetch_publish_times(
        &self,
        package_name: &str,
    ) -> Result<HashMap<String, String>, RegistryError>;
}
