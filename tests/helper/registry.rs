//! Registry test utilities

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use extension_profiler::cache::{JsonFileStore, MetadataCache, PublishTimeCache};
use extension_profiler::config::{ProfilerConfig, RegistryConfig};
use extension_profiler::profile::Profiler;
use extension_profiler::version::error::RegistryError;
use extension_profiler::version::registry::Registry;
use extension_profiler::version::types::{Manifest, PackageMetadata, SearchPage};

/// One published version of a fake package
pub struct Release {
    pub version: &'static str,
    pub published: &'static str,
    pub manifest: serde_json::Value,
}

pub fn release(version: &'static str, published: &'static str, manifest: serde_json::Value) -> Release {
    Release {
        version,
        published,
        manifest,
    }
}

/// In-memory registry serving a fixed set of packages
#[derive(Default)]
pub struct InMemoryRegistry {
    packages: HashMap<String, Vec<Release>>,
    extensions: Vec<(String, Vec<String>)>,
    failing: Vec<String>,
    package_fetches: AtomicUsize,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package; the last release is the `latest` dist-tag
    pub fn with_package(mut self, name: &str, releases: Vec<Release>) -> Self {
        self.packages.insert(name.to_string(), releases);
        self
    }

    /// List a package in search results with the given keywords
    pub fn with_extension(mut self, name: &str, keywords: &[&str]) -> Self {
        self.extensions.push((
            name.to_string(),
            keywords.iter().map(|k| k.to_string()).collect(),
        ));
        self
    }

    /// Make every manifest fetch for `name` fail
    pub fn with_failing_package(mut self, name: &str) -> Self {
        self.failing.push(name.to_string());
        self
    }

    pub fn package_fetches(&self) -> usize {
        self.package_fetches.load(Ordering::SeqCst)
    }

    fn releases(&self, name: &str) -> Result<&Vec<Release>, RegistryError> {
        if self.failing.iter().any(|f| f == name) {
            return Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: 500 for {}",
                name
            )));
        }
        self.packages
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    fn latest(&self, name: &str) -> Option<&'static str> {
        self.packages.get(name)?.last().map(|r| r.version)
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn search(
        &self,
        _text: &str,
        page: usize,
        page_size: usize,
    ) -> Result<SearchPage, RegistryError> {
        let objects: Vec<_> = self
            .extensions
            .iter()
            .skip(page * page_size)
            .take(page_size)
            .map(|(name, keywords)| {
                json!({
                    "package": {
                        "name": name,
                        "version": self.latest(name).unwrap_or("0.0.0"),
                        "keywords": keywords
                    }
                })
            })
            .collect();

        Ok(serde_json::from_value(json!({
            "objects": objects,
            "total": self.extensions.len()
        }))
        .unwrap())
    }

    async fn fetch_package(&self, package_name: &str) -> Result<PackageMetadata, RegistryError> {
        self.package_fetches.fetch_add(1, Ordering::SeqCst);
        let releases = self.releases(package_name)?;

        let versions: serde_json::Map<_, _> = releases
            .iter()
            .map(|r| (r.version.to_string(), r.manifest.clone()))
            .collect();
        Ok(serde_json::from_value(json!({
            "dist-tags": {"latest": self.latest(package_name)},
            "versions": versions
        }))
        .unwrap())
    }

    async fn fetch_manifest(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Manifest, RegistryError> {
        let releases = self.releases(package_name)?;
        let version = if version == "latest" {
            self.latest(package_name).unwrap_or_default()
        } else {
            version
        };
        releases
            .iter()
            .find(|r| r.version == version)
            .map(|r| serde_json::from_value(r.manifest.clone()).unwrap())
            .ok_or_else(|| RegistryError::NotFound(format!("{}@{}", package_name, version)))
    }

    async fn fetch_version_list(&self, package_name: &str) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .releases(package_name)?
            .iter()
            .map(|r| r.version.to_string())
            .collect())
    }

    async fn fetch_publish_times(
        &self,
        package_name: &str,
    ) -> Result<HashMap<String, String>, RegistryError> {
        let releases = self.releases(package_name)?;
        let mut times: HashMap<String, String> = releases
            .iter()
            .map(|r| (r.version.to_string(), r.published.to_string()))
            .collect();
        if let Some(first) = releases.first() {
            times.insert("created".to_string(), first.published.to_string());
        }
        Ok(times)
    }
}

/// Profiler over `registry` with JSON caches and output under a temp dir
pub fn create_test_profiler(registry: Arc<InMemoryRegistry>) -> (TempDir, Profiler) {
    let temp_dir = TempDir::new().unwrap();
    let config = ProfilerConfig {
        registry: RegistryConfig {
            page_size: 2,
            ..RegistryConfig::default()
        },
        output_dir: temp_dir.path().join("profile"),
        concurrency: 4,
        ..ProfilerConfig::default()
    };

    let registry: Arc<dyn Registry> = registry;
    let metadata = MetadataCache::load(
        Arc::clone(&registry),
        Box::new(JsonFileStore::new(temp_dir.path().join("metadata-cache.json"))),
    )
    .unwrap();
    let publish_times = PublishTimeCache::load(
        Arc::clone(&registry),
        Box::new(JsonFileStore::new(
            temp_dir.path().join("publish-times-cache.json"),
        )),
    )
    .unwrap();

    let profiler = Profiler::new(&config, registry, metadata, publish_times);
    (temp_dir, profiler)
}

/// Canary packages with releases for the 1.x and 2.x platform lines
pub fn canary_registry() -> InMemoryRegistry {
    InMemoryRegistry::new()
        .with_package(
            "@jupyterlab/application",
            vec![
                release("1.0.0", "2019-06-25T00:00:00.000Z", json!({})),
                release("2.0.0", "2020-03-10T00:00:00.000Z", json!({})),
            ],
        )
        .with_package(
            "@jupyterlab/services",
            vec![
                release("4.0.0", "2019-06-25T00:00:00.000Z", json!({})),
                release("5.0.0-rc.0", "2020-02-20T00:00:00.000Z", json!({})),
                release("5.0.0", "2020-03-10T00:00:00.000Z", json!({})),
            ],
        )
        .with_package(
            "@jupyterlab/coreutils",
            vec![release("3.0.0", "2019-06-25T00:00:00.000Z", json!({}))],
        )
        .with_package(
            "@jupyterlab/rendermime-interfaces",
            vec![release("1.3.0", "2019-06-25T00:00:00.000Z", json!({}))],
        )
        .with_package(
            "@jupyter-widgets/base",
            vec![release("2.0.0", "2019-06-25T00:00:00.000Z", json!({}))],
        )
}
