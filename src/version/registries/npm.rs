//! npm registry API implementation

use std::collections::HashMap;

use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::DEFAULT_REGISTRY_URL;
use crate::version::error::RegistryError;
use crate::version::registry::Registry;
use crate::version::semver::parse_loose;
use crate::version::types::{Manifest, PackageMetadata, SearchPage};

/// Abbreviated install metadata, falling back to the full document
const ACCEPT_INSTALL: &str =
    "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8, */*";

/// Full document (needed for the `time` record)
const ACCEPT_FULL: &str = "application/json";

/// Full packument, only the keys of `versions`
#[derive(Debug, Deserialize)]
struct NpmVersionListResponse {
    #[serde(default)]
    versions: HashMap<String, IgnoredAny>,
}

/// Full packument, only the `time` record
#[derive(Debug, Deserialize)]
struct NpmTimeResponse {
    #[serde(default)]
    time: HashMap<String, Value>,
}

/// Registry implementation for npm registry API
#[derive(Clone)]
pub struct NpmRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl NpmRegistry {
    /// Creates a new NpmRegistry with a custom base URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("extension-profiler")
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Encode package name for URL (handles scoped packages)
    fn encode_package_name(package_name: &str) -> String {
        if package_name.starts_with('@') {
            // Scoped package: @scope/name -> @scope%2Fname
            package_name.replace('/', "%2F")
        } else {
            package_name.to_string()
        }
    }

    fn package_url(&self, package_name: &str) -> String {
        format!(
            "{}/{}",
            self.base_url,
            Self::encode_package_name(package_name)
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        accept: &str,
        package_name: &str,
    ) -> Result<T, RegistryError> {
        let response = self
            .client
            .get(url)
            .header("Accept", accept)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(package_name.to_string()));
        }

        if !status.is_success() {
            warn!("npm registry returned status {}: {}", status, url);
            return Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        response.json().await.map_err(|e| {
            warn!("Failed to parse npm registry response from {}: {}", url, e);
            RegistryError::InvalidResponse(e.to_string())
        })
    }
}

impl Default for NpmRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_URL)
    }
}

#[async_trait::async_trait]
impl Registry for NpmRegistry {
    async fn search(
        &self,
        text: &str,
        page: usize,
        page_size: usize,
    ) -> Result<SearchPage, RegistryError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/-/v1/search", self.base_url),
            &[
                ("text", text.to_string()),
                ("size", page_size.to_string()),
                ("from", (page * page_size).to_string()),
            ],
        )
        .map_err(|e| RegistryError::InvalidUrl(e.to_string()))?;

        let result: SearchPage = self.get_json(url.as_str(), ACCEPT_FULL, text).await?;
        debug!(
            "Search page {} for {:?}: {} of {} results",
            page,
            text,
            result.objects.len(),
            result.total
        );
        Ok(result)
    }

    async fn fetch_package(&self, package_name: &str) -> Result<PackageMetadata, RegistryError> {
        let url = self.package_url(package_name);
        self.get_json(&url, ACCEPT_INSTALL, package_name).await
    }

    async fn fetch_manifest(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Manifest, RegistryError> {
        let url = format!("{}/{}", self.package_url(package_name), version);
        self.get_json(&url, ACCEPT_INSTALL, package_name).await
    }

    async fn fetch_version_list(&self, package_name: &str) -> Result<Vec<String>, RegistryError> {
        let url = self.package_url(package_name);
        let response: NpmVersionListResponse =
            self.get_json(&url, ACCEPT_FULL, package_name).await?;

        // Sort versions by semver (lowest first, highest last)
        let mut versions: Vec<_> = response
            .versions
            .into_keys()
            .filter_map(|v| parse_loose(&v).map(|parsed| (v, parsed)))
            .collect();

        versions.sort_by(|(_, a), (_, b)| a.cmp(b));

        Ok(versions.into_iter().map(|(v, _)| v).collect())
    }

    async fn fetch_publish_times(
        &self,
        package_name: &str,
    ) -> Result<HashMap<String, String>, RegistryError> {
        let url = self.package_url(package_name);
        let response: NpmTimeResponse = self.get_json(&url, ACCEPT_FULL, package_name).await?;

        // `unpublished` holds an object, not a timestamp
        Ok(response
            .time
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(timestamp) => Some((key, timestamp)),
                _ => None,
            })
            .collect())
    }
}
