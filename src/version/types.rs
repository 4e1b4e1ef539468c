//! Registry data shapes shared by the caches, resolver and classifier

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::version::semver::max_satisfying;

/// Dist-tag / pseudo-version that always refers to the newest release
pub const LATEST: &str = "latest";

/// Publish timestamps keyed by version (ISO-8601 strings as served by the registry)
pub type PublishTimes = BTreeMap<String, String>;

/// Dependency name -> declared range (or the literal `latest`)
pub type Dependencies = IndexMap<String, String>;

/// The dependency sections of a published package.json
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(
        default,
        deserialize_with = "lenient_dependencies",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub dependencies: Dependencies,
    #[serde(
        default,
        deserialize_with = "lenient_dependencies",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub peer_dependencies: Dependencies,
    #[serde(
        default,
        deserialize_with = "lenient_dependencies",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub dev_dependencies: Dependencies,
}

impl Manifest {
    /// Merged dependency view.
    ///
    /// Precedence: `dependencies` < `peerDependencies` < `devDependencies`,
    /// a later section overrides the range declared by an earlier one.
    pub fn effective_dependencies(&self) -> Dependencies {
        let mut merged = self.dependencies.clone();
        for (name, range) in self
            .peer_dependencies
            .iter()
            .chain(self.dev_dependencies.iter())
        {
            merged.insert(name.clone(), range.clone());
        }
        merged
    }
}

/// Accept any JSON for a dependency section, keeping only string-valued entries.
///
/// Published manifests occasionally carry arrays or nested objects here; those
/// are treated as empty so the package ends up unclassified instead of failing.
fn lenient_dependencies<'de, D>(deserializer: D) -> Result<Dependencies, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Object(map) = value else {
        return Ok(Dependencies::new());
    };

    Ok(map
        .into_iter()
        .filter_map(|(name, range)| match range {
            Value::String(range) => Some((name, range)),
            _ => None,
        })
        .collect())
}

/// All published manifests of a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub versions: BTreeMap<String, Manifest>,
    #[serde(rename = "maxVersion", default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<String>,
}

impl PackageMetadata {
    /// Version the `latest` dist-tag points at
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get(LATEST).map(String::as_str)
    }

    /// Resolve a version or the `latest` pseudo-version to a published version
    pub fn resolve<'a>(&'a self, version: &'a str) -> Option<&'a str> {
        if version == LATEST {
            self.latest()
        } else {
            Some(version)
        }
    }

    pub fn manifest(&self, version: &str) -> Option<&Manifest> {
        self.versions.get(self.resolve(version)?)
    }

    /// Fill in `max_version` from the published versions
    pub fn with_max_version(mut self) -> Self {
        self.max_version = max_satisfying(self.versions.keys(), "*");
        self
    }
}

/// One page of registry search results
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub objects: Vec<SearchObject>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchObject {
    pub package: Extension,
}

/// An extension package as listed in search results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Extension {
    pub fn is_deprecated(&self) -> bool {
        self.keywords.iter().any(|k| k == "deprecated")
    }
}
