//! Publish-time cache
//!
//! One timeline of `version -> timestamp` per package name. The timeline
//! remembers the reference version it was last refreshed for; a lookup for a
//! newer reference refetches and appends the versions published since.

use std::collections::{HashMap, hash_map::Entry};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::store::{CacheDocument, CacheStore};
use crate::version::error::CacheError;
use crate::version::registry::Registry;
use crate::version::semver::parse_loose;
use crate::version::types::PublishTimes;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTimeline {
    /// Version the timeline was last refreshed for
    pub reference: String,
    pub times: PublishTimes,
}

impl PublishTimeline {
    fn covers(&self, reference: &str) -> bool {
        self.reference == reference || self.times.contains_key(reference)
    }

    /// Add versions not yet known; returns how many were added
    fn append(&mut self, times: PublishTimes) -> usize {
        let before = self.times.len();
        for (version, timestamp) in times {
            self.times.entry(version).or_insert(timestamp);
        }
        self.times.len() - before
    }

    /// Keep the higher of the two references
    fn raise_reference(&mut self, reference: &str) {
        let newer = match (parse_loose(&self.reference), parse_loose(reference)) {
            (Some(current), Some(candidate)) => candidate > current,
            (None, _) => true,
            (Some(_), None) => false,
        };
        if newer {
            self.reference = reference.to_string();
        }
    }
}

pub struct PublishTimeCache {
    registry: Arc<dyn Registry>,
    store: Box<dyn CacheStore>,
    entries: Mutex<HashMap<String, PublishTimeline>>,
}

impl PublishTimeCache {
    /// Create the cache and load the persisted document
    ///
    /// Documents written with `name@version` keys are folded into one
    /// timeline per name.
    pub fn load(registry: Arc<dyn Registry>, store: Box<dyn CacheStore>) -> Result<Self, CacheError> {
        let document = store.load()?;

        let mut entries: HashMap<String, PublishTimeline> = HashMap::new();
        let mut migrated = 0;
        for (key, value) in document {
            if let Ok(timeline) = serde_json::from_value::<PublishTimeline>(value.clone()) {
                match entries.entry(key) {
                    Entry::Occupied(mut existing) => {
                        let existing = existing.get_mut();
                        existing.append(timeline.times);
                        existing.raise_reference(&timeline.reference);
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(timeline);
                    }
                }
                continue;
            }

            let legacy = split_legacy_key(&key)
                .and_then(|(name, reference)| {
                    serde_json::from_value::<HashMap<String, Option<String>>>(value)
                        .ok()
                        .map(|times| (name, reference, times))
                });
            let Some((name, reference, times)) = legacy else {
                warn!("Dropping cached publish times for {}", key);
                continue;
            };

            let timeline = entries.entry(name.to_string()).or_default();
            timeline.append(
                times
                    .into_iter()
                    .filter_map(|(version, timestamp)| Some((version, timestamp?)))
                    .collect(),
            );
            timeline.raise_reference(reference);
            migrated += 1;
        }

        if migrated > 0 {
            info!("Migrated {} legacy publish-time entries", migrated);
        }
        info!(
            "Loaded publish times for {} packages from {}",
            entries.len(),
            store.location()
        );

        Ok(Self {
            registry,
            store,
            entries: Mutex::new(entries),
        })
    }

    fn lock_entries(&self) -> Result<MutexGuard<'_, HashMap<String, PublishTimeline>>, CacheError> {
        self.entries.lock().map_err(|_| CacheError::LockPoisoned)
    }

    /// Publish times of every known version of `package_name`
    ///
    /// `reference` is the newest version the caller needs a timestamp for.
    pub async fn get(&self, package_name: &str, reference: &str) -> Result<PublishTimes, CacheError> {
        {
            let entries = self.lock_entries()?;
            if let Some(timeline) = entries.get(package_name)
                && timeline.covers(reference)
            {
                return Ok(timeline.times.clone());
            }
        }

        debug!("Getting publish times for {}@{}", package_name, reference);
        let (versions, raw_times) = tokio::try_join!(
            self.registry.fetch_version_list(package_name),
            self.registry.fetch_publish_times(package_name),
        )?;
        let fetched = filter_publish_times(&versions, &raw_times);

        let mut entries = self.lock_entries()?;
        let timeline = entries.entry(package_name.to_string()).or_default();
        let added = timeline.append(fetched);
        timeline.raise_reference(reference);
        debug!("{} new publish times for {}", added, package_name);

        Ok(timeline.times.clone())
    }

    /// Persist every timeline, replacing the stored document
    pub fn save(&self) -> Result<(), CacheError> {
        let document = {
            let entries = self.lock_entries()?;
            entries
                .iter()
                .map(|(name, timeline)| Ok((name.clone(), serde_json::to_value(timeline)?)))
                .collect::<Result<CacheDocument, CacheError>>()?
        };

        self.store.save(&document)?;
        info!(
            "Saved publish times for {} packages to {}",
            document.len(),
            self.store.location()
        );
        Ok(())
    }
}

/// Keep timestamps of versions present in the authoritative version list
///
/// Drops sentinel keys such as `created` and `modified`.
pub fn filter_publish_times(versions: &[String], raw_times: &HashMap<String, String>) -> PublishTimes {
    versions
        .iter()
        .filter_map(|version| {
            raw_times
                .get(version)
                .map(|timestamp| (version.clone(), timestamp.clone()))
        })
        .collect()
}

/// `name@version` -> (`name`, `version`); scoped names keep their leading `@`
fn split_legacy_key(key: &str) -> Option<(&str, &str)> {
    key.rsplit_once('@')
        .filter(|(name, version)| !name.is_empty() && !version.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::JsonFileStore;
    use crate::version::registry::MockRegistry;
    use rstest::rstest;
    use tempfile::TempDir;

    fn raw_times(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn versions(list: &[&str]) -> Vec<String> {
        list.iter().map(|v| v.to_string()).collect()
    }

    fn create_cache(registry: MockRegistry) -> (TempDir, PublishTimeCache) {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("publish-times.json"));
        let cache = PublishTimeCache::load(Arc::new(registry), Box::new(store)).unwrap();
        (temp_dir, cache)
    }

    #[test]
    fn filter_publish_times_keeps_only_listed_versions() {
        let result = filter_publish_times(
            &versions(&["1.0.0", "1.1.0", "2.0.0"]),
            &raw_times(&[
                ("created", "2019-01-01T00:00:00.000Z"),
                ("modified", "2020-06-01T00:00:00.000Z"),
                ("1.0.0", "2019-01-01T00:00:00.000Z"),
                ("1.1.0", "2019-05-01T00:00:00.000Z"),
                ("0.9.0", "2018-12-01T00:00:00.000Z"),
            ]),
        );

        assert_eq!(
            result.keys().collect::<Vec<_>>(),
            vec!["1.0.0", "1.1.0"]
        );
    }

    #[rstest]
    #[case("jupyterlab-drawio@0.9.0", Some(("jupyterlab-drawio", "0.9.0")))]
    #[case("@jupyterlab/services@5.0.0", Some(("@jupyterlab/services", "5.0.0")))]
    #[case("@jupyterlab/services", None)]
    #[case("jupyterlab-drawio", None)]
    #[case("jupyterlab-drawio@", None)]
    fn split_legacy_key_returns_expected(
        #[case] key: &str,
        #[case] expected: Option<(&str, &str)>,
    ) {
        assert_eq!(split_legacy_key(key), expected);
    }

    #[tokio::test]
    async fn get_fetches_once_for_same_reference() {
        let mut registry = MockRegistry::new();
        registry
            .expect_fetch_version_list()
            .withf(|name| name == "@jupyterlab/services")
            .times(1)
            .returning(|_| Ok(versions(&["4.0.0", "5.0.0"])));
        registry
            .expect_fetch_publish_times()
            .withf(|name| name == "@jupyterlab/services")
            .times(1)
            .returning(|_| {
                Ok(raw_times(&[
                    ("created", "2019-06-01T00:00:00.000Z"),
                    ("4.0.0", "2019-06-01T00:00:00.000Z"),
                    ("5.0.0", "2020-02-01T00:00:00.000Z"),
                ]))
            });
        let (_temp_dir, cache) = create_cache(registry);

        let first = cache.get("@jupyterlab/services", "5.0.0").await.unwrap();
        let second = cache.get("@jupyterlab/services", "5.0.0").await.unwrap();
        let older = cache.get("@jupyterlab/services", "4.0.0").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, older);
        assert_eq!(first.len(), 2);
        assert!(!first.contains_key("created"));
    }

    #[tokio::test]
    async fn get_appends_versions_for_newer_reference() {
        let mut registry = MockRegistry::new();
        let mut list_calls = 0;
        registry
            .expect_fetch_version_list()
            .times(2)
            .returning(move |_| {
                list_calls += 1;
                Ok(if list_calls == 1 {
                    versions(&["1.0.0"])
                } else {
                    versions(&["1.0.0", "1.1.0"])
                })
            });
        let mut time_calls = 0;
        registry
            .expect_fetch_publish_times()
            .times(2)
            .returning(move |_| {
                time_calls += 1;
                Ok(if time_calls == 1 {
                    raw_times(&[("1.0.0", "2019-01-01T00:00:00.000Z")])
                } else {
                    // Registry rewrote the older timestamp; the cached one wins
                    raw_times(&[
                        ("1.0.0", "2021-01-01T00:00:00.000Z"),
                        ("1.1.0", "2019-03-01T00:00:00.000Z"),
                    ])
                })
            });
        let (_temp_dir, cache) = create_cache(registry);

        cache.get("jupyterlab-git", "1.0.0").await.unwrap();
        let times = cache.get("jupyterlab-git", "1.1.0").await.unwrap();

        assert_eq!(times["1.0.0"], "2019-01-01T00:00:00.000Z");
        assert_eq!(times["1.1.0"], "2019-03-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn get_keeps_newest_reference_after_older_lookup() {
        let mut registry = MockRegistry::new();
        registry
            .expect_fetch_version_list()
            .times(2)
            .returning(|_| Ok(versions(&["1.0.0", "1.1.0"])));
        registry
            .expect_fetch_publish_times()
            .times(2)
            .returning(|_| {
                Ok(raw_times(&[
                    ("1.0.0", "2019-01-01T00:00:00.000Z"),
                    ("1.1.0", "2019-03-01T00:00:00.000Z"),
                ]))
            });
        let (_temp_dir, cache) = create_cache(registry);

        cache.get("jupyterlab-git", "1.1.0").await.unwrap();
        // Unknown to the registry, so it refetches without covering anything new
        cache.get("jupyterlab-git", "0.9.0").await.unwrap();

        assert_eq!(
            cache.lock_entries().unwrap()["jupyterlab-git"].reference,
            "1.1.0"
        );
    }

    #[test]
    fn load_starts_empty_from_truncated_legacy_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("_pkgTimesCache.json");
        std::fs::write(
            &path,
            r#"{"jupyterlab-git@1.0.0": {"1.0.0": "2019-01-01T0"#,
        )
        .unwrap();

        let cache = PublishTimeCache::load(
            Arc::new(MockRegistry::new()),
            Box::new(JsonFileStore::new(&path)),
        )
        .unwrap();

        assert!(cache.lock_entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_migrates_legacy_versioned_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("publish-times.json");
        std::fs::write(
            &path,
            r#"{
                "jupyterlab-git@1.0.0": {"1.0.0": "2019-01-01T00:00:00.000Z"},
                "jupyterlab-git@1.1.0": {
                    "1.0.0": "2019-01-01T00:00:00.000Z",
                    "1.1.0": "2019-03-01T00:00:00.000Z"
                },
                "@jupyterlab/services@5.0.0": {"5.0.0": "2020-02-01T00:00:00.000Z", "4.0.0": null}
            }"#,
        )
        .unwrap();

        // No expectations: any fetch would panic
        let cache = PublishTimeCache::load(
            Arc::new(MockRegistry::new()),
            Box::new(JsonFileStore::new(&path)),
        )
        .unwrap();

        let git = cache.get("jupyterlab-git", "1.1.0").await.unwrap();
        let services = cache.get("@jupyterlab/services", "5.0.0").await.unwrap();

        assert_eq!(git.len(), 2);
        assert_eq!(services.len(), 1);
        assert_eq!(
            cache.lock_entries().unwrap()["jupyterlab-git"].reference,
            "1.1.0"
        );
    }

    #[tokio::test]
    async fn save_and_load_round_trips_timelines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("publish-times.json");

        let mut registry = MockRegistry::new();
        registry
            .expect_fetch_version_list()
            .times(1)
            .returning(|_| Ok(versions(&["0.9.0"])));
        registry
            .expect_fetch_publish_times()
            .times(1)
            .returning(|_| Ok(raw_times(&[("0.9.0", "2020-01-01T00:00:00.000Z")])));
        let cache =
            PublishTimeCache::load(Arc::new(registry), Box::new(JsonFileStore::new(&path))).unwrap();
        cache.get("jupyterlab-drawio", "0.9.0").await.unwrap();
        cache.save().unwrap();

        let reloaded = PublishTimeCache::load(
            Arc::new(MockRegistry::new()),
            Box::new(JsonFileStore::new(&path)),
        )
        .unwrap();
        let times = reloaded.get("jupyterlab-drawio", "0.9.0").await.unwrap();

        assert_eq!(times["0.9.0"], "2020-01-01T00:00:00.000Z");
    }
}
