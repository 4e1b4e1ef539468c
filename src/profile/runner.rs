//! Batch orchestration: extension discovery, backfill over dates, current snapshot

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use futures::{StreamExt, TryStreamExt, future, stream};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::cache::{MetadataCache, PublishTimeCache};
use crate::config::ProfilerConfig;
use crate::eras::EraTable;
use crate::profile::classifier::{CurrentRanges, classify};
use crate::profile::error::ProfileError;
use crate::profile::report::{ClassificationResult, SnapshotReport};
use crate::version::error::CacheError;
use crate::version::registry::Registry;
use crate::version::resolver::{newest_before, valid_versions};
use crate::version::semver::parse_loose;
use crate::version::types::{Extension, LATEST, PublishTimes};

/// Publish history of one canary package
#[derive(Debug, Clone, Default)]
pub struct CanaryTimeline {
    /// Valid versions, highest first
    pub versions: Vec<String>,
    pub times: PublishTimes,
}

pub type CanaryTimelines = IndexMap<String, CanaryTimeline>;

pub struct Profiler {
    registry: Arc<dyn Registry>,
    metadata: MetadataCache,
    publish_times: PublishTimeCache,
    table: EraTable,
    search_text: String,
    page_size: usize,
    concurrency: usize,
    output_dir: PathBuf,
}

impl Profiler {
    pub fn new(
        config: &ProfilerConfig,
        registry: Arc<dyn Registry>,
        metadata: MetadataCache,
        publish_times: PublishTimeCache,
    ) -> Self {
        Self {
            registry,
            metadata,
            publish_times,
            table: config.compatibility.clone(),
            search_text: config.registry.search_text(),
            page_size: config.registry.page_size.max(1),
            concurrency: config.concurrency.max(1),
            output_dir: config.output_dir.clone(),
        }
    }

    pub fn snapshot_path(&self, date: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", date))
    }

    /// Persist both caches
    pub fn save_caches(&self) -> Result<(), ProfileError> {
        self.metadata.save()?;
        self.publish_times.save()?;
        Ok(())
    }

    /// Every extension currently listed by the registry search
    pub async fn collect_extensions(&self) -> Result<Vec<Extension>, ProfileError> {
        let mut extensions = Vec::new();
        let mut page = 0;

        loop {
            let result = self
                .registry
                .search(&self.search_text, page, self.page_size)
                .await?;
            if result.objects.is_empty() {
                break;
            }
            extensions.extend(result.objects.into_iter().map(|object| object.package));
            page += 1;
        }

        info!("Found {} extensions", extensions.len());
        Ok(extensions)
    }

    /// Publish history of every canary, resolved once per backfill
    pub async fn canary_timelines(&self) -> Result<CanaryTimelines, ProfileError> {
        let mut timelines = CanaryTimelines::new();

        for canary in self.table.canaries() {
            let metadata = self.metadata.get_package(canary, LATEST).await?;
            let Some(latest) = metadata.latest() else {
                warn!("{} has no latest dist-tag, skipping", canary);
                continue;
            };

            let times = self.publish_times.get(canary, latest).await?;
            let versions = valid_versions(times.keys(), &metadata);
            debug!("{}: {} dated versions", canary, versions.len());
            timelines.insert(canary.clone(), CanaryTimeline { versions, times });
        }

        Ok(timelines)
    }

    /// `^<newest canary version published before date>` per canary
    ///
    /// Canaries with no release before `date` are left out.
    pub fn current_ranges_at(&self, date: DateTime<Utc>, timelines: &CanaryTimelines) -> CurrentRanges {
        timelines
            .iter()
            .filter_map(|(canary, timeline)| {
                let version = newest_before(date, &timeline.versions, &timeline.times, None);
                if version.is_none() {
                    debug!("No release of {} before {}", canary, date);
                }
                version.map(|v| (canary.clone(), format!("^{}", v)))
            })
            .collect()
    }

    /// `^<dist-tags.latest>` per canary
    pub async fn current_ranges_now(&self) -> Result<CurrentRanges, ProfileError> {
        let mut ranges = CurrentRanges::new();
        for canary in self.table.canaries() {
            let metadata = self.metadata.get_package(canary, LATEST).await?;
            match metadata.latest() {
                Some(latest) => {
                    ranges.insert(canary.clone(), format!("^{}", latest));
                }
                None => warn!("{} has no latest dist-tag, skipping", canary),
            }
        }
        Ok(ranges)
    }

    /// Classify the version of `extension` that was current at `date`
    ///
    /// `None` when no qualifying version had been published yet.
    async fn classify_at(
        &self,
        extension: &Extension,
        date: DateTime<Utc>,
        current: &CurrentRanges,
    ) -> Result<Option<ClassificationResult>, CacheError> {
        let Some(ceiling) = parse_loose(&extension.version) else {
            debug!(
                "Skipping {}: invalid version {:?}",
                extension.name, extension.version
            );
            return Ok(None);
        };

        let times = self
            .publish_times
            .get(&extension.name, &extension.version)
            .await?;
        let metadata = self
            .metadata
            .get_package(&extension.name, &extension.version)
            .await?;
        let versions = valid_versions(times.keys(), &metadata);

        let Some(version) = newest_before(date, &versions, &times, Some(&ceiling)) else {
            return Ok(None);
        };

        let manifest = self.metadata.get(&extension.name, &version).await?;
        let classification = classify(&manifest.effective_dependencies(), current, &self.table);
        Ok(Some(ClassificationResult::new(
            &extension.name,
            &version,
            &manifest,
            classification,
        )))
    }

    /// Classify every extension as of `date`
    ///
    /// The first failure aborts the whole date.
    pub async fn snapshot_for_date(
        &self,
        date: NaiveDate,
        extensions: &[Extension],
        timelines: &CanaryTimelines,
    ) -> Result<SnapshotReport, ProfileError> {
        let at = date.and_time(NaiveTime::default()).and_utc();
        let current = self.current_ranges_at(at, timelines);
        debug!("Current canary ranges at {}: {:?}", date, current);

        let results: Vec<Option<ClassificationResult>> = stream::iter(
            extensions
                .iter()
                .filter(|extension| !extension.is_deprecated()),
        )
        .map(|extension| {
            let current = &current;
            async move {
                self.classify_at(extension, at, current)
                    .await
                    .map_err(|source| ProfileError::Package {
                        name: extension.name.clone(),
                        source,
                    })
            }
        })
        .buffered(self.concurrency)
        .try_collect()
        .await?;

        let mut report = SnapshotReport::new(&date.to_string());
        for result in results.into_iter().flatten() {
            report.add(result);
        }
        Ok(report)
    }

    /// Write one snapshot per sampled date from `start` through `stop`
    ///
    /// Stops at the first failing date; snapshots already written are kept.
    pub async fn backfill(
        &self,
        start: NaiveDate,
        stop: NaiveDate,
        step_days: u32,
    ) -> Result<Vec<PathBuf>, ProfileError> {
        let extensions = self.collect_extensions().await?;
        let timelines = self.canary_timelines().await?;
        let step = Days::new(u64::from(step_days.max(1)));

        let mut written = Vec::new();
        let mut date = start;
        while date <= stop {
            info!("Processing {}", date);
            let report = self.snapshot_for_date(date, &extensions, &timelines).await?;
            println!("{}", report.render_summary());

            let path = self.snapshot_path(report.date());
            report.save(&path)?;
            written.push(path);

            match date.checked_add_days(step) {
                Some(next) => date = next,
                None => break,
            }
        }

        Ok(written)
    }

    async fn classify_latest(
        &self,
        extensions: &[Extension],
        current: &CurrentRanges,
    ) -> Result<Vec<ClassificationResult>, ProfileError> {
        stream::iter(
            extensions
                .iter()
                .filter(|extension| !extension.is_deprecated()),
        )
        .map(|extension| async move {
            let manifest = self
                .metadata
                .get(&extension.name, &extension.version)
                .await
                .map_err(|source| ProfileError::Package {
                    name: extension.name.clone(),
                    source,
                })?;
            let deps = manifest.effective_dependencies();
            let classification = classify(&deps, current, &self.table);
            if classification.era.is_none() {
                debug!("Could not classify {}: {:?}", extension.name, deps);
            }
            Ok::<_, ProfileError>(ClassificationResult::new(
                &extension.name,
                &extension.version,
                &manifest,
                classification,
            ))
        })
        .buffered(self.concurrency)
        .try_collect()
        .await
    }

    /// Classify the currently tagged version of every extension
    ///
    /// The next search page is requested while the current one is classified.
    pub async fn profile_now(&self, today: NaiveDate) -> Result<PathBuf, ProfileError> {
        let current = self.current_ranges_now().await?;
        debug!("Current canary ranges: {:?}", current);

        let mut report = SnapshotReport::new(&today.to_string());
        let mut page = 0;
        let mut objects = self
            .registry
            .search(&self.search_text, page, self.page_size)
            .await?
            .objects;

        while !objects.is_empty() {
            page += 1;
            let extensions: Vec<Extension> = objects.into_iter().map(|o| o.package).collect();
            let (next_page, results) = future::join(
                self.registry
                    .search(&self.search_text, page, self.page_size),
                self.classify_latest(&extensions, &current),
            )
            .await;

            for result in results? {
                report.add(result);
            }
            objects = next_page?.objects;
        }

        println!("{}", report.render_summary());
        let path = self.snapshot_path(report.date());
        report.save(&path)?;
        Ok(path)
    }

    /// Classify one `name[@version]` against the current canary ranges
    pub async fn inspect(&self, package: &str) -> Result<ClassificationResult, ProfileError> {
        let (name, requested) = split_package_spec(package);
        let current = self.current_ranges_now().await?;

        let version = if requested == LATEST {
            let metadata = self.metadata.get_package(name, LATEST).await?;
            metadata
                .latest()
                .map(str::to_string)
                .ok_or_else(|| ProfileError::InvalidVersion(package.to_string()))?
        } else {
            requested.to_string()
        };

        let manifest = self.registry.fetch_manifest(name, &version).await?;
        let classification = classify(&manifest.effective_dependencies(), &current, &self.table);
        Ok(ClassificationResult::new(
            name,
            &version,
            &manifest,
            classification,
        ))
    }
}

/// `name@version` -> (`name`, `version`), defaulting to `latest`
fn split_package_spec(spec: &str) -> (&str, &str) {
    match spec.rsplit_once('@') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => (name, version),
        _ => (spec, LATEST),
    }
}
