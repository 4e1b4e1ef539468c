//! Temporal version resolution
//!
//! Answers "which version of this package was the newest one published
//! before a given date" from a publish timeline and the package metadata.

use chrono::{DateTime, Utc};
use semver::Version;

use crate::version::semver::{is_prerelease, parse_loose, sort_descending};
use crate::version::types::{PackageMetadata, PublishTimes};

/// Candidate versions that can be classified, highest first
///
/// Keeps versions that parse, are not prereleases, and have a manifest in
/// `metadata`. Anything else is dropped silently.
pub fn valid_versions<I, S>(candidates: I, metadata: &PackageMetadata) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    sort_descending(candidates)
        .into_iter()
        .filter(|version| {
            parse_loose(version).is_some_and(|parsed| !is_prerelease(&parsed))
                && metadata.versions.contains_key(version)
        })
        .collect()
}

/// Newest version published strictly before `date`
///
/// `versions_desc` must be sorted highest first. With a `ceiling`, versions
/// above it are skipped. `None` means nothing qualifying existed yet.
pub fn newest_before(
    date: DateTime<Utc>,
    versions_desc: &[String],
    times: &PublishTimes,
    ceiling: Option<&Version>,
) -> Option<String> {
    versions_desc
        .iter()
        .find(|version| {
            if let Some(ceiling) = ceiling
                && !parse_loose(version).is_some_and(|parsed| &parsed <= ceiling)
            {
                return false;
            }

            times
                .get(version.as_str())
                .and_then(|timestamp| DateTime::parse_from_rfc3339(timestamp).ok())
                .is_some_and(|published| published.with_timezone(&Utc) < date)
        })
        .cloned()
}
