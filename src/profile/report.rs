//! Aggregation of one dated run into a console summary and a JSON snapshot

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::eras::{UNCLASSIFIED, UNKNOWN_ERA, compare_labels};
use crate::profile::classifier::Classification;
use crate::profile::error::ProfileError;
use crate::version::types::{Dependencies, Manifest};

/// One classified extension as written to a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub name: String,
    /// Version that was classified
    pub version: String,
    /// Era label or `unclassified`
    pub labversion: String,
    pub uptodate: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub peer_dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dev_dependencies: Dependencies,
}

impl ClassificationResult {
    pub fn new(name: &str, version: &str, manifest: &Manifest, classification: Classification) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            labversion: classification
                .era
                .unwrap_or_else(|| UNCLASSIFIED.to_string()),
            uptodate: classification.up_to_date,
            dependencies: manifest.dependencies.clone(),
            peer_dependencies: manifest.peer_dependencies.clone(),
            dev_dependencies: manifest.dev_dependencies.clone(),
        }
    }

    pub fn is_unclassified(&self) -> bool {
        self.labversion == UNCLASSIFIED
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub uptodate_count: usize,
    pub outdated_count: usize,
    /// Era -> number of outdated extensions last supporting it
    pub outdated_count_categorized: BTreeMap<String, usize>,
    /// Names of unclassified extensions
    pub unclassified: Vec<String>,
    /// Label -> number of entries, over every entry
    pub lab_support_counts: BTreeMap<String, usize>,
}

/// Snapshot document for one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: String,
    pub extensions: Vec<ClassificationResult>,
    pub summary: Summary,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ProfileError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Summary derived from `extensions` alone
    pub fn recompute_summary(&self) -> Summary {
        let mut report = SnapshotReport::new(&self.date);
        for entry in &self.extensions {
            report.add(entry.clone());
        }
        report.summary()
    }
}

/// Results of one dated run
#[derive(Debug, Clone, Default)]
pub struct SnapshotReport {
    date: String,
    up_to_date: Vec<String>,
    /// Name -> era, a later entry for the same name wins
    outdated: IndexMap<String, String>,
    unclassified: Vec<String>,
    entries: Vec<ClassificationResult>,
}

impl SnapshotReport {
    pub fn new(date: &str) -> Self {
        Self {
            date: date.to_string(),
            ..Self::default()
        }
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn entries(&self) -> &[ClassificationResult] {
        &self.entries
    }

    pub fn add(&mut self, result: ClassificationResult) {
        if result.uptodate {
            self.up_to_date.push(result.name.clone());
        } else if result.is_unclassified() {
            self.unclassified.push(result.name.clone());
        } else {
            self.outdated
                .insert(result.name.clone(), result.labversion.clone());
        }
        self.entries.push(result);
    }

    pub fn outdated_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for era in self.outdated.values() {
            *counts.entry(era.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn lab_support_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.labversion.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.up_to_date.len() + self.outdated.len() + self.unclassified.len()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            uptodate_count: self.up_to_date.len(),
            outdated_count: self.outdated.len(),
            outdated_count_categorized: self.outdated_counts(),
            unclassified: self.unclassified.clone(),
            lab_support_counts: self.lab_support_counts(),
        }
    }

    /// Human readable summary printed after each run
    pub fn render_summary(&self) -> String {
        let counts = self.outdated_counts();
        let mut eras: Vec<&String> = counts.keys().filter(|era| *era != UNKNOWN_ERA).collect();
        eras.sort_by(|a, b| compare_labels(b, a));

        let mut out = String::new();
        let _ = writeln!(out, "Processed {} extensions:\n", self.total());
        let _ = writeln!(out, "Up to date ({})\n", self.up_to_date.len());
        let _ = write!(out, "Outdated ({}):", self.outdated.len());
        for era in eras {
            let _ = write!(out, "\n  Support ends at v{}.x: {}", era, counts[era]);
        }
        out.push('\n');
        if let Some(unknown) = counts.get(UNKNOWN_ERA) {
            let _ = writeln!(out, "  Unknown last version supported: {}\n", unknown);
        }
        let _ = writeln!(out, "Unclassified ({})", self.unclassified.len());
        out
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            date: self.date.clone(),
            extensions: self.entries.clone(),
            summary: self.summary(),
        }
    }

    /// Write the snapshot as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ProfileError> {
        let io_error = |source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let content =
            serde_json::to_string_pretty(&self.to_snapshot()).map_err(|source| ProfileError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        std::fs::write(path, content).map_err(io_error)
    }
}
