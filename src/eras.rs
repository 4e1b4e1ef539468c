//! Canary packages and the table of known platform eras
//!
//! A canary is a core JupyterLab package whose declared range tells which
//! JupyterLab release an extension supports. An era maps each canary to the
//! range that was compatible with one historical major release line.

use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Label of extensions no era could be matched for
pub const UNCLASSIFIED: &str = "unclassified";

/// Synthetic era bucket reported apart from the per-era table
pub const UNKNOWN_ERA: &str = "unknown";

/// Canary name -> range string
pub type EraRanges = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EraTableDef")]
pub struct EraTable {
    canaries: Vec<String>,
    /// Sorted most recent first
    eras: IndexMap<String, EraRanges>,
}

#[derive(Deserialize)]
struct EraTableDef {
    canaries: Vec<String>,
    eras: IndexMap<String, EraRanges>,
}

impl From<EraTableDef> for EraTable {
    fn from(def: EraTableDef) -> Self {
        Self::new(def.canaries, def.eras)
    }
}

impl EraTable {
    pub fn new(canaries: Vec<String>, mut eras: IndexMap<String, EraRanges>) -> Self {
        eras.sort_by(|a, _, b, _| compare_labels(b, a));
        Self { canaries, eras }
    }

    /// Canary package names in declaration order
    pub fn canaries(&self) -> &[String] {
        &self.canaries
    }

    /// Eras, most recent first
    pub fn eras(&self) -> impl Iterator<Item = (&str, &EraRanges)> {
        self.eras.iter().map(|(label, ranges)| (label.as_str(), ranges))
    }

    pub fn era_range(&self, era: &str, canary: &str) -> Option<&str> {
        self.eras.get(era)?.get(canary).map(String::as_str)
    }
}

impl Default for EraTable {
    /// JupyterLab 0.x, 1.x and 2.x
    fn default() -> Self {
        let era = |ranges: [(&str, &str); 5]| -> EraRanges {
            ranges
                .into_iter()
                .map(|(canary, range)| (canary.to_string(), range.to_string()))
                .collect()
        };

        Self::new(
            vec![
                "@jupyterlab/application".to_string(),
                "@jupyterlab/coreutils".to_string(),
                "@jupyterlab/rendermime-interfaces".to_string(),
                "@jupyterlab/services".to_string(),
                "@jupyter-widgets/base".to_string(),
            ],
            IndexMap::from([
                (
                    "0".to_string(),
                    era([
                        ("@jupyterlab/application", "<1"),
                        ("@jupyterlab/coreutils", "<3"),
                        ("@jupyterlab/rendermime-interfaces", "<1.3"),
                        ("@jupyterlab/services", "<4"),
                        ("@jupyter-widgets/base", "^1"),
                    ]),
                ),
                (
                    "1".to_string(),
                    era([
                        ("@jupyterlab/application", "^1"),
                        ("@jupyterlab/coreutils", "^3"),
                        ("@jupyterlab/rendermime-interfaces", "^1.3"),
                        ("@jupyterlab/services", "^4"),
                        ("@jupyter-widgets/base", "^2"),
                    ]),
                ),
                (
                    "2".to_string(),
                    era([
                        ("@jupyterlab/application", "^2"),
                        ("@jupyterlab/coreutils", "^4"),
                        ("@jupyterlab/rendermime-interfaces", "^2"),
                        ("@jupyterlab/services", "^5"),
                        ("@jupyter-widgets/base", "^3"),
                    ]),
                ),
            ]),
        )
    }
}

/// Leading integer of an era label ("2" -> 2, "10-beta" -> 10)
pub fn era_ordinal(label: &str) -> Option<i64> {
    let trimmed = label.trim_start();
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(trimmed.len(), |(i, _)| i);
    trimmed[..end].parse().ok()
}

/// Order era labels numerically; labels without a number sort before numbered ones.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    era_ordinal(a).cmp(&era_ordinal(b)).then_with(|| a.cmp(b))
}

/// The older of two era labels
pub fn older_era<'a>(a: &'a str, b: &'a str) -> &'a str {
    match (era_ordinal(a), era_ordinal(b)) {
        (Some(x), Some(y)) if x < y => a,
        _ => b,
    }
}
