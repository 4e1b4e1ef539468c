//! Era classification of an extension's canary dependencies

use indexmap::IndexMap;

use crate::eras::{EraTable, older_era};
use crate::version::range::intersects;
use crate::version::types::{Dependencies, LATEST};

/// Canary name -> range of the platform release current at the sampled date
pub type CurrentRanges = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Oldest era any canary declaration matched, `None` when unclassified
    pub era: Option<String>,
    pub up_to_date: bool,
}

fn declaration_matches(declared: &str, range: &str) -> bool {
    declared == LATEST || intersects(range, declared)
}

/// Classify merged dependencies against the current canary ranges and the era table
///
/// Canaries missing from `deps` give no signal. Each present canary votes for
/// up-to-date (all votes must agree) and for the most recent era its
/// declaration fits; the oldest of those eras wins.
pub fn classify(deps: &Dependencies, current: &CurrentRanges, table: &EraTable) -> Classification {
    let mut up_to_date: Option<bool> = None;
    let mut era: Option<&str> = None;

    for canary in table.canaries() {
        let Some(declared) = deps.get(canary) else {
            continue;
        };

        if let Some(current_range) = current.get(canary) {
            let indicated = declaration_matches(declared, current_range);
            up_to_date = Some(up_to_date.unwrap_or(true) && indicated);
        }

        let matched = table.eras().find_map(|(label, ranges)| {
            ranges
                .get(canary)
                .filter(|range| declaration_matches(declared, range))
                .map(|_| label)
        });

        if let Some(label) = matched {
            era = Some(match era {
                Some(previous) => older_era(label, previous),
                None => label,
            });
        }
    }

    Classification {
        era: era.map(str::to_string),
        up_to_date: up_to_date.unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn deps(entries: &[(&str, &str)]) -> Dependencies {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn current(entries: &[(&str, &str)]) -> CurrentRanges {
        deps(entries)
    }

    fn current_2x() -> CurrentRanges {
        current(&[
            ("@jupyterlab/application", "^2.2.0"),
            ("@jupyterlab/coreutils", "^4.2.0"),
            ("@jupyterlab/rendermime-interfaces", "^2.2.0"),
            ("@jupyterlab/services", "^5.2.0"),
            ("@jupyter-widgets/base", "^3.0.0"),
        ])
    }

    #[test]
    fn outdated_services_declaration_classifies_as_previous_era() {
        let result = classify(
            &deps(&[("@jupyterlab/services", "^4.0.0"), ("lodash", "^4.17.0")]),
            &current(&[("@jupyterlab/services", "^5.0.0")]),
            &EraTable::default(),
        );

        assert_eq!(
            result,
            Classification {
                era: Some("1".to_string()),
                up_to_date: false
            }
        );
    }

    #[test]
    fn no_canary_dependencies_is_unclassified() {
        let result = classify(
            &deps(&[("react", "^16.0.0")]),
            &current_2x(),
            &EraTable::default(),
        );

        assert_eq!(
            result,
            Classification {
                era: None,
                up_to_date: false
            }
        );
    }

    #[test]
    fn latest_declaration_is_up_to_date_in_most_recent_era() {
        let result = classify(
            &deps(&[("@jupyterlab/services", LATEST)]),
            &current_2x(),
            &EraTable::default(),
        );

        assert_eq!(
            result,
            Classification {
                era: Some("2".to_string()),
                up_to_date: true
            }
        );
    }

    #[test]
    fn oldest_era_across_canaries_wins() {
        let result = classify(
            &deps(&[
                ("@jupyterlab/application", "^2.0.0"),
                ("@jupyterlab/coreutils", "^3.0.0"),
            ]),
            &current_2x(),
            &EraTable::default(),
        );

        assert_eq!(result.era.as_deref(), Some("1"));
        assert!(!result.up_to_date);
    }

    #[test]
    fn all_canaries_must_agree_for_up_to_date() {
        let table = EraTable::default();

        let agreeing = classify(
            &deps(&[
                ("@jupyterlab/application", "^2.1.0"),
                ("@jupyterlab/services", "^5.0.0"),
            ]),
            &current_2x(),
            &table,
        );
        let disagreeing = classify(
            &deps(&[
                ("@jupyterlab/application", "^2.1.0"),
                ("@jupyterlab/services", "^4.0.0"),
            ]),
            &current_2x(),
            &table,
        );

        assert!(agreeing.up_to_date);
        assert!(!disagreeing.up_to_date);
    }

    #[test]
    fn next_line_prerelease_declaration_is_not_up_to_date() {
        let result = classify(
            &deps(&[("@jupyterlab/services", "^5.0.0-beta.1")]),
            &current(&[("@jupyterlab/services", "^4.2.0")]),
            &EraTable::default(),
        );

        assert_eq!(
            result,
            Classification {
                era: Some("2".to_string()),
                up_to_date: false
            }
        );
    }

    #[test]
    fn missing_current_range_gives_no_up_to_date_signal() {
        let result = classify(
            &deps(&[("@jupyterlab/application", "^2.0.0")]),
            &current(&[("@jupyterlab/services", "^5.0.0")]),
            &EraTable::default(),
        );

        assert_eq!(result.era.as_deref(), Some("2"));
        assert!(!result.up_to_date);
    }

    #[rstest]
    #[case("^0.16.0", Some("0"))]
    #[case("~0.19.1", Some("0"))]
    #[case(">=1.0.0", Some("2"))] // open range reaches the most recent era first
    #[case("^3.0.0", None)]
    #[case("github:jupyterlab/jupyterlab", None)]
    #[case("", Some("2"))]
    fn application_declaration_maps_to_era(#[case] declared: &str, #[case] expected: Option<&str>) {
        let result = classify(
            &deps(&[("@jupyterlab/application", declared)]),
            &current_2x(),
            &EraTable::default(),
        );

        assert_eq!(result.era.as_deref(), expected);
    }
}
