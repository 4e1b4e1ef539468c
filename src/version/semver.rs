use semver::Version;

use crate::version::range::VersionRange;

/// Parse a published version string, tolerating the loose forms npm accepts.
///
/// Surrounding whitespace and a single leading `=` or `v` are stripped before
/// strict semver parsing. Partial versions ("1.2") are not versions.
///
/// Examples:
/// - "1.2.3" -> Version(1, 2, 3)
/// - "v1.2.3" -> Version(1, 2, 3)
/// - "=1.2.3-beta.1" -> Version(1, 2, 3, pre: beta.1)
pub fn parse_loose(version: &str) -> Option<Version> {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('=')
        .map(str::trim_start)
        .unwrap_or(trimmed);
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}

pub fn is_prerelease(version: &Version) -> bool {
    !version.pre.is_empty()
}

/// Sort version strings from highest to lowest, dropping unparseable entries.
pub fn sort_descending<I, S>(versions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed: Vec<(String, Version)> = versions
        .into_iter()
        .filter_map(|v| {
            let v = v.as_ref();
            parse_loose(v).map(|parsed| (v.to_string(), parsed))
        })
        .collect();

    parsed.sort_by(|(_, a), (_, b)| b.cmp(a));
    parsed.into_iter().map(|(v, _)| v).collect()
}

/// Highest non-prerelease version satisfying `range`.
///
/// Returns None when the range is invalid or nothing satisfies it.
pub fn max_satisfying<I, S>(versions: I, range: &str) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let range: VersionRange = range.parse().ok()?;

    versions
        .into_iter()
        .filter_map(|v| {
            let v = v.as_ref();
            let parsed = parse_loose(v)?;
            if is_prerelease(&parsed) || !range.satisfies(&parsed) {
                return None;
            }
            Some((v.to_string(), parsed))
        })
        .max_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(v, _)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.2.3", Some(Version::new(1, 2, 3)))]
    #[case("v1.2.3", Some(Version::new(1, 2, 3)))]
    #[case(" =1.2.3 ", Some(Version::new(1, 2, 3)))]
    #[case("= v2.0.0", Some(Version::new(2, 0, 0)))]
    #[case("1.2", None)] // partial versions are ranges, not versions
    #[case("created", None)]
    #[case("", None)]
    fn parse_loose_returns_expected(#[case] input: &str, #[case] expected: Option<Version>) {
        assert_eq!(parse_loose(input), expected);
    }

    #[test]
    fn parse_loose_keeps_prerelease_tag() {
        let parsed = parse_loose("3.0.0-rc.1").unwrap();
        assert!(is_prerelease(&parsed));
        assert!(!is_prerelease(&Version::new(3, 0, 0)));
    }

    #[test]
    fn sort_descending_orders_by_semver_and_drops_invalid() {
        let sorted = sort_descending(["1.10.0", "modified", "1.2.0", "2.0.0-alpha.1", "2.0.0"]);

        assert_eq!(sorted, vec!["2.0.0", "2.0.0-alpha.1", "1.10.0", "1.2.0"]);
    }

    #[rstest]
    #[case(&["1.0.0", "1.5.0", "2.0.0"], "*", Some("2.0.0"))]
    #[case(&["1.0.0", "1.5.0", "2.0.0-beta.1"], "*", Some("1.5.0"))] // prereleases never win
    #[case(&["1.0.0", "1.5.0", "2.0.0"], "^1", Some("1.5.0"))]
    #[case(&["1.0.0"], "^2", None)]
    #[case(&[], "*", None)]
    #[case(&["1.0.0"], "not a range", None)]
    fn max_satisfying_returns_expected(
        #[case] versions: &[&str],
        #[case] range: &str,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(
            max_satisfying(versions.iter(), range),
            expected.map(|s| s.to_string())
        );
    }
}
