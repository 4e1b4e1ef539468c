//! npm version range algebra
//!
//! Supports the npm range grammar:
//! - `1.2.3`, `=1.2.3` - exact match
//! - `^1.2.3` - compatible with version (>=1.2.3 <2.0.0, special cases for 0.x)
//! - `~1.2.3`, `~>1.2.3` - approximately equivalent (>=1.2.3 <1.3.0)
//! - `>=1.2.3`, `>1.2.3`, `<=1.2.3`, `<1.2.3` - comparison operators
//! - `1.2.x`, `1.x`, `1`, `*`, empty - X-ranges
//! - `1.0.0 - 2.0.0` - hyphen ranges
//! - space-separated comparators (AND) and `||` alternatives (OR)
//!
//! Partial versions desugar the way npm does it, e.g. `<1.3` is `<1.3.0-0` and
//! `<=1` is `<2.0.0-0`. Derived upper bounds sit below the lowest prerelease
//! of the next line, so `^4.2.0` does not admit `5.0.0-beta.1`. Every
//! alternative collapses to a single interval, which makes intersection
//! testing a pairwise interval overlap check.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound::{self, Excluded, Included, Unbounded};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use semver::{Prerelease, Version};

use crate::version::error::RangeError;

/// Partial version: `1`, `1.2`, `1.2.x`, `1.2.3-beta.1`
static PARTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[vV]?(\d+|[xX*])(?:\.(\d+|[xX*]))?(?:\.(\d+|[xX*]))?(?:-([0-9A-Za-z.-]+))?(?:\+[0-9A-Za-z.-]+)?$",
    )
    .unwrap()
});

/// Operator followed by whitespace: `>= 1.2.3` -> `>=1.2.3`
static OPERATOR_GAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(<=|>=|~>|[<>=^~])\s+").unwrap());

/// Hyphen range: `1.2.3 - 2.3.4`
static HYPHEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\S+)\s+-\s+(\S+)$").unwrap());

static MIN_VERSION: Version = Version::new(0, 0, 0);

/// Lowest prerelease identifier: `1.3.0-0` precedes every other `1.3.0-*`
static LOWEST_PRERELEASE: LazyLock<Prerelease> = LazyLock::new(|| Prerelease::new("0").unwrap());

/// A parsed npm range: a union of intervals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<Interval>,
}

impl VersionRange {
    pub fn parse(spec: &str) -> Result<Self, RangeError> {
        let alternatives = spec
            .split("||")
            .map(parse_alternative)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| RangeError::Invalid(spec.to_string()))?;

        Ok(Self {
            raw: spec.trim().to_string(),
            alternatives,
        })
    }

    /// Check if a version satisfies any alternative of this range
    pub fn satisfies(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|i| i.contains(version))
    }

    /// Check if some version could satisfy both ranges
    pub fn intersects(&self, other: &VersionRange) -> bool {
        self.alternatives.iter().any(|a| {
            other
                .alternatives
                .iter()
                .any(|b| !a.intersect(b).is_empty())
        })
    }
}

impl FromStr for VersionRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Intersection test over raw range strings; an invalid range intersects nothing.
pub fn intersects(a: &str, b: &str) -> bool {
    match (VersionRange::parse(a), VersionRange::parse(b)) {
        (Ok(a), Ok(b)) => a.intersects(&b),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Interval {
    lower: Bound<Version>,
    upper: Bound<Version>,
}

impl Interval {
    fn any() -> Self {
        Self {
            lower: Unbounded,
            upper: Unbounded,
        }
    }

    /// `<0.0.0`: nothing satisfies it
    fn none() -> Self {
        Self {
            lower: Unbounded,
            upper: Excluded(MIN_VERSION.clone()),
        }
    }

    fn between(lower: Version, upper: Version) -> Self {
        Self {
            lower: Included(lower),
            upper: Excluded(upper),
        }
    }

    fn at_least(lower: Bound<Version>) -> Self {
        Self {
            lower,
            upper: Unbounded,
        }
    }

    fn at_most(upper: Bound<Version>) -> Self {
        Self {
            lower: Unbounded,
            upper,
        }
    }

    fn contains(&self, version: &Version) -> bool {
        let above = match &self.lower {
            Included(v) => version >= v,
            Excluded(v) => version > v,
            Unbounded => true,
        };
        let below = match &self.upper {
            Included(v) => version <= v,
            Excluded(v) => version < v,
            Unbounded => true,
        };
        above && below
    }

    fn is_empty(&self) -> bool {
        let (low, low_inclusive) = match &self.lower {
            Included(v) => (v, true),
            Excluded(v) => (v, false),
            Unbounded => (&MIN_VERSION, true),
        };
        match &self.upper {
            Unbounded => false,
            Included(high) => low > high || (low == high && !low_inclusive),
            Excluded(high) => low >= high,
        }
    }

    fn intersect(&self, other: &Interval) -> Interval {
        Interval {
            lower: tighter_bound(&self.lower, &other.lower, Ordering::Greater),
            upper: tighter_bound(&self.upper, &other.upper, Ordering::Less),
        }
    }
}

/// Pick the more restrictive of two bounds on the same side.
///
/// `prefer` is the ordering a restrictive bound has relative to the other one:
/// `Greater` for lower bounds, `Less` for upper bounds. On equal versions an
/// exclusive bound is the restrictive one.
fn tighter_bound(a: &Bound<Version>, b: &Bound<Version>, prefer: Ordering) -> Bound<Version> {
    let (va, vb) = match (a, b) {
        (Unbounded, _) => return b.clone(),
        (_, Unbounded) => return a.clone(),
        (Included(va) | Excluded(va), Included(vb) | Excluded(vb)) => (va, vb),
    };
    match va.cmp(vb) {
        Ordering::Equal if matches!(a, Excluded(_)) => a.clone(),
        Ordering::Equal => b.clone(),
        ord if ord == prefer => a.clone(),
        _ => b.clone(),
    }
}

/// Version with optional (wildcard) components
#[derive(Debug, Clone, PartialEq, Eq)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

impl Partial {
    fn parse(input: &str) -> Option<Self> {
        let caps = PARTIAL_RE.captures(input.trim())?;

        let major = component(caps.get(1))?;
        let minor = major.and(component(caps.get(2))?);
        let patch = minor.and(component(caps.get(3))?);
        let pre = match (patch, caps.get(4)) {
            (Some(_), Some(m)) => Prerelease::new(m.as_str()).ok()?,
            _ => Prerelease::EMPTY,
        };

        Some(Self {
            major,
            minor,
            patch,
            pre,
        })
    }

    /// Lowest version matched by the wildcards
    fn floor(&self) -> Version {
        let mut version = Version::new(
            self.major.unwrap_or(0),
            self.minor.unwrap_or(0),
            self.patch.unwrap_or(0),
        );
        version.pre = self.pre.clone();
        version
    }

    /// First release past the wildcards: `1` -> 2.0.0, `1.2` -> 1.3.0.
    /// None for `*` and full versions.
    fn ceiling(&self) -> Option<Version> {
        match (self.major, self.minor, self.patch) {
            (Some(major), None, _) => Some(Version::new(major.saturating_add(1), 0, 0)),
            (Some(major), Some(minor), None) => {
                Some(Version::new(major, minor.saturating_add(1), 0))
            }
            _ => None,
        }
    }
}

/// Exclusive upper bound for a derived range: `2.0.0` -> `<2.0.0-0`
fn before_line(major: u64, minor: u64, patch: u64) -> Version {
    let mut version = Version::new(major, minor, patch);
    version.pre = LOWEST_PRERELEASE.clone();
    version
}

fn before(release: &Version) -> Version {
    before_line(release.major, release.minor, release.patch)
}

/// Parse one numeric/wildcard component. Outer None is a parse failure,
/// inner None a wildcard or missing component.
fn component(m: Option<regex::Match<'_>>) -> Option<Option<u64>> {
    match m.map(|m| m.as_str()) {
        None | Some("x" | "X" | "*") => Some(None),
        Some(digits) => digits.parse().ok().map(Some),
    }
}

fn parse_alternative(spec: &str) -> Option<Interval> {
    let spec = spec.trim();

    if let Some(caps) = HYPHEN_RE.captures(spec) {
        let from = Partial::parse(&caps[1])?;
        let to = Partial::parse(&caps[2])?;
        return Some(hyphen(&from, &to));
    }

    let normalized = OPERATOR_GAP_RE.replace_all(spec, "$1");
    normalized
        .split_whitespace()
        .try_fold(Interval::any(), |acc, token| {
            parse_comparator(token).map(|interval| acc.intersect(&interval))
        })
}

fn parse_comparator(token: &str) -> Option<Interval> {
    const OPERATORS: [&str; 9] = [">=", "<=", "~>", ">", "<", "=", "^", "~", ""];

    let (op, rest) = OPERATORS
        .iter()
        .find_map(|op| token.strip_prefix(op).map(|rest| (*op, rest)))?;
    let partial = Partial::parse(rest)?;

    Some(match op {
        "^" => caret(&partial),
        "~" | "~>" => tilde(&partial),
        ">=" => greater_or_equal(&partial),
        ">" => greater(&partial),
        "<=" => less_or_equal(&partial),
        "<" => less(&partial),
        _ => x_range(&partial),
    })
}

fn x_range(p: &Partial) -> Interval {
    if p.major.is_none() {
        return Interval::any();
    }
    match p.ceiling() {
        Some(ceiling) => Interval::between(p.floor(), before(&ceiling)),
        None => Interval {
            lower: Included(p.floor()),
            upper: Included(p.floor()),
        },
    }
}

/// ^1.2.3 -> >=1.2.3 <2.0.0-0
/// ^0.2.3 -> >=0.2.3 <0.3.0-0
/// ^0.0.3 -> >=0.0.3 <0.0.4-0
/// ^0.0 -> <0.1.0-0, ^0 -> <1.0.0-0
fn caret(p: &Partial) -> Interval {
    let upper = match (p.major, p.minor, p.patch) {
        (None, _, _) => return Interval::any(),
        (Some(major), None, _) => before_line(major.saturating_add(1), 0, 0),
        (Some(0), Some(minor), None) => before_line(0, minor.saturating_add(1), 0),
        (Some(0), Some(0), Some(patch)) => before_line(0, 0, patch.saturating_add(1)),
        (Some(0), Some(minor), Some(_)) => before_line(0, minor.saturating_add(1), 0),
        (Some(major), Some(_), _) => before_line(major.saturating_add(1), 0, 0),
    };
    Interval::between(p.floor(), upper)
}

/// ~1.2.3 -> >=1.2.3 <1.3.0-0, ~1 -> >=1.0.0 <2.0.0-0
fn tilde(p: &Partial) -> Interval {
    let upper = match (p.major, p.minor) {
        (None, _) => return Interval::any(),
        (Some(major), None) => before_line(major.saturating_add(1), 0, 0),
        (Some(major), Some(minor)) => before_line(major, minor.saturating_add(1), 0),
    };
    Interval::between(p.floor(), upper)
}

fn greater_or_equal(p: &Partial) -> Interval {
    if p.major.is_none() {
        return Interval::any();
    }
    Interval::at_least(Included(p.floor()))
}

/// >1.2 -> >=1.3.0, >1 -> >=2.0.0
fn greater(p: &Partial) -> Interval {
    if p.major.is_none() {
        return Interval::none();
    }
    match p.ceiling() {
        Some(ceiling) => Interval::at_least(Included(ceiling)),
        None => Interval::at_least(Excluded(p.floor())),
    }
}

/// <=1.2 -> <1.3.0-0, <=1 -> <2.0.0-0
fn less_or_equal(p: &Partial) -> Interval {
    if p.major.is_none() {
        return Interval::any();
    }
    match p.ceiling() {
        Some(ceiling) => Interval::at_most(Excluded(before(&ceiling))),
        None => Interval::at_most(Included(p.floor())),
    }
}

/// <1.2 -> <1.2.0-0, <1 -> <1.0.0-0, <1.2.3 -> <1.2.3
fn less(p: &Partial) -> Interval {
    if p.major.is_none() {
        return Interval::none();
    }
    let floor = p.floor();
    if p.patch.is_none() {
        return Interval::at_most(Excluded(before(&floor)));
    }
    Interval::at_most(Excluded(floor))
}

/// 1.2.3 - 2.3.4 -> >=1.2.3 <=2.3.4, 1.2 - 2 -> >=1.2.0 <3.0.0-0
fn hyphen(from: &Partial, to: &Partial) -> Interval {
    let lower = if from.major.is_none() {
        Unbounded
    } else {
        Included(from.floor())
    };
    let upper = if to.major.is_none() {
        Unbounded
    } else {
        match to.ceiling() {
            Some(ceiling) => Excluded(before(&ceiling)),
            None => Included(to.floor()),
        }
    };
    Interval { lower, upper }
}
