//! Game version identifiers with a total order across releases, snapshots,
//! betas and alphas.
use crate::error::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Release channel of a version. Declaration order is the cross-channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VersionKind {
    Alpha,
    Beta,
    Snapshot,
    Release,
}

/// A parsed game version.
///
/// Equality and hashing use the raw string only: `1.0` and `1.0.0` are
/// different versions even though they order next to each other.
#[derive(Debug, Clone)]
pub struct MinecraftVersion {
    kind: VersionKind,
    full: String,
    nearest: Vec<u32>,
    year: Option<u32>,
    week: Option<u32>,
    /// Positive for pre-releases, negative for release candidates, zero for finals.
    pre: i32,
    revision: Option<String>,
}

struct HistoricalVersion {
    raw: &'static str,
    kind: VersionKind,
    nearest: &'static [u32],
    snapshot: Option<(u32, u32)>,
    revision: Option<&'static str>,
}

impl HistoricalVersion {
    const fn april_fools(
        raw: &'static str,
        year: u32,
        week: u32,
        nearest: &'static [u32],
        revision: &'static str,
    ) -> Self {
        Self {
            raw,
            kind: VersionKind::Snapshot,
            nearest,
            snapshot: Some((year, week)),
            revision: Some(revision),
        }
    }

    const fn pre_classic(raw: &'static str, nearest: &'static [u32]) -> Self {
        Self {
            raw,
            kind: VersionKind::Alpha,
            nearest,
            snapshot: None,
            revision: None,
        }
    }
}

/// Builds that do not follow any of the generic naming schemes.
static HISTORICAL_VERSIONS: &[HistoricalVersion] = &[
    HistoricalVersion::april_fools("2point0_red", 13, 14, &[1, 5, 2], "red"),
    HistoricalVersion::april_fools("2point0_blue", 13, 14, &[1, 5, 2], "blue"),
    HistoricalVersion::april_fools("2point0_purple", 13, 14, &[1, 5, 2], "purple"),
    HistoricalVersion::april_fools("15w14a", 15, 14, &[1, 10], "a"),
    HistoricalVersion::april_fools("1.rv-pre1", 16, 14, &[1, 9, 3], "rv-pre1"),
    HistoricalVersion::april_fools("3d shareware v1.34", 19, 14, &[1, 14], "3d"),
    HistoricalVersion::april_fools("20w14infinite", 20, 14, &[1, 16], "infinite"),
    HistoricalVersion::april_fools("20w14\u{221e}", 20, 14, &[1, 16], "infinite"),
    HistoricalVersion::april_fools("22w13oneblockatatime", 22, 13, &[1, 19], "oneblockatatime"),
    HistoricalVersion::april_fools("23w13a_or_b", 23, 13, &[1, 20], "a_or_b"),
    HistoricalVersion::april_fools("24w14potato", 24, 14, &[1, 21], "potato"),
    HistoricalVersion::pre_classic("rd-132211", &[0, 0, 1]),
    HistoricalVersion::pre_classic("rd-132328", &[0, 0, 2]),
    HistoricalVersion::pre_classic("rd-20090515", &[0, 0, 3]),
    HistoricalVersion::pre_classic("rd-160052", &[0, 0, 4]),
    HistoricalVersion::pre_classic("rd-161348", &[0, 0, 5]),
    HistoricalVersion::pre_classic("inf-20100618", &[0, 31]),
];

/// Inclusive `year * 100 + week` ranges mapped to the release each snapshot led to.
static SNAPSHOT_TARGETS: &[(u32, u32, &[u32])] = &[
    (1147, 1201, &[1, 1]),
    (1203, 1208, &[1, 2]),
    (1215, 1230, &[1, 3]),
    (1232, 1242, &[1, 4]),
    (1249, 1250, &[1, 4, 6]),
    (1301, 1310, &[1, 5]),
    (1311, 1312, &[1, 5, 1]),
    (1316, 1326, &[1, 6]),
    (1336, 1343, &[1, 7]),
    (1347, 1349, &[1, 7, 4]),
    (1402, 1434, &[1, 8]),
    (1531, 1607, &[1, 9]),
    (1614, 1615, &[1, 9, 3]),
    (1620, 1621, &[1, 10]),
    (1632, 1644, &[1, 11]),
    (1650, 1650, &[1, 11, 1]),
    (1706, 1718, &[1, 12]),
    (1731, 1731, &[1, 12, 1]),
    (1743, 1822, &[1, 13]),
    (1830, 1833, &[1, 13, 1]),
    (1843, 1914, &[1, 14]),
    (1934, 1946, &[1, 15]),
    (2006, 2022, &[1, 16]),
    (2027, 2030, &[1, 16, 2]),
    (2045, 2120, &[1, 17]),
    (2137, 2144, &[1, 18]),
    (2203, 2207, &[1, 18, 2]),
    (2211, 2219, &[1, 19]),
    (2224, 2224, &[1, 19, 1]),
    (2242, 2246, &[1, 19, 3]),
    (2303, 2307, &[1, 19, 4]),
    (2312, 2318, &[1, 20]),
    (2331, 2335, &[1, 20, 2]),
    (2340, 2346, &[1, 20, 3]),
    (2403, 2414, &[1, 20, 5]),
    (2418, 2421, &[1, 21]),
    (2433, 2440, &[1, 21, 2]),
    (2444, 2446, &[1, 21, 4]),
    (2502, 2510, &[1, 21, 5]),
    (2515, 2521, &[1, 21, 6]),
    (2531, 2537, &[1, 21, 9]),
    (2541, 2546, &[1, 21, 11]),
];

/// Suffixes that split a release string into base and pre-release ordinal.
/// The sign is applied to the ordinal: release candidates are negative.
const PRE_RELEASE_MARKERS: &[(&str, i32)] = &[
    ("-pre", 1),
    ("_pre-release_", 1),
    (" pre-release ", 1),
    ("-rc", -1),
];

impl MinecraftVersion {
    /// Parse a raw version string.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let lower = raw.to_lowercase();

        if let Some(historical) = HISTORICAL_VERSIONS.iter().find(|h| h.raw == lower) {
            return Ok(Self {
                kind: historical.kind,
                full: raw.to_string(),
                nearest: historical.nearest.to_vec(),
                year: historical.snapshot.map(|(year, _)| year),
                week: historical.snapshot.map(|(_, week)| week),
                pre: 0,
                revision: historical.revision.map(str::to_string),
            });
        }

        if lower.starts_with("rd-") {
            return Err(Error::invalid_version(raw, "unknown pre-classic 'rd' build"));
        }

        match lower.chars().next() {
            None => Err(Error::invalid_version(raw, "empty version string")),
            Some(first @ ('a' | 'b' | 'c')) => Self::parse_early(raw, &lower, first),
            Some(_) if lower.is_ascii() && lower.len() == 6 && lower.as_bytes()[2] == b'w' => {
                Self::parse_snapshot(raw, &lower)
            }
            Some(_) => Self::parse_release(raw, &lower),
        }
    }

    fn parse_early(raw: &str, lower: &str, first: char) -> Result<Self, Error> {
        let kind = if first == 'b' {
            VersionKind::Beta
        } else {
            VersionKind::Alpha
        };
        let clean = lower[1..].replace('_', ".");
        let (numbers, revision) = match clean.chars().last() {
            None => return Err(Error::invalid_version(raw, "missing version number")),
            Some(end) if !end.is_ascii_digit() => {
                (&clean[..clean.len() - end.len_utf8()], Some(end.to_string()))
            }
            Some(_) => (clean.as_str(), None),
        };

        Ok(Self {
            kind,
            full: raw.to_string(),
            nearest: split_dots(raw, numbers)?,
            year: None,
            week: None,
            pre: 0,
            revision,
        })
    }

    fn parse_snapshot(raw: &str, lower: &str) -> Result<Self, Error> {
        let year: u32 = lower[0..2]
            .parse()
            .map_err(|_| Error::invalid_version(raw, "snapshot year is not numeric"))?;
        let week: u32 = lower[3..5]
            .parse()
            .map_err(|_| Error::invalid_version(raw, "snapshot week is not numeric"))?;
        let stamp = year * 100 + week;

        let nearest = SNAPSHOT_TARGETS
            .iter()
            .find(|(start, end, _)| (*start..=*end).contains(&stamp))
            .map(|(_, _, target)| target.to_vec())
            .ok_or_else(|| {
                Error::invalid_version(raw, format!("no release known for snapshot date {}", stamp))
            })?;

        Ok(Self {
            kind: VersionKind::Snapshot,
            full: raw.to_string(),
            nearest,
            year: Some(year),
            week: Some(week),
            pre: 0,
            revision: Some(lower[5..].to_string()),
        })
    }

    fn parse_release(raw: &str, lower: &str) -> Result<Self, Error> {
        let mut base = lower;
        let mut pre = 0;

        for (marker, sign) in PRE_RELEASE_MARKERS {
            if let Some((head, ordinal)) = lower.split_once(marker) {
                let ordinal: i32 = ordinal.trim().parse().map_err(|_| {
                    Error::invalid_version(raw, format!("invalid ordinal after '{}'", marker.trim()))
                })?;
                base = head;
                pre = sign * ordinal;
                break;
            }
        }

        Ok(Self {
            kind: VersionKind::Release,
            full: raw.to_string(),
            nearest: split_dots(raw, base)?,
            year: None,
            week: None,
            pre,
            revision: None,
        })
    }

    pub fn kind(&self) -> VersionKind {
        self.kind
    }

    /// The raw string this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// Numeric release components, or the targeted release for snapshots.
    pub fn nearest(&self) -> &[u32] {
        &self.nearest
    }

    pub fn year(&self) -> Option<u32> {
        self.year
    }

    pub fn week(&self) -> Option<u32> {
        self.week
    }

    pub fn pre(&self) -> i32 {
        self.pre
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn is_snapshot(&self) -> bool {
        self.kind == VersionKind::Snapshot
    }

    /// Ordering by meaning only. Two distinct strings such as `1.14-pre1` and
    /// `1.14 Pre-Release 1` compare `Equal` here; [`Ord`] breaks that tie on
    /// the raw string.
    pub fn compare_semantic(&self, other: &Self) -> Ordering {
        if self.kind != other.kind {
            return match (self.kind, other.kind) {
                (VersionKind::Snapshot, VersionKind::Release) => {
                    compare_nearest(&self.nearest, &other.nearest).then(Ordering::Less)
                }
                (VersionKind::Release, VersionKind::Snapshot) => {
                    compare_nearest(&self.nearest, &other.nearest).then(Ordering::Greater)
                }
                (mine, theirs) => mine.cmp(&theirs),
            };
        }

        if self.kind == VersionKind::Snapshot {
            return compare_nearest(&self.nearest, &other.nearest)
                .then(self.year.cmp(&other.year))
                .then(self.week.cmp(&other.week))
                .then_with(|| compare_revision(&self.revision, &other.revision));
        }

        let ordering = compare_nearest(&self.nearest, &other.nearest)
            .then_with(|| compare_pre(self.pre, other.pre));

        match self.kind {
            VersionKind::Alpha | VersionKind::Beta => {
                ordering.then_with(|| compare_revision(&self.revision, &other.revision))
            }
            _ => ordering,
        }
    }
}

fn split_dots(raw: &str, numbers: &str) -> Result<Vec<u32>, Error> {
    numbers
        .split('.')
        .map(|part| {
            part.parse::<u32>().map_err(|_| {
                Error::invalid_version(raw, format!("'{}' is not a numeric component", part))
            })
        })
        .collect()
}

/// Element-wise comparison; with an equal prefix the shorter sequence is lower.
fn compare_nearest(a: &[u32], b: &[u32]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    a.len().cmp(&b.len())
}

/// Final (0) > release candidate (< 0) > pre-release (> 0).
fn compare_pre(a: i32, b: i32) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    match (a.signum(), b.signum()) {
        (0, _) => Ordering::Greater,
        (_, 0) => Ordering::Less,
        (-1, 1) => Ordering::Greater,
        (1, -1) => Ordering::Less,
        _ => a.abs().cmp(&b.abs()),
    }
}

/// A missing revision sorts above any present one.
fn compare_revision(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(y),
    }
}

impl PartialEq for MinecraftVersion {
    fn eq(&self, other: &Self) -> bool {
        self.full == other.full
    }
}

impl Eq for MinecraftVersion {}

impl Hash for MinecraftVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full.hash(state);
    }
}

impl Ord for MinecraftVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_semantic(other)
            .then_with(|| self.full.cmp(&other.full))
    }
}

impl PartialOrd for MinecraftVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MinecraftVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl FromStr for MinecraftVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MinecraftVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.full)
    }
}

impl<'de> Deserialize<'de> for MinecraftVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> MinecraftVersion {
        MinecraftVersion::parse(raw).unwrap()
    }

    #[test]
    fn test_snapshot_sorts_between_releases() {
        assert!(v("1.16.5") < v("1.17"));
        assert!(v("1.17") < v("21w37a"));
        assert!(v("21w37a") < v("1.18"));
        assert_eq!(v("21w37a").nearest(), &[1, 18]);
    }

    #[test]
    fn test_pre_release_and_release_candidate_order() {
        assert!(v("1.14-pre1") < v("1.14-rc1"));
        assert!(v("1.14-rc1") < v("1.14"));
        assert!(v("1.14-pre1") < v("1.14-pre2"));
        assert!(v("1.14-rc1") < v("1.14-rc2"));
        assert!(v("1.13.2") < v("1.14-pre1"));
        assert_eq!(v("1.14-rc2").pre(), -2);
        assert_eq!(v("1.14.4 Pre-Release 3").pre(), 3);
        assert_eq!(v("1.14_Pre-Release_2").nearest(), &[1, 14]);
    }

    #[test]
    fn test_equality_is_by_raw_string() {
        assert_ne!(v("1.0"), v("1.0.0"));
        assert!(v("1.0") < v("1.0.0"));
        assert_eq!(v("1.20.1"), v("1.20.1"));
        assert_eq!(v("1.20.1").cmp(&v("1.20.1")), Ordering::Equal);

        let a = v("1.14-pre1");
        let b = v("1.14 Pre-Release 1");
        assert_eq!(a.compare_semantic(&b), Ordering::Equal);
        assert_ne!(a, b);
        assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    }

    #[test]
    fn test_cross_kind_order() {
        assert!(v("rd-132211") < v("c0.0.11a"));
        assert!(v("c0.30_01c") < v("inf-20100618"));
        assert!(v("inf-20100618") < v("a1.0.4"));
        assert!(v("a1.2.6") < v("b1.0"));
        assert!(v("b1.8.1") < v("1.0"));
        assert!(v("b1.8.1") < v("11w47a"));
        assert!(v("12w01a") < v("1.1"));
    }

    #[test]
    fn test_early_versions_split_revision() {
        let alpha = v("a1.0.5_01");
        assert_eq!(alpha.kind(), VersionKind::Alpha);
        assert_eq!(alpha.nearest(), &[1, 0, 5, 1]);
        assert_eq!(alpha.revision(), None);

        let classic = v("c0.0.11a");
        assert_eq!(classic.nearest(), &[0, 0, 11]);
        assert_eq!(classic.revision(), Some("a"));
        assert!(v("c0.0.11a") < v("c0.0.11"));
    }

    #[test]
    fn test_historical_versions() {
        let shareware = v("3D Shareware v1.34");
        assert_eq!(shareware.kind(), VersionKind::Snapshot);
        assert_eq!(shareware.to_string(), "3D Shareware v1.34");
        assert!(v("1.13.2") < shareware && shareware < v("1.14"));

        assert!(v("1.RV-Pre1") < v("1.9.3"));
        assert!(v("24w14potato") < v("1.21"));
        assert_eq!(v("rd-160052").nearest(), &[0, 0, 4]);
    }

    #[test]
    fn test_snapshot_revision_order() {
        assert!(v("21w37a") < v("21w37b"));
        assert!(v("21w37b") < v("21w38a"));
        assert!(v("21w44a") < v("22w03a"));
    }

    #[test]
    fn test_invalid_versions() {
        for raw in ["rd-999999", "21wxxa", "09w01a", "1.x", "", "1.14-prefoo"] {
            let err = MinecraftVersion::parse(raw).unwrap_err();
            assert!(
                matches!(err, Error::InvalidVersionFormat { .. }),
                "unexpected error for {:?}: {}",
                raw,
                err
            );
        }
    }

    #[test]
    fn test_round_trip_preserves_raw_string() {
        for raw in ["1.19.2", "1.14 Pre-Release 2", "22w13oneblockatatime", "b1.7.3", "1.20-rc1"] {
            assert_eq!(v(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_order_is_antisymmetric_and_transitive() {
        let mut versions: Vec<MinecraftVersion> = [
            "1.18", "21w37a", "1.17", "1.14-pre1", "1.14-rc1", "1.14", "b1.7.3", "a1.1.2",
            "1.0", "1.0.0", "20w14infinite", "1.16", "1.19-pre3", "22w13oneblockatatime",
        ]
        .iter()
        .map(|raw| v(raw))
        .collect();

        for a in &versions {
            for b in &versions {
                assert_eq!(a.cmp(b), b.cmp(a).reverse(), "{} vs {}", a, b);
                for c in &versions {
                    if a < b && b < c {
                        assert!(a < c, "{} < {} < {}", a, b, c);
                    }
                }
            }
        }

        versions.sort();
        let sorted: Vec<String> = versions.iter().map(ToString::to_string).collect();
        assert_eq!(sorted.first().map(String::as_str), Some("a1.1.2"));
        assert_eq!(sorted.last().map(String::as_str), Some("1.19-pre3"));
    }

    #[test]
    fn test_snapshots_order_by_target_release_first() {
        // April Fools builds sit at their release week but target another release
        assert!(v("15w35a") < v("1.9.1"));
        assert!(v("1.9.1") < v("15w14a"));
        assert!(v("15w35a") < v("15w14a"));
        assert!(v("24w14a") < v("1.20.5"));
        assert!(v("1.20.5") < v("24w14potato"));

        let mut versions: Vec<MinecraftVersion> = ["15w14a", "15w35a", "1.9.1", "24w14potato", "24w14a", "1.20.5"]
            .iter()
            .map(|raw| v(raw))
            .collect();
        for a in &versions {
            for b in &versions {
                for c in &versions {
                    if a < b && b < c {
                        assert!(a < c, "{} < {} < {}", a, b, c);
                    }
                }
            }
        }

        versions.sort();
        let sorted: Vec<String> = versions.iter().map(ToString::to_string).collect();
        assert_eq!(sorted, vec!["15w35a", "1.9.1", "15w14a", "24w14a", "1.20.5", "24w14potato"]);
    }

    #[test]
    fn test_serde_uses_raw_string() {
        let parsed: MinecraftVersion = serde_json::from_str("\"1.19.2\"").unwrap();
        assert_eq!(parsed, v("1.19.2"));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"1.19.2\"");
        assert!(serde_json::from_str::<MinecraftVersion>("\"rd-1\"").is_err());
    }
}
