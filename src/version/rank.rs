//! Total ordering of Electron version strings
//!
//! Electron publishes stable, beta, alpha and nightly builds from the same
//! numeric version line (`10.0.0`, `10.0.0-beta.3`, `10.0.0-nightly.20200301`).
//! [`rank`] turns any such string into a [`RankKey`] whose `Ord` implementation
//! is the order release listings use, most stable and newest first when sorted
//! descending.

use std::cmp::Ordering;

use semver::Version;

/// Release maturity track, ordered from least to most stable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Prerelease suffix that is none of the known channels (e.g. `-rc.1`)
    Other,
    Nightly,
    Alpha,
    Beta,
    Stable,
}

impl Channel {
    /// Classify a version string by its prerelease marker
    pub fn of(version: &str) -> Self {
        rank(version).channel()
    }

    /// Channel named by the first prerelease identifier (`beta` in `beta.3`)
    fn from_prerelease(pre: &str) -> Self {
        match pre.split('.').next() {
            None | Some("") => Channel::Stable,
            Some("nightly") => Channel::Nightly,
            Some("beta") => Channel::Beta,
            Some("alpha") => Channel::Alpha,
            Some(_) => Channel::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Other => "other",
            Channel::Nightly => "nightly",
            Channel::Alpha => "alpha",
            Channel::Beta => "beta",
            Channel::Stable => "stable",
        }
    }
}

/// Comparable key produced by [`rank`]
///
/// Field order is significant: keys compare on well-formedness first, then
/// channel, then the numeric version, then the prerelease sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RankKey {
    /// False when no numeric component could be read at all
    well_formed: bool,
    channel: Channel,
    major: u64,
    minor: u64,
    patch: u64,
    sequence: u64,
    /// Set when semver rejected the string and components were read leniently
    lossy: bool,
}

impl RankKey {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn numeric(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    /// Whether the string had to be read without a semver parse
    pub fn is_lossy(&self) -> bool {
        self.lossy || !self.well_formed
    }

    fn sort_tuple(&self) -> (bool, Channel, u64, u64, u64, u64) {
        (
            self.well_formed,
            self.channel,
            self.major,
            self.minor,
            self.patch,
            self.sequence,
        )
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_tuple().cmp(&other.sort_tuple())
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parse a version string into a semver::Version, normalizing partial versions.
///
/// Only the numeric core is padded, so a prerelease suffix survives:
/// - "10" -> Version(10, 0, 0)
/// - "10.1-beta.2" -> Version(10, 1, 0, pre "beta.2")
/// - "10.0.0-nightly.20200301" is parsed as is
pub fn parse_version(version: &str) -> Option<Version> {
    let (core, rest) = match version.find(['-', '+']) {
        Some(i) => version.split_at(i),
        None => (version, ""),
    };
    let normalized = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, rest),
        2 => format!("{}.0{}", core, rest),
        _ => version.to_string(),
    };
    Version::parse(&normalized).ok()
}

/// Trailing numeric prerelease identifier, 0 when there is none
fn sequence_of(pre: &str) -> u64 {
    pre.rsplit('.')
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Rank a version string. Never fails; garbage sorts below every real version.
///
/// Examples:
/// - "v10.0.0" -> stable 10.0.0
/// - "10.0.0-beta.3" -> beta 10.0.0, sequence 3
/// - "10.0.0-nightly.20200301" -> nightly 10.0.0, sequence 20200301
pub fn rank(version: &str) -> RankKey {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    match parse_version(trimmed) {
        Some(parsed) => RankKey {
            well_formed: true,
            channel: Channel::from_prerelease(parsed.pre.as_str()),
            major: parsed.major,
            minor: parsed.minor,
            patch: parsed.patch,
            sequence: sequence_of(parsed.pre.as_str()),
            lossy: false,
        },
        None => rank_lossy(trimmed),
    }
}

/// Best-effort key for strings semver rejects, reading whatever numbers it can
fn rank_lossy(version: &str) -> RankKey {
    let (core, suffix) = match version.split_once('-') {
        Some((core, suffix)) => (core, suffix),
        None => (version, ""),
    };

    let mut any_numeric = false;
    let mut parts = core.split('.');
    let mut next_component = || match parts.next().map(str::parse::<u64>) {
        Some(Ok(n)) => {
            any_numeric = true;
            n
        }
        _ => 0,
    };
    let major = next_component();
    let minor = next_component();
    let patch = next_component();

    RankKey {
        well_formed: any_numeric,
        channel: Channel::from_prerelease(suffix),
        major,
        minor,
        patch,
        sequence: sequence_of(suffix),
        lossy: true,
    }
}

/// Descending comparison used for release listings
///
/// Exact key ties fall back to the version string so the order is total.
pub fn compare_descending(a: &str, b: &str) -> Ordering {
    rank(b).cmp(&rank(a)).then_with(|| b.cmp(a))
}
