// SPDX-License-Identifier: MPL-2.0

//! Version and range algebra for the elm package ecosystem.
//!
//! Versions are `major.minor.patch` triples ordered lexicographically,
//! represented by [`pubgrub::version::SemanticVersion`]. [`Range`] is a
//! newtype over [`pubgrub::range::Range`], whose own set algebra (union,
//! intersection, negation) backs every operation here; this module only
//! adds the grammar elm.json files use: `"any"` or `"<lo> <= v < <hi>"`.

use pubgrub::range::Range as PubgrubRange;
use pubgrub::version::SemanticVersion;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A `major.minor.patch` version triple.
pub type Version = SemanticVersion;

/// A version range, exactly the set pubgrub's own `Range` represents.
/// Newtype so (de)serialization and the elm.json grammar can live next to
/// the parsing/rendering logic instead of on pubgrub's type directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range(PubgrubRange<Version>);

impl Default for Range {
    fn default() -> Self {
        Range::empty()
    }
}

/// Error parsing a [`Range`] from its textual representation.
#[derive(Error, Debug, PartialEq)]
pub enum RangeParseError {
    /// Constraint must have the shape `"v1 <= v < v2"`, or be `"any"`.
    #[error("invalid format \"{0}\": constraint must have the shape \"v1 <= v < v2\" or \"any\"")]
    InvalidFormat(String),
    /// Allowed separators are `"<="` and `"<"`.
    #[error("invalid separators \"{0}\": the only separators allowed are \"<=\" and \"<\"")]
    InvalidSeparator(String),
    /// Invalid version inside the constraint.
    #[error("invalid version in constraint: {0}")]
    InvalidVersion(#[from] VersionParseError),
    /// A bare version string is not accepted in this context (package
    /// manifests must use a full range; see spec's resolved Open Question).
    #[error("bare version \"{0}\" is not a valid range here; use \"<= v <\" or \"any\"")]
    BareVersionNotAllowed(String),
}

/// Error parsing a [`Version`] from its textual representation.
#[derive(Error, Debug, PartialEq)]
#[error("failed to parse version \"{0}\": expected \"major.minor.patch\"")]
pub struct VersionParseError(pub String);

fn parse_version(s: &str) -> Result<Version, VersionParseError> {
    Version::from_str(s).map_err(|_| VersionParseError(s.to_string()))
}

impl Range {
    /// The universe: every version satisfies this range.
    pub fn any() -> Self {
        Range(PubgrubRange::any())
    }

    /// The empty range: no version satisfies it.
    pub fn empty() -> Self {
        Range(PubgrubRange::none())
    }

    /// The half-open interval `[lo, hi)`. Empty if `lo >= hi`.
    pub fn between(lo: Version, hi: Version) -> Self {
        Range(PubgrubRange::between(lo, hi))
    }

    /// The singleton range matching exactly one version: `[v, v.bump_patch())`.
    /// This is how a bare version pin in an application manifest is
    /// interpreted (the ecosystem's resolved convention for exact pins).
    pub fn exact(v: Version) -> Self {
        Range::between(v, v.bump_patch())
    }

    /// Whether `v` is a member of this range.
    pub fn contains(&self, v: &Version) -> bool {
        self.0.contains(v)
    }

    /// Whether this range matches no version.
    pub fn is_empty(&self) -> bool {
        *self == Range::empty()
    }

    /// The intersection of two ranges.
    pub fn intersection(&self, other: &Self) -> Self {
        Range(self.0.intersection(&other.0))
    }

    /// The union of two ranges.
    pub fn union(&self, other: &Self) -> Self {
        Range(self.0.union(&other.0))
    }

    /// The complement: every version not in this range.
    pub fn complement(&self) -> Self {
        Range(self.0.negate())
    }

    /// Parse a range string. Accepts `"any"` or `"<lo> <= v < <hi>"` (either
    /// separator may also be `"<"`). Bare version strings are rejected here;
    /// callers dealing with application-manifest exact pins should go
    /// through [`Range::exact`] directly instead of this parser.
    pub fn parse(s: &str) -> Result<Self, RangeParseError> {
        if s.trim() == "any" {
            return Ok(Range::any());
        }
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            [low, sep1, "v", sep2, high] => {
                let v1 = parse_version(low)?;
                let v2 = parse_version(high)?;
                if !matches!(*sep1, "<=" | "<") || !matches!(*sep2, "<=" | "<") {
                    return Err(RangeParseError::InvalidSeparator(s.to_string()));
                }
                let lo = if *sep1 == "<=" { v1 } else { v1.bump_patch() };
                let hi = if *sep2 == "<" { v2 } else { v2.bump_patch() };
                Ok(Range::between(lo, hi))
            }
            [_] if Version::from_str(s.trim()).is_ok() => {
                Err(RangeParseError::BareVersionNotAllowed(s.to_string()))
            }
            _ => Err(RangeParseError::InvalidFormat(s.to_string())),
        }
    }

    /// Borrow the underlying `pubgrub` range, for handing to the solver.
    pub fn to_pubgrub(&self) -> PubgrubRange<Version> {
        self.0.clone()
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Range {
    type Err = RangeParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Range::parse(s)
    }
}
