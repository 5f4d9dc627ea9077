// SPDX-License-Identifier: MPL-2.0

//! The error taxonomy: one `thiserror` enum per component,
//! aggregated into a single [`Error`] the CLI can bubble through `anyhow`.

use crate::manifest::Pkg;
use crate::version::{RangeParseError, Version, VersionParseError};
use thiserror::Error;

/// Errors from the registry layer (both V1 and V2).
#[derive(Error, Debug)]
pub enum RegistryError {
    /// `(author, name)` has no entry in the registry.
    #[error("package `{0}` not found in the registry")]
    NotFound(Pkg),

    /// A version was requested that the registry does not list.
    #[error("version {version} of `{pkg}` is not available; known versions: {known:?}")]
    VersionNotAvailable {
        /// The package in question.
        pkg: Pkg,
        /// The version that was requested.
        version: Version,
        /// The versions the registry actually knows about.
        known: Vec<Version>,
    },

    /// The on-disk `registry.dat` or the V2 index failed to parse.
    #[error("registry file `{path}` is corrupt and must be resynced: {reason}")]
    CorruptRegistry {
        /// Path to the file that failed to parse.
        path: String,
        /// Why parsing failed.
        reason: String,
    },

    /// A transient network failure while fetching registry data.
    #[error("network error fetching `{url}`")]
    Network {
        /// URL being fetched.
        url: String,
        /// Underlying transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No cached registry exists and the network is unavailable.
    #[error("offline and no cached registry is available")]
    OfflineRequired,

    /// A range string embedded in registry data failed to parse.
    #[error(transparent)]
    RangeParse(#[from] RangeParseError),

    /// A version string embedded in registry data failed to parse.
    #[error(transparent)]
    VersionParse(#[from] VersionParseError),

    /// Failure reading or writing a registry file.
    #[error("I/O error on `{path}`")]
    Io {
        /// Path being read or written.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failure (de)serializing registry JSON payloads (V1 `/all-packages`).
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Failure reading the V2 zip archive.
    #[error("failed to read zip index `{path}`: {source}")]
    Zip {
        /// Path to the zip file.
        path: String,
        /// Underlying zip error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors from the cache store.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A cache directory exists but lacks a populated `src/`.
    #[error("cache entry `{0}/{1}/{2}` is corrupt (missing or empty src/)")]
    Corrupt(String, String, Version),

    /// Failure performing a filesystem operation on the cache.
    #[error("I/O error on `{path}`")]
    Io {
        /// Path being manipulated.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the package fetcher.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The downloaded archive's SHA-1 did not match the registry's hash.
    #[error("checksum mismatch for `{pkg}@{version}`: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Package being fetched.
        pkg: Pkg,
        /// Version being fetched.
        version: Version,
        /// Hash the registry advertised.
        expected: String,
        /// Hash actually computed.
        actual: String,
    },

    /// A transient network failure while downloading a package.
    #[error("network error fetching `{url}`")]
    Network {
        /// URL being fetched.
        url: String,
        /// Underlying transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The archive had no entry containing an `elm.json`.
    #[error("archive `{0}` has no package root (no entry contains elm.json)")]
    NoPackageRoot(String),

    /// A zip entry attempted path traversal (`..` or an absolute path).
    #[error("zip entry `{0}` attempted path traversal")]
    PathTraversal(String),

    /// Failure reading the downloaded archive.
    #[error("failed to read archive `{path}`: {source}")]
    Archive {
        /// Path to the archive.
        path: String,
        /// Underlying zip error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Underlying cache-store failure while installing the fetched package.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Failure performing a filesystem operation during fetch/extract.
    #[error("I/O error on `{path}`")]
    Io {
        /// Path being manipulated.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the PubGrub resolver.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// PubGrub's unit propagation derived the empty incompatibility.
    #[error("no solution found: {explanation}")]
    NoSolution {
        /// A rendered conflict derivation.
        explanation: String,
    },

    /// The dependency provider errored while the resolver was querying it.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The root package depended on itself.
    #[error("package `{0}` depends on itself")]
    SelfDependency(Pkg),
}

/// Errors from the plan applier.
#[derive(Error, Debug)]
pub enum PlanError {
    /// The atomic write-then-rename sequence failed.
    #[error("failed to write manifest `{path}`")]
    ManifestWrite {
        /// Path to the manifest.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failure serializing the manifest back to JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// An `author/name` string that does not contain a `/`.
#[derive(Error, Debug)]
#[error("`{0}` is not a valid package name; expected \"author/name\"")]
pub struct InvalidPackageName(pub String);

/// Every error this crate can produce, aggregated so `epm-cli` can bubble
/// everything through one `anyhow::Result` at the command top level.
#[derive(Error, Debug)]
pub enum Error {
    /// See [`RegistryError`].
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// See [`CacheError`].
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// See [`FetchError`].
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// See [`ResolveError`].
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// See [`PlanError`].
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// See [`VersionParseError`].
    #[error(transparent)]
    VersionParse(#[from] VersionParseError),
    /// See [`RangeParseError`].
    #[error(transparent)]
    RangeParse(#[from] RangeParseError),
    /// An `author/name` argument did not parse.
    #[error(transparent)]
    InvalidPackageName(#[from] InvalidPackageName),
}
