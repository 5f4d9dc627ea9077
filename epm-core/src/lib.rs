// SPDX-License-Identifier: MPL-2.0

//! # epm-core
//!
//! Dependency resolution and package management for Elm's package
//! ecosystem. Built on the [pubgrub crate][pubgrub], a
//! unit-propagation/conflict-driven-clause-learning solver that reports a
//! human-readable explanation on failure instead of just "no solution".
//!
//! [pubgrub]: https://github.com/pubgrub-rs/pubgrub
//!
//! ## Layout
//!
//! - [`version`]: `major.minor.patch` versions and half-open-interval ranges.
//! - [`manifest`]: reading and writing `elm.json` (application and package
//!   variants).
//! - [`registry`]: the two wire protocols (V1 binary + V2 zip index) behind
//!   one [`registry::DependencyProvider`] trait.
//! - [`cache`]: the content-addressed on-disk package cache.
//! - [`fetch`]: downloading, verifying and selectively extracting packages.
//! - [`resolver`]: the PubGrub solve itself, with conservative/upgrade/
//!   major-upgrade strategies.
//! - [`plan`]: diffing a resolved set against the current manifest and
//!   writing it back atomically.
//! - [`protocol`]: the V1/V2 protocol gate and the `Env` configuration
//!   record.
//! - [`http`]: the HTTP client seam, kept narrow so the rest of the crate
//!   never depends on `ureq` directly.
//! - [`error`]: the error taxonomy.

pub mod cache;
pub mod error;
pub mod fetch;
pub mod http;
pub mod manifest;
pub mod plan;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod version;

pub use error::Error;
