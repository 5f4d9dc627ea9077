// SPDX-License-Identifier: MPL-2.0

//! Registry layer: a uniform "enumerate versions" / "fetch dependencies"
//! interface over the two on-the-wire protocols, V1 ([`v1`]) and V2 ([`v2`]).

pub mod v1;
pub mod v2;

use crate::error::RegistryError;
use crate::manifest::Pkg;
use crate::version::{Range, Version};

/// `(author, name, versions)`, newest first, strictly decreasing, duplicate
/// free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// The package this entry describes.
    pub pkg: Pkg,
    /// Known versions, newest first.
    pub versions: Vec<Version>,
}

impl RegistryEntry {
    /// Insert `v` preserving the newest-first, duplicate-free invariant.
    /// A no-op if `v` is already present.
    pub fn add_version(&mut self, v: Version) {
        match self.versions.binary_search_by(|existing| v.cmp(existing)) {
            Ok(_) => {}
            Err(pos) => self.versions.insert(pos, v),
        }
    }

    fn assert_invariant(&self) {
        debug_assert!(self.versions.windows(2).all(|w| w[0] > w[1]));
    }
}

/// The narrow interface PubGrub's resolver consumes, implemented by both
/// protocol variants. Package id 0 is reserved for the synthetic root
/// package and never reaches this trait.
pub trait DependencyProvider {
    /// Every known version of `pkg`, newest first, `valid` status only.
    fn get_versions(&self, pkg: &Pkg) -> Result<Vec<Version>, RegistryError>;

    /// The dependency edges of `(pkg, version)`.
    fn get_dependencies(
        &self,
        pkg: &Pkg,
        version: &Version,
    ) -> Result<Vec<(Pkg, Range)>, RegistryError>;
}

/// Which wire protocol is active for this process. Chosen once at startup
/// by [`crate::protocol::ProtocolGate`] and never switched mid-run.
pub enum Registry {
    /// Legacy protocol: versions list on disk, per-version manifests fetched
    /// lazily.
    V1(v1::RegistryV1),
    /// Newer protocol: a single index with the full dependency graph.
    V2(v2::RegistryV2),
}

impl DependencyProvider for Registry {
    fn get_versions(&self, pkg: &Pkg) -> Result<Vec<Version>, RegistryError> {
        match self {
            Registry::V1(r) => r.get_versions(pkg),
            Registry::V2(r) => r.get_versions(pkg),
        }
    }

    fn get_dependencies(
        &self,
        pkg: &Pkg,
        version: &Version,
    ) -> Result<Vec<(Pkg, Range)>, RegistryError> {
        match self {
            Registry::V1(r) => r.get_dependencies(pkg, version),
            Registry::V2(r) => r.get_dependencies(pkg, version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn add_version_keeps_newest_first_and_dedups() {
        let mut entry = RegistryEntry {
            pkg: Pkg::new("elm", "core"),
            versions: vec![v("2.0.0"), v("1.0.0")],
        };
        entry.add_version(v("1.5.0"));
        entry.add_version(v("2.0.0"));
        assert_eq!(entry.versions, vec![v("2.0.0"), v("1.5.0"), v("1.0.0")]);
        entry.assert_invariant();
    }
}
