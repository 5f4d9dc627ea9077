// SPDX-License-Identifier: MPL-2.0

//! Project configuration: reading and writing `elm.json`.
//!
//! An `elm.json` is either an *application* manifest (four dependency
//! sections, each mapping to an exact [`Version`]) or a *package* manifest
//! (two sections, each mapping to a [`Range`]).

use crate::version::{Range, Version};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A package identifier: `author/name`.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Pkg {
    /// Author (GitHub user or organization) of the package.
    pub author: String,
    /// Package name.
    pub name: String,
}

/// Error parsing a [`Pkg`] from `"author/name"`.
#[derive(Error, Debug, PartialEq)]
#[error("no author/name separator found in `{0}`; expected \"author/name\"")]
pub struct PkgParseError(pub String);

impl Pkg {
    /// Build a package identifier from its two components.
    pub fn new(author: impl Into<String>, name: impl Into<String>) -> Self {
        Pkg {
            author: author.into(),
            name: name.into(),
        }
    }

    /// `<elm_home>/<elm_version>/packages/<author>/<name>/`, the directory
    /// holding every installed version of this package.
    pub fn config_path(
        &self,
        elm_home: impl AsRef<std::path::Path>,
        elm_version: &str,
    ) -> std::path::PathBuf {
        elm_home
            .as_ref()
            .join(elm_version)
            .join("packages")
            .join(&self.author)
            .join(&self.name)
    }

    /// The URL of this package's page on the registry server:
    /// `<remote_base_url>/packages/<author>/<name>`.
    pub fn to_url(&self, remote_base_url: &str) -> String {
        format!("{}/packages/{}/{}", remote_base_url, self.author, self.name)
    }
}

impl FromStr for Pkg {
    type Err = PkgParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sep = s.find('/').ok_or_else(|| PkgParseError(s.to_string()))?;
        Ok(Pkg {
            author: s[..sep].to_string(),
            name: s[sep + 1..].to_string(),
        })
    }
}

impl fmt::Display for Pkg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.author, self.name)
    }
}

impl Serialize for Pkg {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pkg {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A version range, as it appears in a package manifest's dependency map.
/// Newtype so (de)serialization can go through [`Range::parse`]/`Display`
/// instead of a derived struct representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint(pub Range);

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Range::parse(&s).map(Constraint).map_err(serde::de::Error::custom)
    }
}

/// The parsed contents of an `elm.json`, keyed by its `"type"` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Manifest {
    /// An application: pins every dependency to an exact version.
    Application(ApplicationManifest),
    /// A package: constrains every dependency to a range.
    Package(PackageManifest),
}

/// `elm.json` of an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationManifest {
    /// Source directories, copied through unmodified.
    pub source_directories: Vec<String>,
    /// Compiler version this application targets.
    pub elm_version: Version,
    /// Normal dependency sections (direct + indirect).
    pub dependencies: AppDependencies,
    /// Test-only dependency sections (direct + indirect).
    pub test_dependencies: AppDependencies,
}

/// The direct/indirect split of an application's dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppDependencies {
    /// Packages the application imports directly.
    pub direct: BTreeMap<Pkg, Version>,
    /// Packages pulled in transitively.
    pub indirect: BTreeMap<Pkg, Version>,
}

/// `elm.json` of a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageManifest {
    /// Package identifier.
    pub name: Pkg,
    /// One-line summary.
    pub summary: String,
    /// SPDX license identifier.
    pub license: String,
    /// Version of this package.
    pub version: Version,
    /// Compiler version range this package supports.
    pub elm_version: Constraint,
    /// Exposed modules.
    pub exposed_modules: ExposedModules,
    /// Dependencies, each constrained by a range.
    pub dependencies: BTreeMap<Pkg, Constraint>,
    /// Test-only dependencies, each constrained by a range.
    #[serde(rename = "test-dependencies")]
    pub test_dependencies: BTreeMap<Pkg, Constraint>,
}

/// A package's exposed module list, flat or grouped by category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExposedModules {
    /// All modules exposed at the same level.
    Flat(Vec<String>),
    /// Modules grouped under category names.
    Categorized(BTreeMap<String, Vec<String>>),
}

impl PackageManifest {
    /// Iterate over this package's normal dependencies as `(pkg, range)`.
    pub fn dependencies_iter(&self) -> impl Iterator<Item = (&Pkg, &Range)> {
        self.dependencies.iter().map(|(p, c)| (p, &c.0))
    }
}

impl Manifest {
    /// Parse an `elm.json` from its JSON text.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// The top-level key sequence of `s` as it was written, for
    /// [`crate::plan::render_manifest`] to reproduce on write instead of
    /// imposing a fixed order. Empty for anything that isn't a JSON object.
    pub fn top_level_key_order(s: &str) -> Result<Vec<String>, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(s)?;
        Ok(match value {
            serde_json::Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }

    /// Serialize back to JSON with `serde_json`'s default formatting.
    /// `epm-cli` writes manifests back to disk through
    /// [`crate::plan::render_manifest`] instead, which preserves the
    /// original top-level key order, sorts nested object keys, and uses
    /// the project's 4-space indent convention.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
