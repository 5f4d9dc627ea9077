// SPDX-License-Identifier: MPL-2.0

//! V2 registry: a single zip archive wrapping an indentation-sensitive text
//! index carrying the full dependency graph, so the resolver never needs a
//! network round-trip mid-solve.
//!
//! The parser is a hand-rolled line-based state machine rather than a
//! single-line grammar, since a stanza's fields and its nested
//! dependency list span several lines at different indentation levels.

use super::RegistryEntry;
use crate::error::RegistryError;
use crate::manifest::Pkg;
use crate::version::{Range, Version};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

const FORMAT_LINE: &str = "format 2";

/// Status of one version record in the V2 index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Offered to the resolver.
    Valid,
    /// Superseded; never offered.
    Obsolete,
    /// Listed but its source is gone.
    Missing,
    /// Listed but its dependency graph could not be computed upstream.
    MissingDeps,
}

impl FromStr for Status {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(Status::Valid),
            "obsolete" => Ok(Status::Obsolete),
            "missing" => Ok(Status::Missing),
            "missing-deps" => Ok(Status::MissingDeps),
            other => Err(format!("unknown status `{}`", other)),
        }
    }
}

/// One `version:` record inside a `package:` block.
#[derive(Debug, Clone)]
struct VersionRecord {
    version: Version,
    status: Status,
    #[allow(dead_code)]
    license: String,
    dependencies: Vec<(Pkg, Range)>,
}

/// The fully parsed V2 index: per-package version records plus whatever
/// versions are `valid`, exposed through [`RegistryEntry`]s for the
/// resolver.
#[derive(Debug)]
pub struct RegistryV2 {
    packages: BTreeMap<Pkg, Vec<VersionRecord>>,
}

impl RegistryV2 {
    /// Load the index from a zip archive containing exactly one text file.
    pub fn load_from_zip(path: &Path) -> Result<Self, RegistryError> {
        let file = std::fs::File::open(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| RegistryError::Zip {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        if archive.len() != 1 {
            tracing::warn!(
                entries = archive.len(),
                "V2 index archive has more than one entry; using the first"
            );
        }
        let mut text = String::new();
        archive
            .by_index(0)
            .map_err(|e| RegistryError::Zip {
                path: path.display().to_string(),
                source: Box::new(e),
            })?
            .read_to_string(&mut text)
            .map_err(|source| RegistryError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::load_from_text(&text)
    }

    /// Load the index from plain indented text (used both for the zip's
    /// inner file and for the local-dev overlay).
    pub fn load_from_text(text: &str) -> Result<Self, RegistryError> {
        parse_index(text).map_err(|reason| RegistryError::CorruptRegistry {
            path: "<v2 index>".to_string(),
            reason,
        })
    }

    /// Merge a local-dev overlay on top of this index: append versions the
    /// overlay has that this index lacks; never remove anything.
    pub fn merge_local_dev_overlay(&mut self, overlay: &RegistryV2) {
        for (pkg, overlay_versions) in &overlay.packages {
            let existing = self.packages.entry(pkg.clone()).or_default();
            for record in overlay_versions {
                if !existing.iter().any(|r| r.version == record.version) {
                    existing.push(record.clone());
                }
            }
        }
    }

    /// Look up an entry, restricted to `valid` versions, newest first.
    pub fn find(&self, pkg: &Pkg) -> Option<RegistryEntry> {
        let records = self.packages.get(pkg)?;
        let mut versions: Vec<Version> = records
            .iter()
            .filter(|r| r.status == Status::Valid)
            .map(|r| r.version)
            .collect();
        versions.sort_by(|a, b| b.cmp(a));
        Some(RegistryEntry {
            pkg: pkg.clone(),
            versions,
        })
    }

    /// Look up a specific `(author, name, major.minor.patch)` record.
    pub fn find_version(&self, pkg: &Pkg, version: &Version) -> Option<&VersionRecord> {
        self.packages
            .get(pkg)?
            .iter()
            .find(|r| r.version == *version)
    }
}

impl super::DependencyProvider for RegistryV2 {
    fn get_versions(&self, pkg: &Pkg) -> Result<Vec<Version>, RegistryError> {
        Ok(self.find(pkg).map(|e| e.versions).unwrap_or_default())
    }

    fn get_dependencies(
        &self,
        pkg: &Pkg,
        version: &Version,
    ) -> Result<Vec<(Pkg, Range)>, RegistryError> {
        match self.find_version(pkg, version) {
            Some(record) => Ok(record.dependencies.clone()),
            None => Err(RegistryError::VersionNotAvailable {
                pkg: pkg.clone(),
                version: *version,
                known: self.get_versions(pkg)?,
            }),
        }
    }
}

enum ParseMode {
    TopLevel,
    InPackage,
    InVersion,
    InDependencies,
}

fn parse_index(text: &str) -> Result<RegistryV2, String> {
    let mut lines = text.lines().peekable();
    // Tolerate a missing trailing newline or CRLF: `.lines()` already
    // splits on both `\n` and `\r\n`.
    let header = lines.next().ok_or("empty index")?.trim_end();
    if header != FORMAT_LINE {
        return Err(format!(
            "unsupported index format `{}`, expected `{}`",
            header, FORMAT_LINE
        ));
    }
    let _compiler_line = lines.next(); // "<compiler-name> <compiler-version>"

    let mut packages: BTreeMap<Pkg, Vec<VersionRecord>> = BTreeMap::new();
    let mut mode = ParseMode::TopLevel;
    let mut current_pkg: Option<Pkg> = None;
    let mut current_version: Option<Version> = None;
    let mut current_status: Option<Status> = None;
    let mut current_license: Option<String> = None;
    let mut current_deps: Vec<(Pkg, Range)> = Vec::new();

    // Flushing happens only at stanza boundaries (a new `version:` or a
    // new `package:` line, or end of input) — never mid-stanza. A
    // `dependencies:` line merely opens the dependency list that the
    // following 8-space lines belong to; flushing there would cut the
    // stanza off before its own dependencies were read.
    macro_rules! flush_version {
        () => {
            if let (Some(pkg), Some(version), Some(status), Some(license)) = (
                current_pkg.clone(),
                current_version.take(),
                current_status.take(),
                current_license.take(),
            ) {
                packages.entry(pkg).or_default().push(VersionRecord {
                    version,
                    status,
                    license,
                    dependencies: std::mem::take(&mut current_deps),
                });
            }
        };
    }

    for raw_line in lines {
        if raw_line.trim().is_empty() {
            continue;
        }
        let indent = raw_line.len() - raw_line.trim_start().len();
        let line = raw_line.trim_end();
        let content = line.trim_start();

        match indent {
            0 => {
                flush_version!();
                let rest = content
                    .strip_prefix("package:")
                    .ok_or_else(|| format!("expected `package:`, got `{}`", content))?
                    .trim();
                current_pkg = Some(Pkg::from_str(rest).map_err(|e| e.to_string())?);
                mode = ParseMode::InPackage;
            }
            4 => {
                if let Some(rest) = content.strip_prefix("version:") {
                    flush_version!();
                    current_version =
                        Some(Version::from_str(rest.trim()).map_err(|e| e.to_string())?);
                    mode = ParseMode::InVersion;
                } else if let Some(rest) = content.strip_prefix("status:") {
                    current_status = Some(Status::from_str(rest.trim())?);
                } else if let Some(rest) = content.strip_prefix("license:") {
                    current_license = Some(rest.trim().to_string());
                } else if content.starts_with("dependencies:") {
                    mode = ParseMode::InDependencies;
                } else {
                    return Err(format!("unexpected 4-space line `{}`", content));
                }
            }
            8 => {
                if !matches!(mode, ParseMode::InDependencies) {
                    return Err(format!(
                        "unexpected 8-space line `{}` outside dependencies:",
                        content
                    ));
                }
                let (dep_pkg, dep_range) = content
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| format!("malformed dependency line `{}`", content))?;
                let pkg = Pkg::from_str(dep_pkg.trim()).map_err(|e| e.to_string())?;
                let range = Range::parse(dep_range.trim()).map_err(|e| e.to_string())?;
                current_deps.push((pkg, range));
            }
            other => return Err(format!("unexpected indentation level {}", other)),
        }
    }
    flush_version!();
    let _ = current_pkg; // silence unused-assignment warning on the final iteration
    Ok(RegistryV2 { packages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DependencyProvider;

    const SAMPLE: &str = "format 2\nelm 0.19.1\n\npackage: elm/core\n    version: 1.0.5\n    status: valid\n    license: BSD-3-Clause\n    dependencies:\npackage: elm/html\n    version: 1.0.0\n    status: valid\n    license: BSD-3-Clause\n    dependencies:\n        elm/core  1.0.0 <= v < 2.0.0\n";

    #[test]
    fn parses_sample_index() {
        let registry = RegistryV2::load_from_text(SAMPLE).unwrap();
        let html = Pkg::new("elm", "html");
        let versions = registry.get_versions(&html).unwrap();
        assert_eq!(versions, vec!["1.0.0".parse().unwrap()]);
        let deps = registry
            .get_dependencies(&html, &"1.0.0".parse().unwrap())
            .unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].0, Pkg::new("elm", "core"));
    }

    #[test]
    fn rejects_wrong_format_version() {
        let err = RegistryV2::load_from_text("format 3\n").unwrap_err();
        assert!(matches!(err, RegistryError::CorruptRegistry { .. }));
    }

    #[test]
    fn tolerates_crlf_and_missing_trailing_newline() {
        let crlf = SAMPLE.replace('\n', "\r\n");
        let trimmed = crlf.trim_end_matches("\r\n");
        assert!(RegistryV2::load_from_text(trimmed).is_ok());
    }

    #[test]
    fn local_dev_overlay_adds_without_removing() {
        let mut base = RegistryV2::load_from_text(SAMPLE).unwrap();
        let overlay = RegistryV2::load_from_text(
            "format 2\nelm 0.19.1\n\npackage: elm/core\n    version: 1.0.6\n    status: valid\n    license: BSD-3-Clause\n    dependencies:\n",
        )
        .unwrap();
        base.merge_local_dev_overlay(&overlay);
        let core = Pkg::new("elm", "core");
        let versions = base.get_versions(&core).unwrap();
        assert!(versions.contains(&"1.0.5".parse().unwrap()));
        assert!(versions.contains(&"1.0.6".parse().unwrap()));
    }
}
