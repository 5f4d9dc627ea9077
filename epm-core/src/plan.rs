// SPDX-License-Identifier: MPL-2.0

//! The plan applier: diff a resolved version set against the current
//! manifest, classify each change into the right section, and
//! re-serialize atomically.
//!
//! A solved version set is partitioned into `(direct, indirect)` for
//! applications, or into exact-vs-next-major-bound constraints for
//! packages, depending on which manifest section it lands in.

use crate::error::PlanError;
use crate::manifest::{
    AppDependencies, ApplicationManifest, Constraint, Manifest, PackageManifest, Pkg,
};
use crate::version::{Range, Version};
use std::collections::BTreeMap;
use std::path::Path;

/// One entry of an [`InstallPlan`]: `old_version = None` means "newly
/// added", otherwise an upgrade or downgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageChange {
    /// The package changing.
    pub pkg: Pkg,
    /// Its version before this operation, if it was already present.
    pub old_version: Option<Version>,
    /// Its version after this operation.
    pub new_version: Version,
}

/// An ordered, `(author, name)`-sorted sequence of [`PackageChange`]s.
#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    /// The changes, sorted by package identity.
    pub changes: Vec<PackageChange>,
}

impl InstallPlan {
    /// Diff a freshly resolved set against the versions already recorded
    /// in the manifest (spec's `S` vs `S_prev`).
    pub fn diff(solution: &BTreeMap<Pkg, Version>, previous: &BTreeMap<Pkg, Version>) -> Self {
        let mut changes: Vec<PackageChange> = solution
            .iter()
            .map(|(pkg, new_version)| PackageChange {
                pkg: pkg.clone(),
                old_version: previous.get(pkg).copied(),
                new_version: *new_version,
            })
            .collect();
        changes.sort_by(|a, b| a.pkg.cmp(&b.pkg));
        InstallPlan { changes }
    }

    /// Only the entries that are genuinely new (`old_version.is_none()`).
    pub fn additions(&self) -> impl Iterator<Item = &PackageChange> {
        self.changes.iter().filter(|c| c.old_version.is_none())
    }

    /// Whether anything actually changes.
    pub fn is_empty(&self) -> bool {
        self.changes
            .iter()
            .all(|c| c.old_version == Some(c.new_version))
    }
}

/// Apply a resolved set to an *application* manifest:
/// `target` lands in `dependencies.direct` (or `.test.direct` if
/// `is_test`); every other resolved package that was already present
/// keeps its prior section; every newly resolved non-target package lands
/// in the matching `indirect` section.
pub fn apply_to_application(
    manifest: &mut ApplicationManifest,
    target: &Pkg,
    is_test: bool,
    solution: &BTreeMap<Pkg, Version>,
) {
    let (direct_section, indirect_section) = if is_test {
        (&mut manifest.test_dependencies.direct, &mut manifest.test_dependencies.indirect)
    } else {
        (&mut manifest.dependencies.direct, &mut manifest.dependencies.indirect)
    };

    let prior_direct: BTreeMap<Pkg, Version> = direct_section.clone();
    let prior_indirect: BTreeMap<Pkg, Version> = indirect_section.clone();

    direct_section.clear();
    indirect_section.clear();

    for (pkg, version) in solution {
        if pkg == target {
            direct_section.insert(pkg.clone(), *version);
            continue;
        }
        if prior_direct.contains_key(pkg) {
            direct_section.insert(pkg.clone(), *version);
        } else {
            indirect_section.insert(pkg.clone(), *version);
        }
    }
    let _ = prior_indirect;
}

/// Apply a resolved set to a *package* manifest: `target` is written
/// with whichever constraint the
/// caller directed (typically `Range::exact`-derived from the installed
/// version); every other resolved package is written into `dependencies`
/// bounded by its next major version, the project's convention.
pub fn apply_to_package(
    manifest: &mut PackageManifest,
    target: &Pkg,
    target_constraint: Constraint,
    is_test: bool,
    solution: &BTreeMap<Pkg, Version>,
) {
    let section = if is_test {
        &mut manifest.test_dependencies
    } else {
        &mut manifest.dependencies
    };
    section.clear();
    for (pkg, version) in solution {
        if pkg == target {
            section.insert(pkg.clone(), target_constraint.clone());
        } else {
            section.insert(pkg.clone(), Constraint(bounded_by_next_major(*version)));
        }
    }
}

/// `"X.Y.Z <= v < X+1.0.0"`, the project convention for a freshly resolved
/// transitive dependency in a package manifest.
fn bounded_by_next_major(v: Version) -> Range {
    Range::between(v, next_major(v))
}

fn next_major(v: Version) -> Version {
    let (major, _minor, _patch) = version_triple(v);
    Version::new(major as u32 + 1, 0, 0)
}

fn version_triple(v: Version) -> (u16, u16, u16) {
    let rendered = v.to_string();
    let mut parts = rendered.splitn(3, '.');
    let major = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let minor = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let patch = parts.next().unwrap_or("0").parse().unwrap_or(0);
    (major, minor, patch)
}

/// Remove `target` from an application manifest's direct sections
/// (`elm uninstall`); anything it alone pulled in transitively is left for
/// the caller to re-resolve and pass back through [`apply_to_application`].
pub fn remove_from_application(manifest: &mut ApplicationManifest, target: &Pkg, is_test: bool) {
    let deps: &mut AppDependencies = if is_test {
        &mut manifest.test_dependencies
    } else {
        &mut manifest.dependencies
    };
    deps.direct.remove(target);
    deps.indirect.remove(target);
}

/// Serialize `manifest` with a 4-space indent and a trailing newline.
/// Top-level keys follow `original_order` — the sequence they appeared in
/// when the file was read, so an edit doesn't reshuffle the file's own
/// layout — falling back to field-declaration order for any key missing
/// from it (notably, every key, when there was no prior file to read).
/// Nested objects are sorted ascending by key, since they have no
/// "as read" order worth preserving (maps keyed by package identity).
pub fn render_manifest(manifest: &Manifest, original_order: &[String]) -> Result<String, PlanError> {
    let value = serde_json::to_value(manifest)?;
    let ordered = match value {
        serde_json::Value::Object(map) => {
            let mut ordered = serde_json::Map::new();
            for key in original_order {
                if let Some(v) = map.get(key) {
                    ordered.insert(key.clone(), sort_object_keys(v.clone()));
                }
            }
            for (key, v) in map {
                if !ordered.contains_key(&key) {
                    ordered.insert(key, sort_object_keys(v));
                }
            }
            serde_json::Value::Object(ordered)
        }
        other => sort_object_keys(other),
    };
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(&ordered, &mut serializer)?;
    let mut rendered = String::from_utf8(buf).expect("serde_json output is valid UTF-8");
    rendered.push('\n');
    Ok(rendered)
}

/// Sort an object's keys ascending, recursively. Applied only to values
/// nested under the top level — [`render_manifest`] orders the top level
/// itself from `original_order`.
fn sort_object_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, serde_json::Value> = map
                .into_iter()
                .map(|(k, v)| (k, sort_object_keys(v)))
                .collect();
            serde_json::to_value(sorted).expect("BTreeMap serializes back to an object")
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_object_keys).collect())
        }
        other => other,
    }
}

/// Serialize `manifest` via [`render_manifest`] and write it atomically
/// (temp file, then rename) to `path`.
pub fn write_manifest_atomic(
    manifest: &Manifest,
    original_order: &[String],
    path: &Path,
) -> Result<(), PlanError> {
    let rendered = render_manifest(manifest, original_order)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, rendered.as_bytes()).map_err(|source| PlanError::ManifestWrite {
        path: tmp_path.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| PlanError::ManifestWrite {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "wrote manifest");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ExposedModules;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn sample_application() -> ApplicationManifest {
        ApplicationManifest {
            source_directories: vec!["src".to_string()],
            elm_version: v("0.19.1"),
            dependencies: AppDependencies {
                direct: BTreeMap::new(),
                indirect: BTreeMap::new(),
            },
            test_dependencies: AppDependencies {
                direct: BTreeMap::new(),
                indirect: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn diff_classifies_additions_and_upgrades() {
        let core = Pkg::new("elm", "core");
        let html = Pkg::new("elm", "html");
        let mut previous = BTreeMap::new();
        previous.insert(core.clone(), v("1.0.0"));
        let mut solution = BTreeMap::new();
        solution.insert(core.clone(), v("1.0.5"));
        solution.insert(html.clone(), v("1.0.0"));

        let plan = InstallPlan::diff(&solution, &previous);
        assert_eq!(plan.changes.len(), 2);
        assert_eq!(plan.additions().count(), 1);
        assert!(!plan.is_empty());
    }

    #[test]
    fn apply_to_application_splits_direct_and_indirect() {
        let mut manifest = sample_application();
        let html = Pkg::new("elm", "html");
        let core = Pkg::new("elm", "core");
        let mut solution = BTreeMap::new();
        solution.insert(html.clone(), v("1.0.0"));
        solution.insert(core.clone(), v("1.0.5"));

        apply_to_application(&mut manifest, &html, false, &solution);

        assert_eq!(manifest.dependencies.direct.get(&html), Some(&v("1.0.0")));
        assert_eq!(manifest.dependencies.indirect.get(&core), Some(&v("1.0.5")));
    }

    #[test]
    fn apply_to_package_bounds_transitive_deps_by_next_major() {
        let mut manifest = PackageManifest {
            name: Pkg::new("elm", "test-package"),
            summary: "test".to_string(),
            license: "BSD-3-Clause".to_string(),
            version: v("1.0.0"),
            elm_version: Constraint(Range::parse("0.19.0 <= v < 0.20.0").unwrap()),
            exposed_modules: ExposedModules::Flat(vec!["Main".to_string()]),
            dependencies: BTreeMap::new(),
            test_dependencies: BTreeMap::new(),
        };
        let core = Pkg::new("elm", "core");
        let html = Pkg::new("elm", "html");
        let mut solution = BTreeMap::new();
        solution.insert(core.clone(), v("1.0.5"));
        solution.insert(html.clone(), v("2.3.1"));

        apply_to_package(
            &mut manifest,
            &html,
            Constraint(Range::parse("2.0.0 <= v < 3.0.0").unwrap()),
            false,
            &solution,
        );

        assert_eq!(
            manifest.dependencies.get(&core).unwrap().0,
            Range::parse("1.0.5 <= v < 2.0.0").unwrap()
        );
    }
}
