// SPDX-License-Identifier: MPL-2.0

//! The PubGrub resolver: unit propagation and conflict-driven clause
//! learning over version ranges, built directly on the `pubgrub` crate's
//! own solver entry point.
//!
//! The [`Adapter`] below bridges our own [`EpmProvider`] trait to
//! `pubgrub`'s `DependencyProvider`, so the same solve code drives both
//! the V1 and V2 registries interchangeably.

use crate::error::ResolveError;
use crate::manifest::Pkg;
use crate::registry::DependencyProvider as EpmProvider;
use crate::version::{Range, Version};
use pubgrub::error::PubGrubError;
use pubgrub::range::Range as PubgrubRange;
use pubgrub::report::{DefaultStringReporter, Reporter};
use pubgrub::solver::{choose_package_with_fewest_versions, Dependencies};
use pubgrub::type_aliases::Map;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::error::Error as StdError;

/// The root package's fixed synthetic identity.
fn root_pkg() -> Pkg {
    Pkg::new("root", "")
}

fn root_version() -> Version {
    Version::new(1, 0, 0)
}

/// Which constraints already-installed packages keep during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Every already-pinned package keeps its exact version.
    Conservative,
    /// The target package's pin is dropped; everything else stays pinned.
    Upgrade,
    /// The target package's pin is dropped and its constraint widened to
    /// `any`, ignoring even its current major version.
    MajorUpgrade,
}

/// Adapts an [`EpmProvider`] plus a fixed set of root dependencies into
/// `pubgrub`'s own `DependencyProvider` trait. The root package is
/// intercepted here and never forwarded to the underlying registry.
struct Adapter<'a> {
    registry: &'a dyn EpmProvider,
    root_deps: BTreeMap<Pkg, Range>,
}

impl<'a> pubgrub::solver::DependencyProvider<Pkg, Version> for Adapter<'a> {
    fn choose_package_version<T: Borrow<Pkg>, U: Borrow<PubgrubRange<Version>>>(
        &self,
        potential_packages: impl Iterator<Item = (T, U)>,
    ) -> Result<(T, Option<Version>), Box<dyn StdError>> {
        // TODO: propagate registry errors instead of treating "unknown" as
        // "no versions".
        Ok(choose_package_with_fewest_versions(
            |p: &Pkg| {
                if *p == root_pkg() {
                    vec![root_version()].into_iter()
                } else {
                    self.registry.get_versions(p).unwrap_or_default().into_iter()
                }
            },
            potential_packages,
        ))
    }

    fn get_dependencies(
        &self,
        package: &Pkg,
        version: &Version,
    ) -> Result<Dependencies<Pkg, Version>, Box<dyn StdError>> {
        if *package == root_pkg() {
            let mut map: Map<Pkg, PubgrubRange<Version>> = Map::default();
            for (p, r) in &self.root_deps {
                map.insert(p.clone(), r.to_pubgrub());
            }
            return Ok(Dependencies::Known(map));
        }
        let deps = self.registry.get_dependencies(package, version)?;
        let mut map: Map<Pkg, PubgrubRange<Version>> = Map::default();
        for (p, r) in deps {
            map.insert(p, r.to_pubgrub());
        }
        Ok(Dependencies::Known(map))
    }
}

/// Build the root constraint set for one [`Strategy`], starting from
/// `base_constraints` (at minimum, the caller's desired range for
/// `target`) and the currently pinned versions.
///
/// Every already-pinned package other than `target` keeps its exact
/// version under all three strategies; they differ only in how `target`
/// itself is constrained: [`Strategy::Conservative`] pins it too (a
/// feasibility check against the existing lock), [`Strategy::Upgrade`]
/// leaves `base_constraints`'s own entry for it untouched, and
/// [`Strategy::MajorUpgrade`] widens it to `any`.
fn root_deps_for_strategy(
    base_constraints: &BTreeMap<Pkg, Range>,
    pinned: &BTreeMap<Pkg, Version>,
    target: &Pkg,
    strategy: Strategy,
) -> BTreeMap<Pkg, Range> {
    let mut deps = base_constraints.clone();
    for (pkg, version) in pinned {
        if pkg == target {
            continue;
        }
        let pinned_range = Range::exact(*version);
        let entry = deps.entry(pkg.clone()).or_insert_with(Range::any);
        *entry = entry.intersection(&pinned_range);
    }
    match strategy {
        Strategy::Conservative => {
            if let Some(v) = pinned.get(target) {
                deps.insert(target.clone(), Range::exact(*v));
            }
        }
        Strategy::Upgrade => {}
        Strategy::MajorUpgrade => {
            deps.insert(target.clone(), Range::any());
        }
    }
    deps
}

/// Resolve `root_deps` against `registry` under one [`Strategy`].
pub fn solve_with_strategy(
    registry: &dyn EpmProvider,
    base_constraints: &BTreeMap<Pkg, Range>,
    pinned: &BTreeMap<Pkg, Version>,
    target: &Pkg,
    strategy: Strategy,
) -> Result<BTreeMap<Pkg, Version>, ResolveError> {
    let root_deps = root_deps_for_strategy(base_constraints, pinned, target, strategy);
    let adapter = Adapter {
        registry,
        root_deps,
    };
    let mut solution = pubgrub::solver::resolve(&adapter, root_pkg(), root_version())
        .map_err(pubgrub_error_to_resolve_error)?;
    solution.remove(&root_pkg());
    Ok(solution.into_iter().collect())
}

/// Try [`Strategy::Conservative`], then [`Strategy::Upgrade`], then
/// [`Strategy::MajorUpgrade`], returning the first that succeeds.
pub fn solve(
    registry: &dyn EpmProvider,
    base_constraints: &BTreeMap<Pkg, Range>,
    pinned: &BTreeMap<Pkg, Version>,
    target: &Pkg,
) -> Result<BTreeMap<Pkg, Version>, ResolveError> {
    let mut last_err = None;
    for strategy in [Strategy::Conservative, Strategy::Upgrade, Strategy::MajorUpgrade] {
        match solve_with_strategy(registry, base_constraints, pinned, target, strategy) {
            Ok(solution) => {
                tracing::debug!(?strategy, "resolver succeeded");
                return Ok(solution);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap())
}

/// `remove(pkg)`: resolve with `pkg` dropped from the root's dependencies;
/// the packages missing from the result relative to the prior solution are
/// no longer transitively reachable.
pub fn solve_after_removal(
    registry: &dyn EpmProvider,
    base_constraints: &BTreeMap<Pkg, Range>,
    pinned: &BTreeMap<Pkg, Version>,
    target: &Pkg,
) -> Result<BTreeMap<Pkg, Version>, ResolveError> {
    let mut without_target = base_constraints.clone();
    without_target.remove(target);
    let mut pinned_without_target = pinned.clone();
    pinned_without_target.remove(target);
    solve_with_strategy(
        registry,
        &without_target,
        &pinned_without_target,
        target,
        Strategy::Conservative,
    )
}

fn pubgrub_error_to_resolve_error(err: PubGrubError<Pkg, Version>) -> ResolveError {
    match err {
        PubGrubError::NoSolution(tree) => ResolveError::NoSolution {
            explanation: DefaultStringReporter::report(&tree),
        },
        PubGrubError::SelfDependency { package, .. } => ResolveError::SelfDependency(package),
        other => ResolveError::NoSolution {
            explanation: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryEntry;

    struct FakeRegistry {
        entries: BTreeMap<Pkg, Vec<(Version, Vec<(Pkg, Range)>)>>,
    }

    impl EpmProvider for FakeRegistry {
        fn get_versions(&self, pkg: &Pkg) -> Result<Vec<Version>, crate::error::RegistryError> {
            Ok(self
                .entries
                .get(pkg)
                .map(|versions| versions.iter().map(|(v, _)| *v).collect())
                .unwrap_or_default())
        }

        fn get_dependencies(
            &self,
            pkg: &Pkg,
            version: &Version,
        ) -> Result<Vec<(Pkg, Range)>, crate::error::RegistryError> {
            Ok(self
                .entries
                .get(pkg)
                .and_then(|versions| versions.iter().find(|(v, _)| v == version))
                .map(|(_, deps)| deps.clone())
                .unwrap_or_default())
        }
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn resolves_trivial_graph() {
        let html = Pkg::new("elm", "html");
        let core = Pkg::new("elm", "core");
        let mut entries = BTreeMap::new();
        entries.insert(
            html.clone(),
            vec![(
                v("1.0.0"),
                vec![(core.clone(), Range::parse("1.0.0 <= v < 2.0.0").unwrap())],
            )],
        );
        entries.insert(core.clone(), vec![(v("1.0.5"), vec![])]);
        let registry = FakeRegistry { entries };

        let mut base = BTreeMap::new();
        base.insert(html.clone(), Range::exact(v("1.0.0")));
        let solution = solve(&registry, &base, &BTreeMap::new(), &html).unwrap();

        assert_eq!(solution.get(&html), Some(&v("1.0.0")));
        assert_eq!(solution.get(&core), Some(&v("1.0.5")));
    }

    #[test]
    fn conflicting_constraints_fail_with_no_solution() {
        let browser = Pkg::new("elm", "browser");
        let core = Pkg::new("elm", "core");
        let mut entries = BTreeMap::new();
        entries.insert(
            browser.clone(),
            vec![(
                v("1.0.0"),
                vec![(core.clone(), Range::parse("1.0.0 <= v < 2.0.0").unwrap())],
            )],
        );
        entries.insert(core.clone(), vec![(v("3.0.0"), vec![])]);
        let registry = FakeRegistry { entries };

        let mut base = BTreeMap::new();
        base.insert(browser, Range::exact(v("1.0.0")));
        base.insert(core.clone(), Range::exact(v("3.0.0")));
        let err = solve(&registry, &base, &BTreeMap::new(), &core).unwrap_err();
        assert!(matches!(err, ResolveError::NoSolution { .. }));
    }

    #[test]
    fn registry_entry_type_is_usable_as_fixture() {
        let entry = RegistryEntry {
            pkg: Pkg::new("elm", "core"),
            versions: vec![v("1.0.0")],
        };
        assert_eq!(entry.versions.len(), 1);
    }
}
