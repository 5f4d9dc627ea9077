// SPDX-License-Identifier: MPL-2.0

//! S5 — with only a newer *minor* release available, a regular upgrade
//! (conservative/upgrade strategies) takes it; forcing a *major* release
//! to be available requires `Strategy::MajorUpgrade`, since the pinned
//! package's own range otherwise stays bounded below the next major.

mod common;

use epm_core::manifest::Pkg;
use epm_core::registry::v2::RegistryV2;
use epm_core::resolver::{self, Strategy};
use epm_core::version::Range;
use std::collections::BTreeMap;

const INDEX: &str = "\
format 2
elm 0.19.1

package: elm/core
    version: 1.0.0
    status: valid
    license: BSD-3-Clause
    dependencies:
package: elm/core
    version: 1.2.0
    status: valid
    license: BSD-3-Clause
    dependencies:
package: elm/core
    version: 2.0.0
    status: valid
    license: BSD-3-Clause
    dependencies:
";

fn v(s: &str) -> epm_core::version::Version {
    s.parse().unwrap()
}

#[test]
fn regular_upgrade_stays_within_the_pinned_major_version() {
    let registry = RegistryV2::load_from_text(INDEX).unwrap();
    let core = Pkg::new("elm", "core");

    let mut pinned = BTreeMap::new();
    pinned.insert(core.clone(), v("1.0.0"));
    let mut base = BTreeMap::new();
    base.insert(core.clone(), Range::between(v("1.0.0"), v("2.0.0")));

    let solution =
        resolver::solve_with_strategy(&registry, &base, &pinned, &core, Strategy::Upgrade)
            .unwrap();
    assert_eq!(solution.get(&core), Some(&v("1.2.0")));
}

#[test]
fn major_upgrade_crosses_the_major_version_boundary() {
    let registry = RegistryV2::load_from_text(INDEX).unwrap();
    let core = Pkg::new("elm", "core");

    let mut pinned = BTreeMap::new();
    pinned.insert(core.clone(), v("1.0.0"));
    let base = BTreeMap::new();

    let solution =
        resolver::solve_with_strategy(&registry, &base, &pinned, &core, Strategy::MajorUpgrade)
            .unwrap();
    assert_eq!(solution.get(&core), Some(&v("2.0.0")));

    let regular =
        resolver::solve_with_strategy(&registry, &base, &pinned, &core, Strategy::Conservative)
            .unwrap();
    assert_eq!(regular.get(&core), Some(&v("1.0.0")));
}
