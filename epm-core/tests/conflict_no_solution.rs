// SPDX-License-Identifier: MPL-2.0

//! S2 — two direct dependencies pin incompatible ranges of a shared
//! transitive dependency; the resolver must report `NoSolution` rather
//! than silently picking one side.

mod common;

use epm_core::error::ResolveError;
use epm_core::manifest::Pkg;
use epm_core::registry::v2::RegistryV2;
use epm_core::resolver;
use epm_core::version::Range;
use std::collections::BTreeMap;

const INDEX: &str = "\
format 2
elm 0.19.1

package: elm/core
    version: 1.0.5
    status: valid
    license: BSD-3-Clause
    dependencies:
package: elm/core
    version: 2.0.0
    status: valid
    license: BSD-3-Clause
    dependencies:
package: a/needs-old-core
    version: 1.0.0
    status: valid
    license: BSD-3-Clause
    dependencies:
        elm/core  1.0.0 <= v < 2.0.0
package: b/needs-new-core
    version: 1.0.0
    status: valid
    license: BSD-3-Clause
    dependencies:
        elm/core  2.0.0 <= v < 3.0.0
";

fn v(s: &str) -> epm_core::version::Version {
    s.parse().unwrap()
}

#[test]
fn conflicting_transitive_ranges_yield_no_solution() {
    let registry = RegistryV2::load_from_text(INDEX).unwrap();
    let old = Pkg::new("a", "needs-old-core");
    let new = Pkg::new("b", "needs-new-core");

    let mut base = BTreeMap::new();
    base.insert(old.clone(), Range::exact(v("1.0.0")));
    base.insert(new.clone(), Range::exact(v("1.0.0")));

    let err = resolver::solve(&registry, &base, &BTreeMap::new(), &old).unwrap_err();
    match err {
        ResolveError::NoSolution { explanation } => {
            assert!(explanation.to_lowercase().contains("core"));
        }
        other => panic!("expected NoSolution, got {:?}", other),
    }
}
