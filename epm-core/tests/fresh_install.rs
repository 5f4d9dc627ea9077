// SPDX-License-Identifier: MPL-2.0

//! S1 — fresh install of a trivial dependency graph: resolve, diff against
//! an empty lock, write the manifest back, and read it again.

mod common;

use epm_core::manifest::{AppDependencies, ApplicationManifest, Manifest, Pkg};
use epm_core::plan::{self, InstallPlan};
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
package: elm/html
    version: 1.0.0
    status: valid
    license: BSD-3-Clause
    dependencies:
        elm/core  1.0.0 <= v < 2.0.0
";

fn v(s: &str) -> epm_core::version::Version {
    s.parse().unwrap()
}

fn empty_application() -> ApplicationManifest {
    ApplicationManifest {
        source_directories: vec!["src".to_string()],
        elm_version: v("0.19.1"),
        dependencies: AppDependencies::default(),
        test_dependencies: AppDependencies::default(),
    }
}

#[test]
fn installing_a_package_pulls_in_its_dependency_as_indirect() {
    let registry = RegistryV2::load_from_text(INDEX).unwrap();
    let html = Pkg::new("elm", "html");
    let core = Pkg::new("elm", "core");

    let mut base = BTreeMap::new();
    base.insert(html.clone(), Range::any());
    let solution = resolver::solve(&registry, &base, &BTreeMap::new(), &html).unwrap();
    assert_eq!(solution.get(&html), Some(&v("1.0.0")));
    assert_eq!(solution.get(&core), Some(&v("1.0.5")));

    let plan = InstallPlan::diff(&solution, &BTreeMap::new());
    assert_eq!(plan.additions().count(), 2);

    let mut manifest = empty_application();
    plan::apply_to_application(&mut manifest, &html, false, &solution);
    assert_eq!(manifest.dependencies.direct.get(&html), Some(&v("1.0.0")));
    assert_eq!(manifest.dependencies.indirect.get(&core), Some(&v("1.0.5")));

    let dir = common::temp_dir("fresh-install");
    let path = dir.join("elm.json");
    let wrapped = Manifest::Application(manifest);

    // No prior file was read for a brand new project, so there is no
    // "order it appeared on read" to honor; falls back to field order.
    plan::write_manifest_atomic(&wrapped, &[], &path).unwrap();

    let read_back = Manifest::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
    match read_back {
        Manifest::Application(app) => {
            assert_eq!(app.dependencies.direct.get(&html), Some(&v("1.0.0")));
            assert_eq!(app.dependencies.indirect.get(&core), Some(&v("1.0.5")));
        }
        Manifest::Package(_) => panic!("expected an application manifest"),
    }

    // 4-space indent per the project's manifest convention; falls back to
    // field-declaration order when there's no original order to honor.
    let rendered = std::fs::read_to_string(&path).unwrap();
    assert!(rendered.starts_with("{\n    "));
    assert!(rendered.ends_with('\n'));
    let source_dirs_pos = rendered.find("\"source-directories\"").unwrap();
    let test_deps_pos = rendered.find("\"test-dependencies\"").unwrap();
    assert!(source_dirs_pos < test_deps_pos);
}

#[test]
fn rewriting_an_existing_manifest_keeps_its_top_level_key_order() {
    let registry = RegistryV2::load_from_text(INDEX).unwrap();
    let html = Pkg::new("elm", "html");

    let original_text = r#"{
        "type": "application",
        "test-dependencies": {
            "direct": {},
            "indirect": {}
        },
        "dependencies": {
            "direct": {},
            "indirect": {}
        },
        "elm-version": "0.19.1",
        "source-directories": ["src"]
    }"#;
    let order = Manifest::top_level_key_order(original_text).unwrap();
    let mut manifest = match Manifest::from_json(original_text).unwrap() {
        Manifest::Application(app) => app,
        Manifest::Package(_) => panic!("expected an application manifest"),
    };

    let mut base = BTreeMap::new();
    base.insert(html.clone(), Range::any());
    let solution = resolver::solve(&registry, &base, &BTreeMap::new(), &html).unwrap();
    plan::apply_to_application(&mut manifest, &html, false, &solution);

    let dir = common::temp_dir("fresh-install-preserve-order");
    let path = dir.join("elm.json");
    let wrapped = Manifest::Application(manifest);
    plan::write_manifest_atomic(&wrapped, &order, &path).unwrap();

    let rendered = std::fs::read_to_string(&path).unwrap();
    let positions: Vec<usize> = ["test-dependencies", "dependencies", "elm-version", "source-directories"]
        .iter()
        .map(|k| rendered.find(&format!("\"{}\"", k)).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}
