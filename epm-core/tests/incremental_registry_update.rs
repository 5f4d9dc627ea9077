// SPDX-License-Identifier: MPL-2.0

//! S4 — incremental registry update: a first `fetch_update` with no
//! cached ETag does a full fetch; a second `fetch_update` against an
//! unchanged server returns `Unchanged` without ever hitting `/since`.

mod common;

use epm_core::registry::v1::{RegistryV1, UpdateOutcome};
use epm_core::registry::DependencyProvider;
use epm_core::manifest::Pkg;

const REMOTE: &str = "https://package.elm-lang.org";

#[test]
fn second_update_against_an_unchanged_server_short_circuits() {
    let root = common::temp_dir("incremental-update");
    let elm_home = root.join("elm_home");

    let all_packages_body = br#"{"elm/core": ["1.0.0", "1.0.5"]}"#.to_vec();
    let http = common::FakeHttpClient::new()
        .with_body(format!("{}/all-packages", REMOTE), all_packages_body)
        .with_etag("\"abc\"");

    let mut registry = RegistryV1::empty(&elm_home, "0.19.1");
    let outcome = registry.fetch_update(&http, REMOTE).unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated);
    assert_eq!(
        registry.get_versions(&Pkg::new("elm", "core")).unwrap().len(),
        2
    );

    // Reload from disk as a fresh process would, picking up the persisted
    // ETag sidecar.
    let mut reloaded = RegistryV1::load(&elm_home, "0.19.1").unwrap().unwrap();
    let requests_before = http.requested_urls().len();
    let outcome = reloaded.fetch_update(&http, REMOTE).unwrap();
    assert_eq!(outcome, UpdateOutcome::Unchanged);

    let requests_after = http.requested_urls();
    assert_eq!(requests_after.len(), requests_before + 1);
    assert!(requests_after.last().unwrap().starts_with("HEAD"));
    assert!(!requests_after
        .iter()
        .any(|u| u.contains("/all-packages/since/")));
}
