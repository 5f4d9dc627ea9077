// SPDX-License-Identifier: MPL-2.0

//! The protocol gate: decide V1 vs V2 once at startup, drive registry
//! init/refresh, and merge an optional local-dev override.
//!
//! Everything environment-dependent is threaded explicitly through
//! [`Env`] rather than read piecemeal from global state, so the same
//! code is testable against arbitrary configurations.

use crate::error::RegistryError;
use crate::http::HttpClient;
use crate::registry::{v1::RegistryV1, v2::RegistryV2, Registry};
use std::path::PathBuf;

/// Everything the rest of the crate needs to know about where it is
/// running, resolved once at CLI startup.
#[derive(Debug, Clone)]
pub struct Env {
    /// `--offline` / `WRAP_OFFLINE_MODE`: never touch the network.
    pub offline: bool,
    /// `WRAP_SKIP_REGISTRY_UPDATE`: use whatever registry is already cached
    /// even when online.
    pub skip_registry_update: bool,
    /// `ELM_PACKAGE_REGISTRY_URL`, default `https://package.elm-lang.org`.
    pub remote_base_url: String,
    /// `ELM_HOME`, default `~/.elm`.
    pub elm_home: PathBuf,
    /// The compiler version this cache and registry are namespaced under.
    pub elm_version: String,
    /// Presence of this path selects the V2 protocol; its absence falls
    /// back to V1.
    pub v2_repository_path: Option<PathBuf>,
}

impl Env {
    /// `<elm_home>/<elm_version>/packages/`, shared by both protocols.
    pub fn packages_dir(&self) -> PathBuf {
        self.elm_home.join(&self.elm_version).join("packages")
    }

    fn local_dev_overlay_path(&self) -> PathBuf {
        self.packages_dir().join("registry-local-dev.dat")
    }
}

/// Chosen once per process and never switched mid-run.
#[derive(Debug)]
pub enum ProtocolGate {
    /// Legacy protocol: incremental binary registry + per-version fetches.
    V1(RegistryV1),
    /// Newer protocol: a single index with the full dependency graph,
    /// sourced from an on-disk repository rather than the network.
    V2(RegistryV2),
}

impl ProtocolGate {
    /// Decide V1 vs V2 from `env.v2_repository_path`, then initialize the
    /// chosen registry: load what's cached on disk, refresh it over the
    /// network unless `offline`/`skip_registry_update` says not to, and
    /// merge any local-dev overlay found on top.
    pub fn init(env: &Env, http: &dyn HttpClient) -> Result<Self, RegistryError> {
        match &env.v2_repository_path {
            Some(repo_path) => {
                tracing::info!(path = %repo_path.display(), "protocol gate selected V2");
                let mut registry = RegistryV2::load_from_zip(repo_path)?;
                let overlay_path = env.local_dev_overlay_path();
                if overlay_path.exists() {
                    let overlay_text = std::fs::read_to_string(&overlay_path).map_err(|source| {
                        RegistryError::Io {
                            path: overlay_path.display().to_string(),
                            source,
                        }
                    })?;
                    let overlay = RegistryV2::load_from_text(&overlay_text)?;
                    registry.merge_local_dev_overlay(&overlay);
                    tracing::debug!(path = %overlay_path.display(), "merged local-dev overlay");
                }
                Ok(ProtocolGate::V2(registry))
            }
            None => {
                tracing::info!("protocol gate selected V1");
                let mut registry = RegistryV1::load(&env.elm_home, &env.elm_version)?
                    .unwrap_or_else(|| RegistryV1::empty(&env.elm_home, &env.elm_version));

                if env.offline {
                    if registry.is_empty() {
                        return Err(RegistryError::OfflineRequired);
                    }
                } else if !env.skip_registry_update {
                    registry.fetch_update(http, &env.remote_base_url)?;
                }
                Ok(ProtocolGate::V1(registry))
            }
        }
    }

    /// Hand ownership of the underlying registry to the resolver/fetcher.
    pub fn into_registry(self) -> Registry {
        match self {
            ProtocolGate::V1(r) => Registry::V1(r),
            ProtocolGate::V2(r) => Registry::V2(r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_env(v2: Option<PathBuf>) -> Env {
        Env {
            offline: false,
            skip_registry_update: true,
            remote_base_url: "https://package.elm-lang.org".to_string(),
            elm_home: std::env::temp_dir().join(format!("epm-protocol-test-{}", std::process::id())),
            elm_version: "0.19.1".to_string(),
            v2_repository_path: v2,
        }
    }

    struct UnreachableHttp;
    impl HttpClient for UnreachableHttp {
        fn get_bytes(&self, _url: &str) -> Result<Vec<u8>, crate::http::HttpError> {
            panic!("network should not be used when skip_registry_update is set")
        }
        fn get_bytes_if_none_match(
            &self,
            _url: &str,
            _etag: &str,
        ) -> Result<Option<Vec<u8>>, crate::http::HttpError> {
            panic!("unused in this test")
        }
        fn head_etag(
            &self,
            _url: &str,
            _etag: &str,
        ) -> Result<crate::http::HeadOutcome, crate::http::HttpError> {
            panic!("unused in this test")
        }
        fn download_to_file(
            &self,
            _url: &str,
            _dest: &std::path::Path,
        ) -> Result<(), crate::http::HttpError> {
            panic!("unused in this test")
        }
    }

    #[test]
    fn v1_is_selected_without_a_v2_repository_path() {
        let env = sample_env(None);
        let gate = ProtocolGate::init(&env, &UnreachableHttp).unwrap();
        assert!(matches!(gate, ProtocolGate::V1(_)));
    }

    #[test]
    fn offline_with_no_cached_registry_fails() {
        let mut env = sample_env(None);
        env.offline = true;
        env.skip_registry_update = false;
        let err = ProtocolGate::init(&env, &UnreachableHttp).unwrap_err();
        assert!(matches!(err, RegistryError::OfflineRequired));
    }
}
