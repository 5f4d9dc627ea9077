// SPDX-License-Identifier: MPL-2.0

//! Resolve the process-wide [`Env`] once, from environment variables and
//! CLI flags.

use epm_core::protocol::Env;
use std::path::PathBuf;

/// CLI-level overrides threaded in ahead of environment variables.
#[derive(Debug, Default)]
pub struct ConfigArgs {
    /// `--offline`.
    pub offline: bool,
    /// `--v2-repository <path>`, an on-disk V2 index zip; its presence
    /// selects the V2 protocol.
    pub v2_repository_path: Option<PathBuf>,
}

/// Build the [`Env`] record: CLI flags take priority, then environment
/// variables, then the documented defaults.
pub fn from_env_and_args(args: ConfigArgs) -> Env {
    let offline = args.offline || env_flag("WRAP_OFFLINE_MODE");
    let skip_registry_update = env_flag("WRAP_SKIP_REGISTRY_UPDATE");
    let remote_base_url = std::env::var("ELM_PACKAGE_REGISTRY_URL")
        .unwrap_or_else(|_| "https://package.elm-lang.org".to_string());
    let elm_home = elm_home();

    Env {
        offline,
        skip_registry_update,
        remote_base_url,
        elm_home,
        elm_version: "0.19.1".to_string(),
        v2_repository_path: args.v2_repository_path,
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

fn elm_home() -> PathBuf {
    match std::env::var_os("ELM_HOME") {
        Some(os_string) => os_string.into(),
        None => default_elm_home(),
    }
}

#[cfg(target_family = "unix")]
fn default_elm_home() -> PathBuf {
    dirs::home_dir()
        .expect("unknown home directory")
        .join(".elm")
}

#[cfg(target_family = "windows")]
fn default_elm_home() -> PathBuf {
    dirs::data_dir()
        .expect("unknown data directory")
        .join("elm")
}
