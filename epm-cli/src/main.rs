// SPDX-License-Identifier: MPL-2.0

//! `epm`: install, remove, upgrade, and cache packages for an Elm project,
//! on top of `epm-core`'s PubGrub resolver.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::ConfigArgs;
use epm_core::cache::CacheStore;
use epm_core::error::ResolveError;
use epm_core::fetch::PackageFetcher;
use epm_core::http::{HttpClient, UreqHttpClient};
use epm_core::manifest::{AppDependencies, Manifest, Pkg};
use epm_core::plan::{self, InstallPlan};
use epm_core::protocol::{Env, ProtocolGate};
use epm_core::registry::DependencyProvider;
use epm_core::resolver::{self, Strategy};
use epm_core::version::{Range, Version};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

const EXIT_OK: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_NO_UPGRADES: u8 = 100;

#[derive(Parser)]
#[command(name = "epm", about = "Dependency management for elm projects")]
struct Cli {
    /// Verbose logging (`DEBUG`).
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
    /// Quiet logging (`WARN` only).
    #[arg(short = 'q', long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a package to the project.
    Install(InstallArgs),
    /// Remove a package from the project.
    Remove(RemoveArgs),
    /// Upgrade one package, or every package, to newer compatible versions.
    Upgrade(UpgradeArgs),
    /// Check whether any upgrades are available, without applying them.
    Check(CheckArgs),
    /// Fetch a package straight into the cache without touching the
    /// manifest.
    Cache(CacheArgs),
}

#[derive(clap::Args)]
struct InstallArgs {
    /// `author/name`.
    pkg: String,
    /// Install as a test-only dependency.
    #[arg(long)]
    test: bool,
    /// Allow this install to bump the package across a major version.
    #[arg(long)]
    major: bool,
    /// Sideload from a local directory instead of the registry.
    #[arg(long, value_name = "DIR")]
    from_file: Option<PathBuf>,
    /// Sideload from a URL instead of the registry.
    #[arg(long, value_name = "URL")]
    from_url: Option<String>,
    /// Pin the sideloaded package so future resolves don't replace it.
    #[arg(long)]
    pin: bool,
    /// Skip the confirmation prompt.
    #[arg(short = 'y', long)]
    yes: bool,
}

#[derive(clap::Args)]
struct RemoveArgs {
    /// `author/name`.
    pkg: String,
    /// Skip the confirmation prompt.
    #[arg(short = 'y', long)]
    yes: bool,
}

#[derive(clap::Args)]
struct UpgradeArgs {
    /// `author/name`, or omit for every direct dependency.
    pkg: Option<String>,
    /// Allow crossing a major version boundary.
    #[arg(long)]
    major: bool,
    /// Like `--major`, but never drags test dependencies along.
    #[arg(long)]
    major_ignore_test: bool,
    /// Skip the confirmation prompt.
    #[arg(short = 'y', long)]
    yes: bool,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Path to the manifest to check, default `elm.json` in the current
    /// directory.
    path: Option<PathBuf>,
}

#[derive(clap::Args)]
struct CacheArgs {
    /// `author/name`.
    pkg: String,
    /// Specific version to fetch; default is the newest available.
    version: Option<String>,
    /// Sideload from a local directory instead of the registry.
    #[arg(long, value_name = "DIR")]
    from_file: Option<PathBuf>,
    /// Sideload from a URL instead of the registry.
    #[arg(long, value_name = "URL")]
    from_url: Option<String>,
    /// Allow a major version when no exact version is given.
    #[arg(long)]
    major: bool,
    /// Skip SHA-1 verification of the downloaded archive.
    #[arg(long)]
    ignore_hash: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Command::Install(args) => run_install(args),
        Command::Remove(args) => run_remove(args),
        Command::Upgrade(args) => run_upgrade(args),
        Command::Check(args) => run_check(args),
        Command::Cache(args) => run_cache(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else if quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn manifest_path() -> PathBuf {
    PathBuf::from("elm.json")
}

/// The parsed manifest, plus its top-level key order as it appeared on
/// disk, so a later write reproduces that layout instead of a fixed one.
fn load_manifest(path: &Path) -> anyhow::Result<(Manifest, Vec<String>)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("are you in an elm project? could not read {}", path.display()))?;
    let manifest = Manifest::from_json(&text).context("failed to decode elm.json")?;
    let order = Manifest::top_level_key_order(&text).context("failed to decode elm.json")?;
    Ok((manifest, order))
}

fn build_env(v2_repository_path: Option<PathBuf>, offline: bool) -> Env {
    config::from_env_and_args(ConfigArgs {
        offline,
        v2_repository_path,
    })
}

fn parse_pkg(s: &str) -> anyhow::Result<Pkg> {
    Pkg::from_str(s).map_err(Into::into)
}

/// Everyone's currently-locked versions, as the resolver's pin set, plus
/// the base constraint map the root package presents to the solver.
fn application_state(
    manifest: &AppDependencies,
    test_deps: &AppDependencies,
    use_test: bool,
) -> (BTreeMap<Pkg, Version>, BTreeMap<Pkg, Range>) {
    let mut pinned = BTreeMap::new();
    let mut base = BTreeMap::new();
    for (pkg, version) in manifest.direct.iter().chain(manifest.indirect.iter()) {
        pinned.insert(pkg.clone(), *version);
        base.insert(pkg.clone(), Range::exact(*version));
    }
    if use_test {
        for (pkg, version) in test_deps.direct.iter().chain(test_deps.indirect.iter()) {
            pinned.insert(pkg.clone(), *version);
            base.insert(pkg.clone(), Range::exact(*version));
        }
    }
    (pinned, base)
}

fn confirm(prompt: &str, auto_yes: bool) -> anyhow::Result<bool> {
    if auto_yes {
        return Ok(true);
    }
    eprint!("{} [y/N] ", prompt);
    use std::io::Write;
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn print_plan(plan: &InstallPlan) {
    for change in &plan.changes {
        match change.old_version {
            Some(old) if old != change.new_version => {
                eprintln!("  change {} {} => {}", change.pkg, old, change.new_version)
            }
            Some(_) => {}
            None => eprintln!("  add {}@{}", change.pkg, change.new_version),
        }
    }
}

fn handle_resolve_error(err: ResolveError) -> anyhow::Error {
    match err {
        ResolveError::NoSolution { explanation } => anyhow::anyhow!(explanation),
        ResolveError::Registry(source) => {
            anyhow::anyhow!("registry error while resolving dependencies: {}", source)
        }
        ResolveError::SelfDependency(pkg) => anyhow::anyhow!("{} depends on itself", pkg),
    }
}

fn fetch_missing(
    plan: &InstallPlan,
    env: &Env,
    registry: &epm_core::registry::Registry,
    cache: &CacheStore,
    http: &dyn HttpClient,
) -> anyhow::Result<()> {
    let fetcher = PackageFetcher::new(cache);
    for change in &plan.changes {
        if cache.is_fully_downloaded(&change.pkg, &change.new_version) {
            continue;
        }
        cache.ensure_clean_slot(&change.pkg, &change.new_version)?;
        let archive_url = format!(
            "{}/{}.zip",
            change.pkg.to_url(&env.remote_base_url),
            change.new_version
        );
        let deps = registry.get_dependencies(&change.pkg, &change.new_version);
        let _ = deps; // dependencies already known to the resolver; fetch just materializes files
        fetcher.fetch(&change.pkg, &change.new_version, &archive_url, None, false, http)?;
    }
    Ok(())
}

fn run_install(args: &InstallArgs) -> anyhow::Result<u8> {
    let target = parse_pkg(&args.pkg)?;
    let path = manifest_path();
    let (mut manifest, order) = load_manifest(&path)?;
    let env = build_env(None, false);
    let http = UreqHttpClient::new();

    if let Some(dir) = &args.from_file {
        let cache = CacheStore::new(&env.elm_home, &env.elm_version);
        let fetcher = PackageFetcher::new(&cache);
        let (pkg, version) = fetcher.sideload_from_dir(dir, &target, args.pin)?;
        eprintln!("sideloaded {}@{} from {}", pkg, version, dir.display());
        return Ok(EXIT_OK);
    }
    if let Some(url) = &args.from_url {
        let cache = CacheStore::new(&env.elm_home, &env.elm_version);
        let fetcher = PackageFetcher::new(&cache);
        let (pkg, version) = fetcher.sideload_from_url(url, &target, args.pin, &http)?;
        eprintln!("sideloaded {}@{} from {}", pkg, version, url);
        return Ok(EXIT_OK);
    }

    let gate = ProtocolGate::init(&env, &http)?;
    let registry = gate.into_registry();

    let app = match &mut manifest {
        Manifest::Application(app) => app,
        Manifest::Package(_) => anyhow::bail!("install is only meaningful for application projects"),
    };
    let (pinned, mut base) = application_state(&app.dependencies, &app.test_dependencies, args.test);
    base.insert(target.clone(), Range::any());

    let solution = if args.major {
        resolver::solve_with_strategy(&registry, &base, &pinned, &target, Strategy::MajorUpgrade)
            .map_err(handle_resolve_error)?
    } else {
        resolver::solve(&registry, &base, &pinned, &target).map_err(handle_resolve_error)?
    };

    let plan = InstallPlan::diff(&solution, &pinned);
    if plan.is_empty() {
        eprintln!("{} is already up to date", target);
        return Ok(EXIT_OK);
    }
    print_plan(&plan);
    if !confirm("Apply this plan?", args.yes)? {
        return Ok(EXIT_OK);
    }

    let cache = CacheStore::new(&env.elm_home, &env.elm_version);
    fetch_missing(&plan, &env, &registry, &cache, &http)?;

    plan::apply_to_application(app, &target, args.test, &solution);
    plan::write_manifest_atomic(&manifest, &order, &path)?;
    Ok(EXIT_OK)
}

fn run_remove(args: &RemoveArgs) -> anyhow::Result<u8> {
    let target = parse_pkg(&args.pkg)?;
    let path = manifest_path();
    let (mut manifest, order) = load_manifest(&path)?;
    let env = build_env(None, false);
    let http = UreqHttpClient::new();
    let gate = ProtocolGate::init(&env, &http)?;
    let registry = gate.into_registry();

    let app = match &mut manifest {
        Manifest::Application(app) => app,
        Manifest::Package(_) => anyhow::bail!("remove is only meaningful for application projects"),
    };
    if !app.dependencies.direct.contains_key(&target) && !app.test_dependencies.direct.contains_key(&target) {
        anyhow::bail!("{} is not a direct dependency", target);
    }
    if !confirm(&format!("Remove {}?", target), args.yes)? {
        return Ok(EXIT_OK);
    }

    let is_test = app.test_dependencies.direct.contains_key(&target);
    let solution = resolver::solve_after_removal(
        &registry,
        &BTreeMap::new(),
        &application_state(&app.dependencies, &app.test_dependencies, is_test).0,
        &target,
    );
    plan::remove_from_application(app, &target, is_test);
    if let Ok(solution) = solution {
        plan::apply_to_application(app, &target, is_test, &solution);
    }
    plan::write_manifest_atomic(&manifest, &order, &path)?;
    Ok(EXIT_OK)
}

fn run_upgrade(args: &UpgradeArgs) -> anyhow::Result<u8> {
    let path = manifest_path();
    let (mut manifest, order) = load_manifest(&path)?;
    let env = build_env(None, false);
    let http = UreqHttpClient::new();
    let gate = ProtocolGate::init(&env, &http)?;
    let registry = gate.into_registry();

    let app = match &mut manifest {
        Manifest::Application(app) => app,
        Manifest::Package(_) => anyhow::bail!("upgrade is only meaningful for application projects"),
    };

    let use_test = !args.major_ignore_test;
    let (pinned, base) = application_state(&app.dependencies, &app.test_dependencies, use_test);

    let targets: Vec<Pkg> = match &args.pkg {
        Some(p) => vec![parse_pkg(p)?],
        None => app.dependencies.direct.keys().cloned().collect(),
    };

    let strategy = if args.major || args.major_ignore_test {
        Strategy::MajorUpgrade
    } else {
        Strategy::Upgrade
    };

    let mut solution = pinned.clone();
    for target in &targets {
        let mut target_base = base.clone();
        target_base.entry(target.clone()).or_insert_with(Range::any);
        let attempt = resolver::solve_with_strategy(&registry, &target_base, &solution, target, strategy)
            .map_err(handle_resolve_error)?;
        solution = attempt;
    }

    let plan = InstallPlan::diff(&solution, &pinned);
    if plan.is_empty() {
        eprintln!("no upgrades available");
        return Ok(EXIT_NO_UPGRADES);
    }
    print_plan(&plan);
    if !confirm("Apply this plan?", args.yes)? {
        return Ok(EXIT_OK);
    }

    let cache = CacheStore::new(&env.elm_home, &env.elm_version);
    fetch_missing(&plan, &env, &registry, &cache, &http)?;
    for target in &targets {
        plan::apply_to_application(app, target, use_test, &solution);
    }
    plan::write_manifest_atomic(&manifest, &order, &path)?;
    Ok(EXIT_OK)
}

fn run_check(args: &CheckArgs) -> anyhow::Result<u8> {
    let path = args.path.clone().unwrap_or_else(manifest_path);
    let (manifest, _order) = load_manifest(&path)?;
    let env = build_env(None, false);
    let http = UreqHttpClient::new();
    let gate = ProtocolGate::init(&env, &http)?;
    let registry = gate.into_registry();

    let app = match &manifest {
        Manifest::Application(app) => app,
        Manifest::Package(_) => anyhow::bail!("check is only meaningful for application projects"),
    };
    let (pinned, base) = application_state(&app.dependencies, &app.test_dependencies, true);

    let mut any_upgrade = false;
    for target in app.dependencies.direct.keys() {
        let mut target_base = base.clone();
        target_base.insert(target.clone(), Range::any());
        match resolver::solve_with_strategy(&registry, &target_base, &pinned, target, Strategy::Upgrade) {
            Ok(solution) => {
                if solution.get(target) != pinned.get(target) {
                    any_upgrade = true;
                    eprintln!(
                        "{} {} -> {}",
                        target,
                        pinned.get(target).map(|v| v.to_string()).unwrap_or_default(),
                        solution.get(target).unwrap()
                    );
                }
            }
            Err(err) => tracing::debug!(%target, error = %err, "check: no alternative version found"),
        }
    }

    if any_upgrade {
        Ok(EXIT_OK)
    } else {
        Ok(EXIT_NO_UPGRADES)
    }
}

fn run_cache(args: &CacheArgs) -> anyhow::Result<u8> {
    let target = parse_pkg(&args.pkg)?;
    let env = build_env(None, false);
    let http = UreqHttpClient::new();
    let cache = CacheStore::new(&env.elm_home, &env.elm_version);
    let fetcher = PackageFetcher::new(&cache);

    if let Some(dir) = &args.from_file {
        let (pkg, version) = fetcher.sideload_from_dir(dir, &target, false)?;
        eprintln!("cached {}@{} from {}", pkg, version, dir.display());
        return Ok(EXIT_OK);
    }
    if let Some(url) = &args.from_url {
        let (pkg, version) = fetcher.sideload_from_url(url, &target, false, &http)?;
        eprintln!("cached {}@{} from {}", pkg, version, url);
        return Ok(EXIT_OK);
    }

    let gate = ProtocolGate::init(&env, &http)?;
    let registry = gate.into_registry();
    let version = match &args.version {
        Some(v) => Version::from_str(v).context("invalid version")?,
        None => {
            // `versions` is already newest-first; `--major` is accepted for
            // symmetry with `install`/`upgrade` but has no effect here since
            // there is no prior pin to stay within a major version of.
            let _ = args.major;
            registry
                .get_versions(&target)?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("{} has no known versions", target))?
        }
    };

    let archive_url = format!("{}/{}.zip", target.to_url(&env.remote_base_url), version);
    fetcher.fetch(&target, &version, &archive_url, None, args.ignore_hash, &http)?;
    eprintln!("cached {}@{}", target, version);
    Ok(EXIT_OK)
}
