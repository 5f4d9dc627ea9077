// SPDX-License-Identifier: MPL-2.0

//! The content-addressed package cache: `packages_dir/<author>/<name>/<version>/`.
//!
//! A version is considered fully downloaded once its `src/` subtree holds
//! at least one file, rather than relying on a separate marker file.

use crate::error::CacheError;
use crate::manifest::Pkg;
use crate::version::Version;
use std::path::{Path, PathBuf};

/// Files (besides the `src/` tree) copied from an extracted source
/// directory into the cache.
const SIDE_FILES: &[&str] = &["elm.json", "docs.json", "LICENSE", "README.md"];

/// Handle onto `<elm_home>/<elm_version>/packages/`.
pub struct CacheStore {
    packages_dir: PathBuf,
}

impl CacheStore {
    /// Build a handle rooted at `<elm_home>/<elm_version>/packages/`.
    pub fn new(elm_home: impl AsRef<Path>, elm_version: &str) -> Self {
        CacheStore {
            packages_dir: elm_home.as_ref().join(elm_version).join("packages"),
        }
    }

    /// The directory a specific version would live in, whether or not it is
    /// actually installed yet.
    pub fn version_dir(&self, pkg: &Pkg, version: &Version) -> PathBuf {
        self.packages_dir
            .join(&pkg.author)
            .join(&pkg.name)
            .join(version.to_string())
    }

    /// Iff the directory exists and its `src/` subdirectory recursively
    /// contains at least one regular file.
    pub fn is_fully_downloaded(&self, pkg: &Pkg, version: &Version) -> bool {
        let src = self.version_dir(pkg, version).join("src");
        directory_has_a_file(&src)
    }

    /// Install a freshly extracted package into the cache, replacing any
    /// existing (necessarily broken, by contract) directory for this
    /// version. Leaves the destination removed if `src/` fails to survive
    /// the copy.
    pub fn install_from_dir(
        &self,
        pkg: &Pkg,
        version: &Version,
        source_dir: &Path,
    ) -> Result<(), CacheError> {
        let author_dir = self.packages_dir.join(&pkg.author).join(&pkg.name);
        std::fs::create_dir_all(&author_dir).map_err(|source| CacheError::Io {
            path: author_dir.display().to_string(),
            source,
        })?;

        let dest = self.version_dir(pkg, version);
        if dest.exists() {
            std::fs::remove_dir_all(&dest).map_err(|source| CacheError::Io {
                path: dest.display().to_string(),
                source,
            })?;
        }
        std::fs::create_dir_all(&dest).map_err(|source| CacheError::Io {
            path: dest.display().to_string(),
            source,
        })?;

        for name in SIDE_FILES {
            let from = source_dir.join(name);
            if from.exists() {
                std::fs::copy(&from, dest.join(name)).map_err(|source| CacheError::Io {
                    path: from.display().to_string(),
                    source,
                })?;
            }
        }
        copy_dir_recursive(&source_dir.join("src"), &dest.join("src")).map_err(|source| {
            CacheError::Io {
                path: source_dir.join("src").display().to_string(),
                source,
            }
        })?;

        if !directory_has_a_file(&dest.join("src")) {
            let _ = std::fs::remove_dir_all(&dest);
            return Err(CacheError::Corrupt(
                pkg.author.clone(),
                pkg.name.clone(),
                *version,
            ));
        }
        tracing::debug!(%pkg, %version, "installed package into cache");
        Ok(())
    }

    /// `true` if already fully-downloaded. Otherwise removes any partial
    /// directory so the caller can re-fetch with a clean slate. The fetcher
    /// never trusts a broken entry, however many coexist.
    pub fn ensure_clean_slot(&self, pkg: &Pkg, version: &Version) -> Result<bool, CacheError> {
        if self.is_fully_downloaded(pkg, version) {
            return Ok(true);
        }
        let dest = self.version_dir(pkg, version);
        if dest.exists() {
            tracing::warn!(%pkg, %version, path = %dest.display(), "removing broken cache entry");
            std::fs::remove_dir_all(&dest).map_err(|source| CacheError::Io {
                path: dest.display().to_string(),
                source,
            })?;
        }
        Ok(false)
    }
}

fn directory_has_a_file(dir: &Path) -> bool {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.file_type().is_file())
}

fn copy_dir_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in walkdir::WalkDir::new(from) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(from).expect("entry is under `from`");
        let dest = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("epm-cache-test-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn empty_src_counts_as_broken() {
        let root = temp_dir("empty-src");
        let src = root.join("src");
        std::fs::create_dir_all(&src).unwrap();
        assert!(!directory_has_a_file(&src));
        std::fs::write(src.join("Main.elm"), b"module Main exposing (..)").unwrap();
        assert!(directory_has_a_file(&src));
    }

    #[test]
    fn install_then_is_fully_downloaded() {
        let root = temp_dir("install");
        let elm_home = root.join("elm_home");
        let source_dir = root.join("extracted");
        std::fs::create_dir_all(source_dir.join("src")).unwrap();
        std::fs::write(source_dir.join("src").join("Main.elm"), b"x").unwrap();
        std::fs::write(source_dir.join("elm.json"), b"{}").unwrap();

        let cache = CacheStore::new(&elm_home, "0.19.1");
        let pkg = Pkg::new("elm", "core");
        let version: Version = "1.0.5".parse().unwrap();
        assert!(!cache.is_fully_downloaded(&pkg, &version));
        cache.install_from_dir(&pkg, &version, &source_dir).unwrap();
        assert!(cache.is_fully_downloaded(&pkg, &version));
        assert!(cache.version_dir(&pkg, &version).join("elm.json").exists());
    }

    #[test]
    fn ensure_clean_slot_removes_broken_directory() {
        let root = temp_dir("broken");
        let elm_home = root.join("elm_home");
        let cache = CacheStore::new(&elm_home, "0.19.1");
        let pkg = Pkg::new("elm", "core");
        let version: Version = "1.0.5".parse().unwrap();
        std::fs::create_dir_all(cache.version_dir(&pkg, &version)).unwrap();
        assert!(!cache.ensure_clean_slot(&pkg, &version).unwrap());
        assert!(!cache.version_dir(&pkg, &version).exists());
    }
}
