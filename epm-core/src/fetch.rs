// SPDX-License-Identifier: MPL-2.0

//! The package fetcher: download, verify, selectively extract, and install.
//!
//! Downloads to a scratch directory first, extracts there, and only then
//! installs into the cache — so a failed download or a checksum mismatch
//! never leaves a partially-written cache entry behind.

use crate::cache::CacheStore;
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::manifest::{Manifest, Pkg};
use crate::version::Version;
use sha1::{Digest, Sha1};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Downloads, verifies, extracts and installs packages into a [`CacheStore`].
pub struct PackageFetcher<'a> {
    cache: &'a CacheStore,
}

impl<'a> PackageFetcher<'a> {
    /// Build a fetcher writing into `cache`.
    pub fn new(cache: &'a CacheStore) -> Self {
        PackageFetcher { cache }
    }

    /// Registry-driven fetch: construct the archive URL,
    /// download, optionally verify, extract, and install.
    pub fn fetch(
        &self,
        pkg: &Pkg,
        version: &Version,
        archive_url: &str,
        expected_sha1: Option<&str>,
        ignore_hash: bool,
        http: &dyn HttpClient,
    ) -> Result<(), FetchError> {
        let scratch = tempfile::Builder::new()
            .prefix("epm-fetch-")
            .tempdir()
            .map_err(|source| FetchError::Io {
                path: std::env::temp_dir().display().to_string(),
                source,
            })?;
        let archive_path = scratch.path().join("package.zip");

        let result = (|| -> Result<(), FetchError> {
            http.download_to_file(archive_url, &archive_path)
                .map_err(|source| FetchError::Network {
                    url: archive_url.to_string(),
                    source,
                })?;

            if !ignore_hash {
                if let Some(expected) = expected_sha1 {
                    verify_sha1(&archive_path, pkg, version, expected)?;
                }
            }

            let extracted = scratch.path().join("extracted");
            extract_zip_selective(&archive_path, &extracted)?;
            self.cache
                .install_from_dir(pkg, version, &extracted)
                .map_err(FetchError::from)
        })();

        result
    }

    /// `--from-file <dir>` / `--from-url <url>` sideload:
    /// bypasses the registry entirely, trusting the embedded `elm.json` for
    /// the true `(author, name, version)`.
    pub fn sideload_from_dir(
        &self,
        source_dir: &Path,
        expected: &Pkg,
        pin: bool,
    ) -> Result<(Pkg, Version), FetchError> {
        let elm_json = std::fs::read_to_string(source_dir.join("elm.json")).map_err(|source| {
            FetchError::Io {
                path: source_dir.join("elm.json").display().to_string(),
                source,
            }
        })?;
        let (pkg, version) = package_identity(&elm_json)?;
        if pkg != *expected {
            tracing::warn!(
                expected = %expected,
                actual = %pkg,
                "sideloaded package's elm.json disagrees with the requested name"
            );
        }
        self.cache.install_from_dir(&pkg, &version, source_dir)?;
        if pin {
            self.write_pin(&pkg, &version)?;
        }
        Ok((pkg, version))
    }

    /// As [`PackageFetcher::sideload_from_dir`], but downloads the archive
    /// from a URL first.
    pub fn sideload_from_url(
        &self,
        url: &str,
        expected: &Pkg,
        pin: bool,
        http: &dyn HttpClient,
    ) -> Result<(Pkg, Version), FetchError> {
        let scratch = tempfile::Builder::new()
            .prefix("epm-sideload-")
            .tempdir()
            .map_err(|source| FetchError::Io {
                path: std::env::temp_dir().display().to_string(),
                source,
            })?;
        let archive_path = scratch.path().join("package.zip");
        http.download_to_file(url, &archive_path)
            .map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?;
        let extracted = scratch.path().join("extracted");
        extract_zip_selective(&archive_path, &extracted)?;
        self.sideload_from_dir(&extracted, expected, pin)
    }

    fn write_pin(&self, pkg: &Pkg, version: &Version) -> Result<(), FetchError> {
        let pin_path = self.cache.version_dir(pkg, version).join("PIN");
        std::fs::write(&pin_path, version.to_string()).map_err(|source| FetchError::Io {
            path: pin_path.display().to_string(),
            source,
        })
    }
}

fn package_identity(elm_json: &str) -> Result<(Pkg, Version), FetchError> {
    match Manifest::from_json(elm_json).map_err(|e| FetchError::Archive {
        path: "elm.json".to_string(),
        source: Box::new(e),
    })? {
        Manifest::Package(p) => Ok((p.name, p.version)),
        Manifest::Application(_) => Err(FetchError::NoPackageRoot(
            "elm.json describes an application, not a publishable package".to_string(),
        )),
    }
}

fn verify_sha1(
    path: &Path,
    pkg: &Pkg,
    version: &Version,
    expected: &str,
) -> Result<(), FetchError> {
    let bytes = std::fs::read(path).map_err(|source| FetchError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    let actual = hex_encode(&hasher.finalize());
    if actual != expected.to_lowercase() {
        return Err(FetchError::ChecksumMismatch {
            pkg: pkg.clone(),
            version: *version,
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Selected top-level names copied out of a package archive, besides `src/`.
const SIDE_FILES: &[&str] = &["elm.json", "docs.json", "LICENSE", "README.md"];

/// Extract `elm.json`, `docs.json`, `LICENSE`, `README.md` and the whole
/// `src/` tree from `zip_path` into `dest`, locating the package root as the
/// first entry containing `elm.json` (archives are typically wrapped in a
/// single `<name>-<version>/` directory). Rejects any entry attempting path
/// traversal.
fn extract_zip_selective(zip_path: &Path, dest: &Path) -> Result<(), FetchError> {
    let file = std::fs::File::open(zip_path).map_err(|source| FetchError::Io {
        path: zip_path.display().to_string(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| FetchError::Archive {
        path: zip_path.display().to_string(),
        source: Box::new(e),
    })?;

    let wrapper = find_wrapper_prefix(&mut archive, zip_path)?;

    std::fs::create_dir_all(dest).map_err(|source| FetchError::Io {
        path: dest.display().to_string(),
        source,
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| FetchError::Archive {
            path: zip_path.display().to_string(),
            source: Box::new(e),
        })?;
        let Some(raw_name) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(FetchError::PathTraversal(entry.name().to_string()));
        };
        let Ok(relative) = raw_name.strip_prefix(&wrapper) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        if !is_selected(relative) {
            continue;
        }
        let out_path = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|source| FetchError::Io {
                path: out_path.display().to_string(),
                source,
            })?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| FetchError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).map_err(|source| FetchError::Io {
            path: out_path.display().to_string(),
            source,
        })?;
        std::fs::write(&out_path, &contents).map_err(|source| FetchError::Io {
            path: out_path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}

fn is_selected(relative: &Path) -> bool {
    if relative.starts_with("src") {
        return true;
    }
    relative
        .to_str()
        .map(|s| SIDE_FILES.contains(&s))
        .unwrap_or(false)
}

fn find_wrapper_prefix(
    archive: &mut zip::ZipArchive<std::fs::File>,
    zip_path: &Path,
) -> Result<PathBuf, FetchError> {
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| FetchError::Archive {
            path: zip_path.display().to_string(),
            source: Box::new(e),
        })?;
        let Some(name) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(FetchError::PathTraversal(entry.name().to_string()));
        };
        if name.file_name().map(|n| n == "elm.json").unwrap_or(false) {
            return Ok(name
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("")));
        }
    }
    Err(FetchError::NoPackageRoot(zip_path.display().to_string()))
}
