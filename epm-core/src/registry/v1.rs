// SPDX-License-Identifier: MPL-2.0

//! V1 registry: a binary list of known versions per package
//! (`registry.dat`), updated incrementally from the legacy
//! `/all-packages` + `/all-packages/since/<N>` HTTP surface, plus
//! on-demand per-version `elm.json` fetches for dependency data.
//!
//! The in-memory version list is persisted to disk in a compact binary
//! format rather than re-parsed from JSON on every run.

use super::RegistryEntry;
use crate::error::RegistryError;
use crate::http::{HeadOutcome, HttpClient};
use crate::manifest::{Manifest, Pkg};
use crate::version::{Range, Version};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const MAGIC: &[u8; 4] = b"ELMR";
const FORMAT_VERSION: u8 = 1;

/// In-memory + on-disk state for the V1 registry protocol.
#[derive(Debug)]
pub struct RegistryV1 {
    entries: BTreeMap<Pkg, RegistryEntry>,
    /// Canonical total version count at the time of the last successful
    /// full fetch or write.
    since: u64,
    /// Last-known `ETag` for `/all-packages`, if any.
    etag: Option<String>,
    path: PathBuf,
    elm_home: PathBuf,
    elm_version: String,
}

/// Whether [`RegistryV1::fetch_update`] actually changed anything.
#[derive(Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Server reported `304 Not Modified`; nothing changed.
    Unchanged,
    /// New versions were merged in.
    Updated,
}

impl RegistryV1 {
    /// An empty registry rooted at `<elm_home>/<elm_version>/packages/`.
    pub fn empty(elm_home: impl Into<PathBuf>, elm_version: impl Into<String>) -> Self {
        let elm_home = elm_home.into();
        let elm_version = elm_version.into();
        let path = Self::packages_dir(&elm_home, &elm_version).join("registry.dat");
        RegistryV1 {
            entries: BTreeMap::new(),
            since: 0,
            etag: None,
            path,
            elm_home,
            elm_version,
        }
    }

    fn packages_dir(elm_home: &Path, elm_version: &str) -> PathBuf {
        elm_home.join(elm_version).join("packages")
    }

    fn etag_path(&self) -> PathBuf {
        self.path.with_extension("dat.etag")
    }

    fn since_count_path(&self) -> PathBuf {
        self.path.with_extension("dat.since-count")
    }

    /// Load `registry.dat` plus its sidecars. `Ok(None)` if the file simply
    /// does not exist yet; `Err` if it exists but fails to parse (spec:
    /// "fail softly on missing file; fail hard on malformed file").
    pub fn load(
        elm_home: impl Into<PathBuf>,
        elm_version: impl Into<String>,
    ) -> Result<Option<Self>, RegistryError> {
        let elm_home = elm_home.into();
        let elm_version = elm_version.into();
        let path = Self::packages_dir(&elm_home, &elm_version).join("registry.dat");
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let (entries, mut since) = decode(&bytes).map_err(|reason| RegistryError::CorruptRegistry {
            path: path.display().to_string(),
            reason,
        })?;

        let mut registry = RegistryV1 {
            entries,
            since,
            etag: std::fs::read_to_string(path.with_extension("dat.etag")).ok(),
            path: path.clone(),
            elm_home,
            elm_version,
        };

        // Repair `since` against the sidecar if they disagree (testable
        // property 12: malformed writes self-heal on load).
        if let Ok(sidecar) = std::fs::read_to_string(registry.since_count_path()) {
            if let Ok(sidecar_since) = sidecar.trim().parse::<u64>() {
                if sidecar_since != since {
                    since = sidecar_since;
                    registry.since = since;
                    registry.write_atomic()?;
                }
            }
        }
        Ok(Some(registry))
    }

    /// Write `registry.dat` (and sidecars) atomically: write to `.tmp`, then
    /// rename.
    pub fn write_atomic(&self) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| RegistryError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let bytes = encode(&self.entries, self.since);
        let tmp_path = self.path.with_extension("dat.tmp");
        write_atomic_bytes(&tmp_path, &self.path, &bytes)?;
        std::fs::write(self.since_count_path(), self.since.to_string()).map_err(|source| {
            RegistryError::Io {
                path: self.since_count_path().display().to_string(),
                source,
            }
        })?;
        if let Some(etag) = &self.etag {
            std::fs::write(self.etag_path(), etag).map_err(|source| RegistryError::Io {
                path: self.etag_path().display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Look up an entry by exact `(author, name)`.
    pub fn find(&self, pkg: &Pkg) -> Option<&RegistryEntry> {
        self.entries.get(pkg)
    }

    /// Whether any package is known at all; an offline process with an
    /// empty registry has nothing to resolve against.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `v` into `pkg`'s entry, creating the entry if needed. Already
    /// having this exact version is a no-op.
    pub fn add_version(&mut self, pkg: &Pkg, v: Version) {
        self.entries
            .entry(pkg.clone())
            .or_insert_with(|| RegistryEntry {
                pkg: pkg.clone(),
                versions: Vec::new(),
            })
            .add_version(v);
    }

    /// `GET <url>/all-packages`, rebuilding the registry from scratch.
    pub fn fetch_all(&mut self, http: &dyn HttpClient, url: &str) -> Result<(), RegistryError> {
        let all_packages_url = format!("{}/all-packages", url);
        let bytes = http
            .get_bytes(&all_packages_url)
            .map_err(|source| RegistryError::Network {
                url: all_packages_url.clone(),
                source,
            })?;
        let payload: BTreeMap<String, Vec<String>> = serde_json::from_slice(&bytes)?;
        self.entries.clear();
        let mut total = 0u64;
        for (pkg_str, versions) in payload {
            let pkg = Pkg::from_str(&pkg_str)
                .map_err(|e| RegistryError::CorruptRegistry {
                    path: all_packages_url.clone(),
                    reason: e.to_string(),
                })?;
            let mut parsed: Vec<Version> = versions
                .iter()
                .map(|v| Version::from_str(v))
                .collect::<Result<_, _>>()
                .map_err(|_| RegistryError::CorruptRegistry {
                    path: all_packages_url.clone(),
                    reason: format!("invalid version in entry for {}", pkg_str),
                })?;
            parsed.sort_by(|a, b| b.cmp(a));
            total += parsed.len() as u64;
            self.entries.insert(pkg.clone(), RegistryEntry { pkg, versions: parsed });
        }
        self.since = total;
        tracing::debug!(since = self.since, "rebuilt V1 registry from /all-packages");
        self.write_atomic()
    }

    /// `GET <url>/all-packages/since/<known_since>`, merging the result in.
    pub fn fetch_since(
        &mut self,
        http: &dyn HttpClient,
        url: &str,
        known_since: u64,
    ) -> Result<(), RegistryError> {
        let since_url = format!("{}/all-packages/since/{}", url, known_since);
        let bytes = http
            .get_bytes(&since_url)
            .map_err(|source| RegistryError::Network {
                url: since_url.clone(),
                source,
            })?;
        let new_versions: Vec<String> = serde_json::from_slice(&bytes)?;
        if new_versions.is_empty() {
            return self.fetch_all(http, url);
        }
        for entry_str in &new_versions {
            let (pkg_str, version_str) = entry_str.rsplit_once('@').ok_or_else(|| {
                RegistryError::CorruptRegistry {
                    path: since_url.clone(),
                    reason: format!("missing '@' in `{}`", entry_str),
                }
            })?;
            let pkg = Pkg::from_str(pkg_str).map_err(|e| RegistryError::CorruptRegistry {
                path: since_url.clone(),
                reason: e.to_string(),
            })?;
            let version = Version::from_str(version_str).map_err(|_| RegistryError::CorruptRegistry {
                path: since_url.clone(),
                reason: format!("invalid version `{}`", version_str),
            })?;
            self.add_version(&pkg, version);
        }
        self.since += new_versions.len() as u64;
        tracing::debug!(added = new_versions.len(), "incremental V1 registry update");
        self.write_atomic()
    }

    /// `HEAD /all-packages` conditioned on the stored ETag; falls back to
    /// [`RegistryV1::fetch_since`] on a change, or does a cold
    /// [`RegistryV1::fetch_all`] if there's no ETag to condition on yet.
    pub fn fetch_update(
        &mut self,
        http: &dyn HttpClient,
        url: &str,
    ) -> Result<UpdateOutcome, RegistryError> {
        let all_packages_url = format!("{}/all-packages", url);
        match &self.etag {
            Some(etag) => {
                match http
                    .head_etag(&all_packages_url, etag)
                    .map_err(|source| RegistryError::Network {
                        url: all_packages_url.clone(),
                        source,
                    })? {
                    HeadOutcome::NotModified => Ok(UpdateOutcome::Unchanged),
                    HeadOutcome::Changed(new_etag) => {
                        if let Some(new_etag) = new_etag {
                            self.etag = Some(new_etag);
                        }
                        self.fetch_since(http, url, self.since)?;
                        Ok(UpdateOutcome::Updated)
                    }
                }
            }
            None => {
                self.fetch_all(http, url)?;
                // No ETag to condition on yet; probe once so the next
                // `fetch_update` can use a conditional HEAD instead of
                // another full fetch.
                if let Ok(HeadOutcome::Changed(Some(new_etag))) =
                    http.head_etag(&all_packages_url, "")
                {
                    self.etag = Some(new_etag);
                    self.write_atomic()?;
                }
                Ok(UpdateOutcome::Updated)
            }
        }
    }

    /// Path to the directory `elm.json` fetches for `pkg@version` are
    /// cached in during dependency resolution, before the package is
    /// actually installed into the cache proper.
    fn elm_json_cache_path(&self, pkg: &Pkg, version: &Version) -> PathBuf {
        self.elm_home
            .join("pubgrub")
            .join("elm_json_cache")
            .join(&pkg.author)
            .join(&pkg.name)
            .join(version.to_string())
            .join("elm.json")
    }

    fn installed_config_path(&self, pkg: &Pkg, version: &Version) -> PathBuf {
        pkg.config_path(&self.elm_home, &self.elm_version)
            .join(version.to_string())
            .join("elm.json")
    }

    /// Fetch (or read from cache) the `elm.json` of `pkg@version`.
    pub fn fetch_dependencies(
        &self,
        pkg: &Pkg,
        version: &Version,
        remote_base_url: &str,
        http: &dyn HttpClient,
    ) -> Result<Vec<(Pkg, Range)>, RegistryError> {
        if let Ok(installed) = std::fs::read_to_string(self.installed_config_path(pkg, version)) {
            return parse_package_dependencies(&installed);
        }
        let cache_path = self.elm_json_cache_path(pkg, version);
        if let Ok(cached) = std::fs::read_to_string(&cache_path) {
            return parse_package_dependencies(&cached);
        }
        let url = format!("{}/{}/elm.json", pkg.to_url(remote_base_url), version);
        let bytes = http.get_bytes(&url).map_err(|source| RegistryError::Network {
            url: url.clone(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if let Some(parent) = cache_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&cache_path, &text);
        parse_package_dependencies(&text)
    }
}

fn parse_package_dependencies(elm_json: &str) -> Result<Vec<(Pkg, Range)>, RegistryError> {
    match Manifest::from_json(elm_json)? {
        Manifest::Package(pkg_manifest) => Ok(pkg_manifest
            .dependencies_iter()
            .map(|(p, r)| (p.clone(), r.clone()))
            .collect()),
        Manifest::Application(_) => Err(RegistryError::CorruptRegistry {
            path: "elm.json".to_string(),
            reason: "expected a package manifest, found an application manifest".to_string(),
        }),
    }
}

impl super::DependencyProvider for RegistryV1 {
    fn get_versions(&self, pkg: &Pkg) -> Result<Vec<Version>, RegistryError> {
        Ok(self
            .find(pkg)
            .map(|entry| entry.versions.clone())
            .unwrap_or_default())
    }

    fn get_dependencies(
        &self,
        pkg: &Pkg,
        version: &Version,
    ) -> Result<Vec<(Pkg, Range)>, RegistryError> {
        // Dependencies under V1 must come from a per-version `elm.json`
        // fetch; without a live HTTP client this provider can only answer
        // from what's already cached on disk.
        let cache_path = self.elm_json_cache_path(pkg, version);
        let installed_path = self.installed_config_path(pkg, version);
        for path in [installed_path, cache_path] {
            if let Ok(text) = std::fs::read_to_string(&path) {
                return parse_package_dependencies(&text);
            }
        }
        Err(RegistryError::VersionNotAvailable {
            pkg: pkg.clone(),
            version: *version,
            known: self.get_versions(pkg)?,
        })
    }
}

fn write_atomic_bytes(tmp_path: &Path, dest: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    let mut file = std::fs::File::create(tmp_path).map_err(|source| RegistryError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    file.write_all(bytes).map_err(|source| RegistryError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    file.flush().map_err(|source| RegistryError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    std::fs::rename(tmp_path, dest).map_err(|source| RegistryError::Io {
        path: dest.display().to_string(),
        source,
    })
}

/// Split a [`Version`] into its `(major, minor, patch)` components for the
/// binary registry format (spec: 3×uint16 per version). Goes through the
/// `Display`/`FromStr` round trip rather than field access, since
/// `SemanticVersion`'s fields are private.
fn version_triple(v: &Version) -> (u16, u16, u16) {
    let rendered = v.to_string();
    let mut parts = rendered.splitn(3, '.');
    let major = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let minor = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let patch = parts.next().unwrap_or("0").parse().unwrap_or(0);
    (major, minor, patch)
}

fn write_varint(buf: &mut Vec<u8>, mut n: u64) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<u64, String> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *bytes.get(*pos).ok_or("unexpected end of file reading varint")?;
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err("varint too long".to_string());
        }
    }
}

fn encode(entries: &BTreeMap<Pkg, RegistryEntry>, since: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.push(FORMAT_VERSION);
    buf.extend_from_slice(&since.to_le_bytes());
    for (pkg, entry) in entries {
        write_varint(&mut buf, pkg.author.len() as u64);
        buf.extend_from_slice(pkg.author.as_bytes());
        write_varint(&mut buf, pkg.name.len() as u64);
        buf.extend_from_slice(pkg.name.as_bytes());
        write_varint(&mut buf, entry.versions.len() as u64);
        for v in &entry.versions {
            let (major, minor, patch) = version_triple(v);
            buf.extend_from_slice(&major.to_le_bytes());
            buf.extend_from_slice(&minor.to_le_bytes());
            buf.extend_from_slice(&patch.to_le_bytes());
        }
    }
    buf
}

fn decode(bytes: &[u8]) -> Result<(BTreeMap<Pkg, RegistryEntry>, u64), String> {
    if bytes.len() < 13 || &bytes[0..4] != MAGIC {
        return Err("bad magic number".to_string());
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(format!("unsupported format version {}", bytes[4]));
    }
    let since = u64::from_le_bytes(bytes[5..13].try_into().unwrap());
    let mut pos = 13;
    let mut entries = BTreeMap::new();
    while pos < bytes.len() {
        let author_len = read_varint(bytes, &mut pos)? as usize;
        let author = std::str::from_utf8(
            bytes
                .get(pos..pos + author_len)
                .ok_or("truncated author")?,
        )
        .map_err(|e| e.to_string())?
        .to_string();
        pos += author_len;
        let name_len = read_varint(bytes, &mut pos)? as usize;
        let name = std::str::from_utf8(bytes.get(pos..pos + name_len).ok_or("truncated name")?)
            .map_err(|e| e.to_string())?
            .to_string();
        pos += name_len;
        let version_count = read_varint(bytes, &mut pos)? as usize;
        let mut versions = Vec::with_capacity(version_count);
        for _ in 0..version_count {
            let chunk = bytes.get(pos..pos + 6).ok_or("truncated version triple")?;
            let major = u16::from_le_bytes([chunk[0], chunk[1]]);
            let minor = u16::from_le_bytes([chunk[2], chunk[3]]);
            let patch = u16::from_le_bytes([chunk[4], chunk[5]]);
            versions.push(Version::new(major as u32, minor as u32, patch as u32));
            pos += 6;
        }
        let pkg = Pkg::new(author, name);
        entries.insert(pkg.clone(), RegistryEntry { pkg, versions });
    }
    Ok((entries, since))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn encode_decode_round_trips() {
        let mut entries = BTreeMap::new();
        let pkg = Pkg::new("elm", "core");
        entries.insert(
            pkg.clone(),
            RegistryEntry {
                pkg,
                versions: vec![v("2.0.0"), v("1.0.5"), v("1.0.0")],
            },
        );
        let bytes = encode(&entries, 3);
        let (decoded, since) = decode(&bytes).unwrap();
        assert_eq!(since, 3);
        assert_eq!(decoded, entries);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let bytes = vec![0u8; 20];
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn add_version_creates_entry_on_demand() {
        let mut registry = RegistryV1::empty("/tmp/does-not-exist-epm-test", "0.19.1");
        let pkg = Pkg::new("elm", "core");
        registry.add_version(&pkg, v("1.0.0"));
        assert_eq!(registry.find(&pkg).unwrap().versions, vec![v("1.0.0")]);
    }
}
