// SPDX-License-Identifier: MPL-2.0

//! Shared fixtures for the end-to-end scenarios, in the spirit of the
//! per-module `temp_dir`/`write_sample_zip` helpers already used by
//! `epm_core`'s own unit tests.

use epm_core::http::{HeadOutcome, HttpClient, HttpError};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// An isolated scratch directory, removed and recreated on each call.
pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "epm-e2e-{}-{}-{}",
        name,
        std::process::id(),
        name.len()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// A package archive wrapped the way the real registry publishes them:
/// `<name>-<version>/{elm.json,src/...}`.
pub fn write_sample_zip(path: &Path, wrapper: &str, elm_json: &str, modules: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip.start_file(format!("{}/elm.json", wrapper), options)
        .unwrap();
    zip.write_all(elm_json.as_bytes()).unwrap();
    for (name, contents) in modules {
        zip.start_file(format!("{}/src/{}", wrapper, name), options)
            .unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// A canned HTTP client: bodies keyed by exact URL, an optional byte
/// payload served to [`HttpClient::download_to_file`], and ETag-aware
/// responses to [`HttpClient::head_etag`]/[`HttpClient::get_bytes_if_none_match`].
/// Records every URL it was asked to fetch, so tests can assert a request
/// was (or was not) made.
#[derive(Default)]
pub struct FakeHttpClient {
    bodies: HashMap<String, Vec<u8>>,
    download: Option<Vec<u8>>,
    etag: Option<String>,
    requested: Mutex<Vec<String>>,
}

impl FakeHttpClient {
    pub fn new() -> Self {
        FakeHttpClient::default()
    }

    pub fn with_body(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }

    pub fn with_download(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.download = Some(bytes.into());
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl HttpClient for FakeHttpClient {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| format!("no fixture body for {}", url).into())
    }

    fn get_bytes_if_none_match(
        &self,
        url: &str,
        _etag: &str,
    ) -> Result<Option<Vec<u8>>, HttpError> {
        self.get_bytes(url).map(Some)
    }

    fn head_etag(&self, url: &str, etag: &str) -> Result<HeadOutcome, HttpError> {
        self.requested.lock().unwrap().push(format!("HEAD {}", url));
        match &self.etag {
            Some(current) if current == etag => Ok(HeadOutcome::NotModified),
            Some(current) => Ok(HeadOutcome::Changed(Some(current.clone()))),
            None => Ok(HeadOutcome::Changed(None)),
        }
    }

    fn download_to_file(&self, url: &str, dest: &Path) -> Result<(), HttpError> {
        self.requested.lock().unwrap().push(url.to_string());
        let bytes = self
            .download
            .as_ref()
            .ok_or("no fixture archive configured")?;
        std::fs::write(dest, bytes)?;
        Ok(())
    }
}
