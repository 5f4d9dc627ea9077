// SPDX-License-Identifier: MPL-2.0

//! The HTTP client seam. Kept narrow and trait-based so the
//! resolver/registry layer never depends on `ureq` directly — only this
//! module and `epm-cli` do, and tests can swap in a fake implementation.

use std::io::{Read, Write};
use std::path::Path;

/// Errors a [`HttpClient`] implementation can report. Kept as a boxed
/// `std::error::Error` so callers don't need to depend on `ureq`'s own
/// error type.
pub type HttpError = Box<dyn std::error::Error + Send + Sync>;

/// The four operations the registry and fetcher need from an HTTP client.
pub trait HttpClient {
    /// `GET url`, returning the response body.
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError>;

    /// `GET url` with `If-None-Match: etag`. `Ok(None)` means the server
    /// answered `304 Not Modified`.
    fn get_bytes_if_none_match(
        &self,
        url: &str,
        etag: &str,
    ) -> Result<Option<Vec<u8>>, HttpError>;

    /// `HEAD url` with `If-None-Match: etag`, returning the response's ETag
    /// header if present. Used to probe for changes without a body transfer.
    fn head_etag(&self, url: &str, etag: &str) -> Result<HeadOutcome, HttpError>;

    /// `GET url`, streaming the body straight to `dest` rather than
    /// buffering it in memory (used for package archives).
    fn download_to_file(&self, url: &str, dest: &Path) -> Result<(), HttpError>;
}

/// Outcome of a conditional `HEAD` request.
pub enum HeadOutcome {
    /// The resource changed; here is its current ETag, if the server sent
    /// one.
    Changed(Option<String>),
    /// `304 Not Modified`.
    NotModified,
}

/// `ureq`-backed [`HttpClient`].
pub struct UreqHttpClient {
    timeout_connect_ms: u64,
}

impl UreqHttpClient {
    /// A client with a 10s connect timeout.
    pub fn new() -> Self {
        UreqHttpClient {
            timeout_connect_ms: 10_000,
        }
    }
}

impl Default for UreqHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for UreqHttpClient {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        let response = ureq::get(url)
            .timeout_connect(self.timeout_connect_ms)
            .call();
        if response.error() {
            return Err(format!("GET {} failed: {}", url, response.status()).into());
        }
        let mut buf = Vec::new();
        response.into_reader().read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn get_bytes_if_none_match(
        &self,
        url: &str,
        etag: &str,
    ) -> Result<Option<Vec<u8>>, HttpError> {
        let response = ureq::get(url)
            .timeout_connect(self.timeout_connect_ms)
            .set("If-None-Match", etag)
            .call();
        if response.status() == 304 {
            return Ok(None);
        }
        if response.error() {
            return Err(format!("GET {} failed: {}", url, response.status()).into());
        }
        let mut buf = Vec::new();
        response.into_reader().read_to_end(&mut buf)?;
        Ok(Some(buf))
    }

    fn head_etag(&self, url: &str, etag: &str) -> Result<HeadOutcome, HttpError> {
        let response = ureq::head(url)
            .timeout_connect(self.timeout_connect_ms)
            .set("If-None-Match", etag)
            .call();
        if response.status() == 304 {
            return Ok(HeadOutcome::NotModified);
        }
        if response.error() {
            return Err(format!("HEAD {} failed: {}", url, response.status()).into());
        }
        Ok(HeadOutcome::Changed(
            response.header("ETag").map(str::to_string),
        ))
    }

    fn download_to_file(&self, url: &str, dest: &Path) -> Result<(), HttpError> {
        let response = ureq::get(url)
            .timeout_connect(self.timeout_connect_ms)
            .call();
        if response.error() {
            return Err(format!("GET {} failed: {}", url, response.status()).into());
        }
        let mut file = std::fs::File::create(dest)?;
        std::io::copy(&mut response.into_reader(), &mut file)?;
        file.flush()?;
        Ok(())
    }
}
