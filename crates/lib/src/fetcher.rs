//! Retrieval of config-referenced resources by URL.
//!
//! `http(s)` goes through one blocking client with retry and backoff;
//! `data:` URLs decode locally; plain paths (and `file://`) read from
//! the local filesystem, which providers use for firmware blobs and
//! config drives. Cloud-object schemes are dispatched by the platform
//! providers themselves and are not handled here.

use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::prelude::*;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use url::Url;

use ignition_config::v3_1::{Resource, Timeouts};
use ignition_config::HashError;

/// Attempts per URL before the fetch is abandoned.
const MAX_ATTEMPTS: u32 = 6;
/// Initial retry backoff; doubled per attempt up to [`MAX_BACKOFF`].
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
/// Response header timeout applied when the config does not set one.
const DEFAULT_RESPONSE_HEADER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FetchError {
    /// The resource definitively does not exist; often non-fatal, the
    /// caller decides.
    #[error("resource not found")]
    NotFound,
    /// The resource requires networking and the fetcher is offline.
    #[error("resource requires networking")]
    NeedsNetwork,
    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("invalid verification hash")]
    Hash(#[from] HashError),
    #[error("hash verification failed: expected {expected}, got {calculated}")]
    HashMismatch { expected: String, calculated: String },
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[derive(Debug, Default)]
pub struct FetchOptions {
    pub headers: Vec<(String, String)>,
    /// `<algo>-<hex>` content hash to verify the fetched bytes against.
    pub expected_hash: Option<String>,
}

/// One fetcher is constructed per engine run; the platform provider may
/// flip it offline for the no-network stage.
pub struct Fetcher {
    client: reqwest::blocking::Client,
    offline: bool,
    total_timeout: Option<Duration>,
}

impl Fetcher {
    pub fn new(offline: bool) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(DEFAULT_RESPONSE_HEADER_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            offline,
            total_timeout: None,
        })
    }

    pub fn offline(&self) -> bool {
        self.offline
    }

    /// Apply the config's timeout section to subsequent fetches.
    pub fn apply_timeouts(&mut self, timeouts: &Timeouts) {
        if let Some(total) = timeouts.http_total {
            self.total_timeout = Some(Duration::from_secs(total.into()));
        }
    }

    /// Cap the time any single fetch may take.
    pub fn set_total_timeout(&mut self, timeout: Duration) {
        self.total_timeout = Some(timeout);
    }

    /// Fetch the contents of `url` into memory.
    pub fn fetch_to_buffer(&self, url: &str, opts: &FetchOptions) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url);
        let data = match parsed {
            Ok(u) if u.scheme() == "data" => fetch_data_url(&u)?,
            Ok(u) if matches!(u.scheme(), "http" | "https") => self.fetch_http(&u, opts)?,
            Ok(u) if u.scheme() == "file" => fetch_path(u.path())?,
            Ok(u) => return Err(FetchError::UnsupportedScheme(u.scheme().to_owned())),
            // bare paths are allowed for local sources
            Err(_) if url.starts_with('/') => fetch_path(url)?,
            Err(e) => return Err(anyhow::Error::new(e).context("parsing url").into()),
        };
        if let Some(expected) = &opts.expected_hash {
            verify_hash(&data, expected)?;
        }
        Ok(data)
    }

    /// Fetch a config resource: its source (if any), verified and
    /// decompressed per the resource's own declarations.
    pub fn fetch_resource(&self, resource: &Resource) -> Result<Option<Vec<u8>>, FetchError> {
        let Some(source) = resource.source.as_deref() else {
            return Ok(None);
        };
        if source.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let opts = FetchOptions {
            headers: resource
                .http_headers
                .iter()
                .map(|h| (h.name.clone(), h.value.clone().unwrap_or_default()))
                .collect(),
            expected_hash: resource.verification.hash.clone(),
        };
        let data = self.fetch_to_buffer(source, &opts)?;
        let data = match resource.compression.as_deref() {
            None | Some("") => data,
            Some("gzip") => {
                let mut out = Vec::new();
                flate2::read::GzDecoder::new(&data[..])
                    .read_to_end(&mut out)
                    .context("decompressing resource")?;
                out
            }
            Some(other) => {
                return Err(anyhow::anyhow!("unsupported compression {other:?}").into())
            }
        };
        Ok(Some(data))
    }

    fn fetch_http(&self, url: &Url, opts: &FetchOptions) -> Result<Vec<u8>, FetchError> {
        if self.offline {
            return Err(FetchError::NeedsNetwork);
        }
        let mut backoff = INITIAL_BACKOFF;
        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            let mut req = self.client.get(url.clone());
            if let Some(t) = self.total_timeout {
                req = req.timeout(t);
            }
            for (name, value) in &opts.headers {
                req = req.header(name, value);
            }
            match req.send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(FetchError::NotFound);
                    }
                    if status.is_success() {
                        let body = resp.bytes().map_err(|e| {
                            FetchError::Failed(anyhow::Error::new(e).context("reading body"))
                        })?;
                        return Ok(body.to_vec());
                    }
                    tracing::warn!("GET {url} returned {status}, retrying");
                    last_err = Some(anyhow::anyhow!("GET {url}: {status}"));
                }
                Err(e) => {
                    tracing::warn!("GET {url} failed: {e}, retrying");
                    last_err = Some(anyhow::Error::new(e).context(format!("GET {url}")));
                }
            }
        }
        Err(FetchError::Failed(
            last_err.unwrap_or_else(|| anyhow::anyhow!("fetch failed")),
        ))
    }
}

fn fetch_path(path: &str) -> Result<Vec<u8>, FetchError> {
    match std::fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchError::NotFound),
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("reading {path}"))
            .into()),
    }
}

/// Decode an RFC 2397 `data:` URL.
fn fetch_data_url(url: &Url) -> Result<Vec<u8>, FetchError> {
    let rest = url.path();
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::Failed(anyhow::anyhow!("malformed data url")))?;
    if meta.ends_with(";base64") {
        BASE64_STANDARD
            .decode(payload)
            .map_err(|e| anyhow::Error::new(e).context("decoding base64 data url").into())
    } else {
        Ok(percent_decode(payload))
    }
}

fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|c| (*c as char).to_digit(16)),
                bytes.get(i + 2).and_then(|c| (*c as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(b);
        i += 1;
    }
    out
}

fn verify_hash(data: &[u8], expected: &str) -> Result<(), FetchError> {
    let (fun, sum) = ignition_config::hash_parts(expected)?;
    let calculated = match fun {
        "sha256" => hex::encode(Sha256::digest(data)),
        "sha512" => hex::encode(Sha512::digest(data)),
        _ => unreachable!("hash_parts only passes known functions"),
    };
    if calculated != sum.to_lowercase() {
        return Err(FetchError::HashMismatch {
            expected: sum.to_lowercase(),
            calculated,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> Fetcher {
        Fetcher::new(true).unwrap()
    }

    #[test]
    fn test_data_url_plain() {
        let data = fetcher()
            .fetch_to_buffer("data:,hello%20world", &FetchOptions::default())
            .unwrap();
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn test_data_url_base64() {
        let data = fetcher()
            .fetch_to_buffer("data:text/plain;base64,aGVsbG8=", &FetchOptions::default())
            .unwrap();
        assert_eq!(data, b"hello");
    }

    #[test]
    fn test_offline_http_needs_network() {
        let e = fetcher()
            .fetch_to_buffer("http://example.invalid/config", &FetchOptions::default())
            .unwrap_err();
        assert!(matches!(e, FetchError::NeedsNetwork));
    }

    #[test]
    fn test_unsupported_scheme() {
        let e = fetcher()
            .fetch_to_buffer("gopher://example/x", &FetchOptions::default())
            .unwrap_err();
        assert!(matches!(e, FetchError::UnsupportedScheme(s) if s == "gopher"));
    }

    #[test]
    fn test_missing_file_not_found() {
        let e = fetcher()
            .fetch_to_buffer("/definitely/not/here", &FetchOptions::default())
            .unwrap_err();
        assert!(matches!(e, FetchError::NotFound));
    }

    #[test]
    fn test_hash_verification() {
        let expected = format!("sha256-{}", hex::encode(Sha256::digest(b"hello")));
        let opts = FetchOptions {
            expected_hash: Some(expected),
            ..Default::default()
        };
        fetcher()
            .fetch_to_buffer("data:;base64,aGVsbG8=", &opts)
            .unwrap();

        let opts = FetchOptions {
            expected_hash: Some(format!("sha256-{}", "0".repeat(64))),
            ..Default::default()
        };
        let e = fetcher()
            .fetch_to_buffer("data:;base64,aGVsbG8=", &opts)
            .unwrap_err();
        assert!(matches!(e, FetchError::HashMismatch { .. }));
    }

    #[test]
    fn test_malformed_hash_is_distinct() {
        let opts = FetchOptions {
            expected_hash: Some("sha256:beef".into()),
            ..Default::default()
        };
        let e = fetcher().fetch_to_buffer("data:,x", &opts).unwrap_err();
        assert!(matches!(e, FetchError::Hash(HashError::Malformed)));
    }

    #[test]
    fn test_fetch_resource_absent_source() {
        let r = Resource::default();
        assert!(fetcher().fetch_resource(&r).unwrap().is_none());
    }
}
