//! Freshness-aware loader for local and remote (`https://`) policy sources.
//!
//! Two freshness regimes, matching the component design: local files
//! re-stat on access once an observation window elapses; remote URLs are
//! revalidated against their cached `Expires`/`ETag` once they go stale,
//! and keep serving the previous entry if the revalidation request fails
//! (stale-over-fresh is the point, not a bug).

use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use reqwest::Client;
use time::OffsetDateTime;
use twox_hash::XxHash64;
use std::hash::Hasher;

use crate::error::FileCacheError;

const MAX_ENTRY_BYTES: usize = 1024 * 1024;
const LOCAL_RESTAT_WINDOW: Duration = Duration::from_secs(20);
const DEFAULT_REMOTE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub content: Vec<u8>,
    pub content_hash: u64,
    freshness: Freshness,
}

#[derive(Debug, Clone)]
enum Freshness {
    Local {
        mtime: SystemTime,
        observed_at: Instant,
    },
    Remote {
        expires_at: Instant,
        etag: Option<String>,
    },
}

pub fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

pub struct FileCache {
    entries: DashMap<String, FileEntry>,
    client: Client,
    local_restat_window: Duration,
    remote_default_ttl: Duration,
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FileCache {
    /// Default freshness windows (20 s local re-stat, 5 min remote TTL).
    pub fn new() -> Self {
        Self::with_freshness(LOCAL_RESTAT_WINDOW, DEFAULT_REMOTE_TTL)
    }

    /// Freshness windows taken from configuration rather than the
    /// built-in defaults — `local_restat_window` for the local-file
    /// re-stat regime, `remote_default_ttl` for remote sources whose
    /// response carries no `Expires` header.
    pub fn with_freshness(local_restat_window: Duration, remote_default_ttl: Duration) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            entries: DashMap::new(),
            client,
            local_restat_window,
            remote_default_ttl,
        }
    }

    /// Returns the freshness-checked entry for `name`, fetching or
    /// refreshing it as needed. `name` is either a local filesystem path
    /// or an `https://` URL.
    pub async fn get(&self, name: &str) -> Result<FileEntry, FileCacheError> {
        if name.starts_with("https://") {
            self.get_remote(name).await
        } else {
            self.get_local(name).await
        }
    }

    async fn get_local(&self, name: &str) -> Result<FileEntry, FileCacheError> {
        if let Some(entry) = self.entries.get(name) {
            if let Freshness::Local { observed_at, .. } = &entry.freshness {
                if observed_at.elapsed() < self.local_restat_window {
                    return Ok(entry.clone());
                }
            }
        }

        let metadata = match tokio::fs::metadata(name).await {
            Ok(m) => m,
            Err(e) => {
                return self
                    .stale_or_err(name, FileCacheError::Fetch {
                        source: name.to_string(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        };
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if let Some(entry) = self.entries.get(name) {
            if let Freshness::Local { mtime: cached_mtime, .. } = &entry.freshness {
                if *cached_mtime == mtime {
                    let mut refreshed = entry.clone();
                    refreshed.freshness = Freshness::Local {
                        mtime,
                        observed_at: Instant::now(),
                    };
                    drop(entry);
                    self.entries.insert(name.to_string(), refreshed.clone());
                    return Ok(refreshed);
                }
            }
        }

        let bytes = match tokio::fs::read(name).await {
            Ok(b) => b,
            Err(e) => {
                return self
                    .stale_or_err(name, FileCacheError::Fetch {
                        source: name.to_string(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        };
        if bytes.len() > MAX_ENTRY_BYTES {
            return Err(FileCacheError::TooLarge(name.to_string()));
        }

        let entry = FileEntry {
            name: name.to_string(),
            content_hash: content_hash(&bytes),
            content: bytes,
            freshness: Freshness::Local {
                mtime,
                observed_at: Instant::now(),
            },
        };
        self.entries.insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    async fn get_remote(&self, url: &str) -> Result<FileEntry, FileCacheError> {
        if let Some(entry) = self.entries.get(url) {
            if let Freshness::Remote { expires_at, .. } = &entry.freshness {
                if Instant::now() < *expires_at {
                    return Ok(entry.clone());
                }
            }
        }

        let etag = self.entries.get(url).and_then(|e| match &e.freshness {
            Freshness::Remote { etag, .. } => etag.clone(),
            _ => None,
        });

        let mut request = self.client.get(url);
        if let Some(etag) = &etag {
            request = request.header("If-None-Match", etag);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                return self
                    .stale_or_err(url, FileCacheError::Fetch {
                        source: url.to_string(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        };

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            let new_etag = response
                .headers()
                .get("etag")
                .and_then(|v| v.to_str().ok())
                .map(String::from)
                .or(etag);
            let expires_at = remote_expiry(response.headers(), self.remote_default_ttl);
            if let Some(mut entry) = self.entries.get(url).map(|e| e.clone()) {
                entry.freshness = Freshness::Remote {
                    expires_at,
                    etag: new_etag,
                };
                self.entries.insert(url.to_string(), entry.clone());
                return Ok(entry);
            }
            return Err(FileCacheError::NotFound(url.to_string()));
        }

        if !response.status().is_success() {
            return self
                .stale_or_err(url, FileCacheError::Fetch {
                    source: url.to_string(),
                    reason: format!("non-2xx status {}", response.status()),
                })
                .await;
        }

        let headers = response.headers().clone();
        let new_etag = headers
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let expires_at = remote_expiry(&headers, self.remote_default_ttl);

        let bytes = match response.bytes().await {
            Ok(b) => b.to_vec(),
            Err(e) => {
                return self
                    .stale_or_err(url, FileCacheError::Fetch {
                        source: url.to_string(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        };
        if bytes.len() > MAX_ENTRY_BYTES {
            return Err(FileCacheError::TooLarge(url.to_string()));
        }

        let entry = FileEntry {
            name: url.to_string(),
            content_hash: content_hash(&bytes),
            content: bytes,
            freshness: Freshness::Remote {
                expires_at,
                etag: new_etag,
            },
        };
        self.entries.insert(url.to_string(), entry.clone());
        Ok(entry)
    }

    /// On transport/parse failure, fall back to the previously cached
    /// entry rather than erroring, per the component design's explicit
    /// "stale over fresh" availability trade-off. Only errors when no
    /// entry has ever been cached.
    async fn stale_or_err(&self, name: &str, err: FileCacheError) -> Result<FileEntry, FileCacheError> {
        if let Some(entry) = self.entries.get(name) {
            tracing::warn!(source = name, error = %err, "refresh failed, serving stale entry");
            return Ok(entry.clone());
        }
        Err(FileCacheError::NotFound(name.to_string()))
    }
}

fn remote_expiry(headers: &reqwest::header::HeaderMap, default_ttl: Duration) -> Instant {
    if let Some(expires) = headers.get("expires").and_then(|v| v.to_str().ok()) {
        if let Ok(parsed) = httpdate_to_instant(expires) {
            return parsed;
        }
    }
    Instant::now() + default_ttl
}

/// Converts an HTTP-date `Expires` header value into an `Instant`, anchored
/// on the gap between that timestamp and "now" in wall-clock time.
fn httpdate_to_instant(value: &str) -> Result<Instant, ()> {
    let format = time::format_description::well_known::Rfc2822;
    let parsed = OffsetDateTime::parse(value, &format).map_err(|_| ())?;
    let now = OffsetDateTime::now_utc();
    let delta = parsed - now;
    if delta.is_negative() {
        Ok(Instant::now())
    } else {
        Ok(Instant::now() + Duration::from_secs(delta.whole_seconds().max(0) as u64))
    }
}
