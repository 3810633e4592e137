//! RFC-style HTTP response cache with conditional revalidation.

mod backend;

pub use backend::{CacheBackend, CacheStats, MemoryBackend};

use crate::middleware::{Middleware, MiddlewareChain};
use crate::{Response, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{AGE, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use http::{HeaderMap, Method, StatusCode};
use reqwest::Request;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Statuses eligible for caching.
const CACHEABLE_STATUSES: [u16; 11] = [200, 203, 204, 206, 300, 301, 404, 405, 410, 414, 501];

/// Predicate bypassing the cache for matching requests.
pub type SkipCachePredicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Cache configuration.
#[derive(Clone)]
pub struct CacheConfig {
    /// Maximum stored entries.
    pub max_entries: usize,
    /// Maximum total stored bytes.
    pub max_total_bytes: u64,
    /// Maximum size of a single entry.
    pub max_entry_bytes: u64,
    /// Freshness lifetime when the response carries no caching headers.
    pub default_ttl: Duration,
    /// Upper bound for the last-modified heuristic lifetime.
    pub heuristic_cap: Duration,
    /// Bypass predicate.
    pub skip: Option<SkipCachePredicate>,
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("max_entries", &self.max_entries)
            .field("max_total_bytes", &self.max_total_bytes)
            .field("max_entry_bytes", &self.max_entry_bytes)
            .field("default_ttl", &self.default_ttl)
            .field("heuristic_cap", &self.heuristic_cap)
            .field("skip", &self.skip.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            max_total_bytes: 32 * 1024 * 1024,
            max_entry_bytes: 1024 * 1024,
            default_ttl: Duration::from_secs(60),
            heuristic_cap: Duration::from_secs(24 * 60 * 60),
            skip: None,
        }
    }
}

impl CacheConfig {
    /// Set the entry-count bound.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the total byte budget.
    pub fn with_max_total_bytes(mut self, max_total_bytes: u64) -> Self {
        self.max_total_bytes = max_total_bytes;
        self
    }

    /// Set the per-entry size cap.
    pub fn with_max_entry_bytes(mut self, max_entry_bytes: u64) -> Self {
        self.max_entry_bytes = max_entry_bytes;
        self
    }

    /// Set the fallback freshness lifetime.
    pub fn with_default_ttl(mut self, default_ttl: Duration) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    /// Install a bypass predicate.
    pub fn with_skip<F>(mut self, skip: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(skip));
        self
    }
}

/// A stored response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Response status code.
    pub status: u16,
    /// Stored response headers.
    pub headers: HeaderMap,
    /// Stored response body.
    pub body: Bytes,
    /// When the entry was stored or last revalidated.
    pub stored_at: Instant,
    /// Freshness lifetime from `stored_at`.
    pub lifetime: Duration,
    /// `ETag` validator.
    pub etag: Option<String>,
    /// `Last-Modified` validator.
    pub last_modified: Option<String>,
    /// Vary header names with the request values the entry was stored under.
    pub vary: Vec<(String, String)>,
    /// Accounted size in bytes.
    pub size: u64,
}

impl CacheEntry {
    /// Whether the entry is still fresh.
    pub fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() < self.lifetime
    }

    /// Seconds since the entry was stored.
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Whether the entry carries validators for conditional revalidation.
    pub fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

/// Parsed `Cache-Control` directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CacheControl {
    max_age: Option<u64>,
    no_store: bool,
    no_cache: bool,
    private: bool,
}

fn parse_cache_control(headers: &HeaderMap) -> CacheControl {
    let mut parsed = CacheControl::default();
    for value in headers.get_all(http::header::CACHE_CONTROL) {
        let Ok(value) = value.to_str() else { continue };
        for directive in value.split(',') {
            let directive = directive.trim().to_ascii_lowercase();
            match directive.as_str() {
                "no-store" => parsed.no_store = true,
                "no-cache" => parsed.no_cache = true,
                "private" => parsed.private = true,
                _ => {
                    if let Some(seconds) = directive.strip_prefix("max-age=") {
                        parsed.max_age = seconds.trim_matches('"').parse().ok();
                    }
                }
            }
        }
    }
    parsed
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Compute the cache key: method and canonicalized URL.
///
/// Scheme and host are lowercased by the URL parser; query keys are sorted so
/// equivalent URLs collapse to one fingerprint.
pub(crate) fn fingerprint(method: &Method, url: &url::Url) -> String {
    let mut canonical = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));
    if let Some(port) = url.port() {
        canonical.push_str(&format!(":{port}"));
    }
    canonical.push_str(url.path());

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.is_empty() {
        pairs.sort();
        let query: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        canonical.push('?');
        canonical.push_str(&query.join("&"));
    }

    format!("{method}|{canonical}")
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Derive the freshness lifetime: `max-age`, then `Expires`, then the
/// last-modified heuristic, then the configured default.
fn compute_lifetime(headers: &HeaderMap, config: &CacheConfig) -> Duration {
    let cc = parse_cache_control(headers);
    if cc.no_cache {
        return Duration::ZERO;
    }
    if let Some(max_age) = cc.max_age {
        return Duration::from_secs(max_age);
    }

    let now = Utc::now();
    if let Some(expires) = header_str(headers, "expires").and_then(parse_http_date) {
        let delta = (expires - now).num_seconds().max(0) as u64;
        return Duration::from_secs(delta);
    }

    if let Some(last_modified) = header_str(headers, "last-modified").and_then(parse_http_date) {
        let age = (now - last_modified).num_seconds().max(0) as u64;
        return Duration::from_secs(age / 10).min(config.heuristic_cap);
    }

    config.default_ttl
}

fn entry_size(headers: &HeaderMap, body: &Bytes) -> u64 {
    let header_bytes: usize = headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len())
        .sum();
    (body.len() + header_bytes) as u64
}

/// Build a cache entry from a response, or `None` when it is not storable.
fn entry_from_response(
    request_headers: &HeaderMap,
    response: &Response,
    config: &CacheConfig,
) -> Option<CacheEntry> {
    if response.is_streaming() {
        return None;
    }
    let status = response.status().as_u16();
    if !CACHEABLE_STATUSES.contains(&status) {
        return None;
    }

    let headers = response.headers();
    let cc = parse_cache_control(headers);
    if cc.no_store || cc.private {
        return None;
    }

    let mut vary = Vec::new();
    for value in headers.get_all(http::header::VARY) {
        let Ok(value) = value.to_str() else { return None };
        for name in value.split(',') {
            let name = name.trim().to_ascii_lowercase();
            if name == "*" {
                return None;
            }
            if name.is_empty() {
                continue;
            }
            let request_value = header_str(request_headers, &name).unwrap_or("").to_string();
            vary.push((name, request_value));
        }
    }
    vary.sort();

    let body = response.bytes().clone();
    let lifetime = compute_lifetime(headers, config);

    Some(CacheEntry {
        status,
        headers: headers.clone(),
        body: body.clone(),
        stored_at: Instant::now(),
        lifetime,
        etag: header_str(headers, "etag").map(str::to_string),
        last_modified: header_str(headers, "last-modified").map(str::to_string),
        vary,
        size: entry_size(headers, &body),
    })
}

/// Check the stored vary values against the current request.
fn vary_matches(entry: &CacheEntry, request_headers: &HeaderMap) -> bool {
    entry.vary.iter().all(|(name, stored_value)| {
        header_str(request_headers, name).unwrap_or("") == stored_value
    })
}

/// Build a response from a stored entry, rewriting `Age`.
fn response_from_entry(entry: &CacheEntry, url: url::Url) -> Response {
    let mut headers = entry.headers.clone();
    headers.insert(AGE, http::HeaderValue::from(entry.age().as_secs()));
    let status = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);
    Response::from_parts(status, headers, url, entry.body.clone())
}

/// Fold a 304's headers into a stored entry and restart its lifetime.
fn refresh_entry(mut entry: CacheEntry, fresh_headers: &HeaderMap, config: &CacheConfig) -> CacheEntry {
    for (name, value) in fresh_headers {
        if name == &http::header::CONTENT_LENGTH || name == &http::header::TRANSFER_ENCODING {
            continue;
        }
        entry.headers.insert(name.clone(), value.clone());
    }

    entry.etag = header_str(&entry.headers, "etag").map(str::to_string);
    entry.last_modified = header_str(&entry.headers, "last-modified").map(str::to_string);
    entry.lifetime = compute_lifetime(&entry.headers, config);
    entry.stored_at = Instant::now();
    entry.size = entry_size(&entry.headers, &entry.body);
    entry
}

/// HTTP cache middleware.
pub struct CacheMiddleware {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
}

impl CacheMiddleware {
    /// Create a cache middleware over the given backend.
    pub fn new(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self { config, backend }
    }

    fn bypass(&self, request: &Request, next: &MiddlewareChain) -> bool {
        if next.overrides().streaming {
            return true;
        }
        if let Some(skip) = &self.config.skip {
            if skip(request) {
                return true;
            }
        }
        request.method() != Method::GET && request.method() != Method::HEAD
    }

    async fn store_if_cacheable(
        &self,
        key: &str,
        request_headers: &HeaderMap,
        response: &Response,
    ) {
        if let Some(entry) = entry_from_response(request_headers, response, &self.config) {
            debug!(key, lifetime_secs = entry.lifetime.as_secs(), "Storing response in cache");
            self.backend.put(key.to_string(), entry).await;
        }
    }
}

#[async_trait]
impl Middleware for CacheMiddleware {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn handle(&self, mut request: Request, next: &MiddlewareChain) -> Result<Response> {
        if self.bypass(&request, next) {
            return next.next(request).await;
        }

        let key = fingerprint(request.method(), request.url());
        let url = request.url().clone();
        let request_headers = request.headers().clone();

        let stale = match self.backend.get(&key).await {
            Some(entry) if vary_matches(&entry, &request_headers) => {
                if entry.is_fresh() {
                    debug!(key = %key, "Cache hit");
                    return Ok(response_from_entry(&entry, url));
                }
                Some(entry)
            }
            // Different variant or nothing stored; treat as a miss.
            _ => None,
        };

        if let Some(entry) = stale {
            if entry.has_validators() {
                if let Some(etag) = &entry.etag {
                    if let Ok(value) = etag.parse() {
                        request.headers_mut().insert(IF_NONE_MATCH, value);
                    }
                }
                if let Some(last_modified) = &entry.last_modified {
                    if let Ok(value) = last_modified.parse() {
                        request.headers_mut().insert(IF_MODIFIED_SINCE, value);
                    }
                }

                let response = next.next(request).await?;
                if response.status() == StatusCode::NOT_MODIFIED {
                    debug!(key = %key, "Revalidated cache entry");
                    let refreshed = refresh_entry(entry, response.headers(), &self.config);
                    let served = response_from_entry(&refreshed, url);
                    self.backend.put(key, refreshed).await;
                    return Ok(served);
                }

                self.store_if_cacheable(&key, &request_headers, &response).await;
                return Ok(response);
            }

            // Stale without validators: plain refetch.
            let response = next.next(request).await?;
            self.store_if_cacheable(&key, &request_headers, &response).await;
            return Ok(response);
        }

        let response = next.next(request).await?;
        self.store_if_cacheable(&key, &request_headers, &response).await;
        Ok(response)
    }
}
