//! Per-URL cache of externally-imported calendar feeds.
//!
//! Feeds are fetched in parallel with independent failure isolation: a dead
//! feed logs a warning and contributes no blocks, it never fails resolution
//! for the whole listing. Entries expire after a TTL and can be invalidated
//! explicitly for any subset of URLs.

use super::ical::{BlockedPeriod, parse_ical};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Fetches one calendar feed. Abstracted so tests never touch the network.
#[async_trait]
pub trait CalendarFetcher: Send + Sync {
    /// Fetches and parses the feed at `url` into blocked periods.
    async fn fetch(&self, url: &str) -> Result<Vec<BlockedPeriod>>;
}

/// Production fetcher: HTTP GET with a timeout, body parsed as iCal.
pub struct HttpCalendarFetcher {
    client: reqwest::Client,
}

impl HttpCalendarFetcher {
    /// Builds a fetcher with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(anyhow::Error::new(e).context("http client")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CalendarFetcher for HttpCalendarFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<BlockedPeriod>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::GatewayUnavailable(format!("calendar feed {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::GatewayUnavailable(format!(
                "calendar feed {url}: status {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::GatewayUnavailable(format!("calendar feed {url}: {e}")))?;
        Ok(parse_ical(&body))
    }
}

struct CacheEntry {
    periods: Vec<BlockedPeriod>,
    fetched_at: Instant,
}

/// TTL cache over a [`CalendarFetcher`], keyed by feed URL.
///
/// Safe to lose: entries live only in memory and are repopulated on the next
/// read.
pub struct ExternalCalendarCache {
    fetcher: std::sync::Arc<dyn CalendarFetcher>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ExternalCalendarCache {
    /// Creates a cache over `fetcher` with the given entry TTL.
    #[must_use]
    pub fn new(fetcher: std::sync::Arc<dyn CalendarFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Blocked periods across all `urls`, serving fresh entries from cache
    /// and fetching the rest in parallel. A failing source is logged and
    /// treated as contributing no blocks.
    pub async fn blocked_periods(&self, urls: &[String]) -> Vec<BlockedPeriod> {
        let mut periods = Vec::new();
        let mut to_fetch = Vec::new();
        {
            let entries = self.entries.read().await;
            for url in urls {
                match entries.get(url) {
                    Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                        periods.extend(entry.periods.iter().copied());
                    }
                    _ => to_fetch.push(url.clone()),
                }
            }
        }
        if to_fetch.is_empty() {
            return periods;
        }

        let fetches = to_fetch.iter().map(|url| {
            let fetcher = self.fetcher.clone();
            async move {
                let result = fetcher.fetch(url).await;
                (url.clone(), result)
            }
        });
        let results = futures::future::join_all(fetches).await;

        let mut entries = self.entries.write().await;
        for (url, result) in results {
            match result {
                Ok(fetched) => {
                    periods.extend(fetched.iter().copied());
                    entries.insert(
                        url,
                        CacheEntry {
                            periods: fetched,
                            fetched_at: Instant::now(),
                        },
                    );
                }
                Err(err) => {
                    // Degrade gracefully: one dead feed must not block the
                    // listing. No cache entry is written, so the next read
                    // retries.
                    crate::metrics::calendar_fetch_failure();
                    tracing::warn!(url = %url, error = %err, "external calendar fetch failed");
                }
            }
        }
        periods
    }

    /// Drops cache entries for exactly the given URLs, forcing a refetch on
    /// the next read. Callers who only know a subset of a listing's sources
    /// can still refresh just those.
    pub async fn invalidate(&self, urls: &[String]) {
        let mut entries = self.entries.write().await;
        for url in urls {
            entries.remove(url);
        }
    }
}

/// Programmable fetcher for tests: per-URL canned results and a call counter.
#[derive(Default)]
pub struct MockCalendarFetcher {
    responses: Mutex<HashMap<String, Result<Vec<BlockedPeriod>, String>>>,
    calls: Mutex<Vec<String>>,
}

impl MockCalendarFetcher {
    /// Creates an empty mock; unknown URLs return an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cans a successful response for `url`.
    pub fn succeed_with(&self, url: &str, periods: Vec<BlockedPeriod>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url.to_string(), Ok(periods));
        }
    }

    /// Cans a failure for `url`.
    pub fn fail_with(&self, url: &str, message: &str) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url.to_string(), Err(message.to_string()));
        }
    }

    /// Number of fetches issued for `url`.
    #[must_use]
    pub fn fetch_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|u| *u == url).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CalendarFetcher for MockCalendarFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<BlockedPeriod>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }
        let canned = self
            .responses
            .lock()
            .ok()
            .and_then(|responses| responses.get(url).cloned());
        match canned {
            Some(Ok(periods)) => Ok(periods),
            Some(Err(message)) => Err(Error::GatewayUnavailable(message)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn period(y: i32, m: u32, d: u32, nights: u64) -> BlockedPeriod {
        let start = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        BlockedPeriod {
            start,
            end: start + chrono::Days::new(nights),
        }
    }

    #[tokio::test]
    async fn serves_from_cache_within_ttl() {
        let fetcher = Arc::new(MockCalendarFetcher::new());
        fetcher.succeed_with("https://feed.example/a.ics", vec![period(2026, 3, 10, 2)]);
        let cache = ExternalCalendarCache::new(fetcher.clone(), Duration::from_secs(600));

        let urls = vec!["https://feed.example/a.ics".to_string()];
        assert_eq!(cache.blocked_periods(&urls).await.len(), 1);
        assert_eq!(cache.blocked_periods(&urls).await.len(), 1);
        assert_eq!(fetcher.fetch_count("https://feed.example/a.ics"), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let fetcher = Arc::new(MockCalendarFetcher::new());
        fetcher.succeed_with("https://feed.example/a.ics", vec![period(2026, 3, 10, 2)]);
        let cache = ExternalCalendarCache::new(fetcher.clone(), Duration::ZERO);

        let urls = vec!["https://feed.example/a.ics".to_string()];
        cache.blocked_periods(&urls).await;
        cache.blocked_periods(&urls).await;
        assert_eq!(fetcher.fetch_count("https://feed.example/a.ics"), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch_of_named_urls_only() {
        let fetcher = Arc::new(MockCalendarFetcher::new());
        fetcher.succeed_with("https://feed.example/a.ics", vec![period(2026, 3, 10, 2)]);
        fetcher.succeed_with("https://feed.example/b.ics", vec![period(2026, 4, 1, 3)]);
        let cache = ExternalCalendarCache::new(fetcher.clone(), Duration::from_secs(600));

        let urls = vec![
            "https://feed.example/a.ics".to_string(),
            "https://feed.example/b.ics".to_string(),
        ];
        cache.blocked_periods(&urls).await;
        cache.invalidate(&["https://feed.example/a.ics".to_string()]).await;
        cache.blocked_periods(&urls).await;

        assert_eq!(fetcher.fetch_count("https://feed.example/a.ics"), 2);
        assert_eq!(fetcher.fetch_count("https://feed.example/b.ics"), 1);
    }

    #[tokio::test]
    async fn one_dead_feed_does_not_block_the_rest() {
        let fetcher = Arc::new(MockCalendarFetcher::new());
        fetcher.succeed_with("https://feed.example/ok.ics", vec![period(2026, 3, 10, 2)]);
        fetcher.fail_with("https://feed.example/dead.ics", "connection refused");
        let cache = ExternalCalendarCache::new(fetcher, Duration::from_secs(600));

        let urls = vec![
            "https://feed.example/dead.ics".to_string(),
            "https://feed.example/ok.ics".to_string(),
        ];
        let periods = cache.blocked_periods(&urls).await;
        assert_eq!(periods.len(), 1);
    }
}
