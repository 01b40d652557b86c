// Memoized fetcher
// Bounded LRU of responses keyed by the canonical form of fetch arguments

use lru::LruCache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::args::{CanonicalPairs, CanonicalProxy, FetchArgs};
use crate::error::Result;
use crate::http_client::{decode_json, DataClient};
use crate::transport::HttpResponse;

/// Default number of memoized responses
pub const DEFAULT_CAPACITY: usize = 64;

/// Hashable identity of a `fetch` call
///
/// Mappings are compared regardless of insertion order; sequences must
/// match element by element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    url: String,
    headers: Option<CanonicalPairs>,
    params: Option<CanonicalPairs>,
    proxy: Option<CanonicalProxy>,
    timeout: Duration,
}

impl FetchKey {
    pub fn new(url: &str, args: &FetchArgs) -> Self {
        Self {
            url: url.to_string(),
            headers: args.headers.as_ref().map(|h| h.canonical()),
            params: args.params.as_ref().map(|p| p.canonical()),
            proxy: args.proxy.as_ref().map(|p| p.canonical()),
            timeout: args.timeout,
        }
    }
}

/// Hit/miss counters and occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

/// Wraps a [`DataClient`] so identical calls hit the network once
///
/// Every completed response is stored, including 4xx/5xx answers; failed
/// calls are not.
pub struct MemoizedFetcher {
    client: DataClient,
    entries: Mutex<LruCache<FetchKey, HttpResponse>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoizedFetcher {
    pub fn new(client: DataClient) -> Self {
        Self::with_capacity(client, NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn with_capacity(client: DataClient, capacity: NonZeroUsize) -> Self {
        Self {
            client,
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn client(&self) -> &DataClient {
        &self.client
    }

    /// Memoized [`DataClient::fetch`]
    pub fn fetch(&self, url: &str, args: &FetchArgs) -> Result<HttpResponse> {
        let key = FetchKey::new(url, args);

        if let Some(response) = self.entries.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(url = %url, "Memo cache hit");
            return Ok(response.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Lock is released while the request is in flight
        let response = self.client.fetch(url, args)?;
        self.entries.lock().put(key, response.clone());
        Ok(response)
    }

    /// Memoized fetch followed by status check and JSON decoding
    pub fn fetch_json<T: DeserializeOwned>(&self, url: &str, args: &FetchArgs) -> Result<T> {
        decode_json(self.fetch(url, args)?)
    }

    pub fn stats(&self) -> MemoStats {
        let entries = self.entries.lock();
        MemoStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: entries.len(),
            capacity: entries.cap().get(),
        }
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        tracing::debug!("Memo cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Pairs;
    use crate::auth::{AuthState, CredentialCache, Endpoints, SessionManager};
    use crate::error::{FetchError, TransportError};
    use crate::transport::stub::{with_cookie, StubTransport};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn stub(data_status: u16) -> Arc<StubTransport> {
        Arc::new(StubTransport::new(move |req| {
            let url = req.url.as_str();
            if url.ends_with("/bootstrap") {
                with_cookie(HttpResponse::new(404, url, ""), "A", "1", "stub")
            } else if url.ends_with("/v1/test/getcrumb") {
                HttpResponse::new(200, url, "abc")
            } else {
                HttpResponse::new(data_status, url, r#"{"ok":true}"#)
            }
        }))
    }

    fn fetcher(transport: Arc<StubTransport>, capacity: usize) -> MemoizedFetcher {
        let session = SessionManager::with_state(
            transport.clone(),
            AuthState::isolated(),
            Arc::new(CredentialCache::in_memory()),
            Endpoints::rooted_at("http://stub"),
        );
        let client = DataClient::with_session("MSFT", transport, session);
        MemoizedFetcher::with_capacity(client, NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn test_identical_calls_hit_network_once() {
        let transport = stub(200);
        let fetcher = fetcher(transport.clone(), DEFAULT_CAPACITY);
        let args = FetchArgs::new().params([("symbol", "MSFT")]);

        let first = fetcher.fetch("http://stub/quote", &args).unwrap();
        let second = fetcher.fetch("http://stub/quote", &args).unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.count_to("/quote"), 1);
        assert_eq!(
            fetcher.stats(),
            MemoStats { hits: 1, misses: 1, len: 1, capacity: DEFAULT_CAPACITY }
        );
    }

    #[test]
    fn test_distinct_arguments_are_distinct_entries() {
        let transport = stub(200);
        let fetcher = fetcher(transport.clone(), DEFAULT_CAPACITY);

        fetcher.fetch("http://stub/quote", &FetchArgs::new()).unwrap();
        fetcher
            .fetch("http://stub/quote", &FetchArgs::new().timeout(Duration::from_secs(5)))
            .unwrap();
        fetcher
            .fetch("http://stub/quote", &FetchArgs::new().proxy("http://p:1"))
            .unwrap();

        assert_eq!(transport.count_to("/quote"), 3);
        assert_eq!(fetcher.stats().len, 3);
    }

    #[test]
    fn test_error_responses_are_memoized() {
        let transport = stub(500);
        let fetcher = fetcher(transport.clone(), DEFAULT_CAPACITY);

        let first = fetcher.fetch("http://stub/quote", &FetchArgs::new()).unwrap();
        assert_eq!(first.status, 500);
        let calls = transport.count_to("/quote");

        let result = fetcher.fetch_json::<serde_json::Value>("http://stub/quote", &FetchArgs::new());
        assert!(matches!(result, Err(FetchError::Status { status: 500, .. })));
        assert_eq!(transport.count_to("/quote"), calls);
    }

    #[test]
    fn test_failures_are_not_memoized() {
        let transport = stub(200);
        let fetcher = fetcher(transport.clone(), DEFAULT_CAPACITY);
        // Negotiate first so the injected failure lands on the data request
        fetcher.client().session().cookie_and_crumb(None, Duration::from_secs(5)).unwrap();

        transport.fail_next_with(TransportError::Timeout {
            url: "http://stub/quote".to_string(),
        });
        assert!(fetcher.fetch("http://stub/quote", &FetchArgs::new()).is_err());
        assert_eq!(fetcher.stats().len, 0);

        fetcher.fetch("http://stub/quote", &FetchArgs::new()).unwrap();
        assert_eq!(transport.count_to("/quote"), 2);
    }

    #[test]
    fn test_invalid_argument_not_memoized() {
        let transport = stub(200);
        let fetcher = fetcher(transport.clone(), DEFAULT_CAPACITY);
        let args = FetchArgs::new().params([("crumb", "x")]);

        assert!(fetcher.fetch("http://stub/quote", &args).is_err());
        assert!(fetcher.fetch("http://stub/quote", &args).is_err());
        assert_eq!(transport.request_count(), 0);
        assert_eq!(fetcher.stats().len, 0);
    }

    #[test]
    fn test_lru_eviction() {
        let transport = stub(200);
        let fetcher = fetcher(transport.clone(), 2);

        fetcher.fetch("http://stub/a", &FetchArgs::new()).unwrap();
        fetcher.fetch("http://stub/b", &FetchArgs::new()).unwrap();
        fetcher.fetch("http://stub/a", &FetchArgs::new()).unwrap();
        fetcher.fetch("http://stub/c", &FetchArgs::new()).unwrap();

        // "b" was least recently used
        fetcher.fetch("http://stub/b", &FetchArgs::new()).unwrap();
        assert_eq!(transport.count_to("/a"), 1);
        assert_eq!(transport.count_to("/b"), 2);
        assert_eq!(fetcher.stats().len, 2);
    }

    #[test]
    fn test_clear() {
        let transport = stub(200);
        let fetcher = fetcher(transport.clone(), DEFAULT_CAPACITY);

        fetcher.fetch("http://stub/quote", &FetchArgs::new()).unwrap();
        fetcher.clear();
        assert_eq!(fetcher.stats(), MemoStats { hits: 0, misses: 0, len: 0, capacity: DEFAULT_CAPACITY });

        fetcher.fetch("http://stub/quote", &FetchArgs::new()).unwrap();
        assert_eq!(transport.count_to("/quote"), 2);
    }

    #[test]
    fn test_sequence_order_matters() {
        let a = FetchKey::new("u", &FetchArgs::new().params([("a", "1"), ("b", "2")]));
        let b = FetchKey::new("u", &FetchArgs::new().params([("b", "2"), ("a", "1")]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_map_and_sequence_differ() {
        let map: Pairs = HashMap::from([("a".to_string(), "1".to_string())]).into();
        let seq = Pairs::from([("a", "1")]);
        assert_ne!(
            FetchKey::new("u", &FetchArgs::new().params(map)),
            FetchKey::new("u", &FetchArgs::new().params(seq)),
        );
    }

    proptest! {
        #[test]
        fn test_map_key_ignores_insertion_order(
            entries in proptest::collection::hash_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..12)
        ) {
            let forward: Vec<(String, String)> = entries.clone().into_iter().collect();
            let mut reversed = forward.clone();
            reversed.reverse();

            let first: HashMap<String, String> = forward.into_iter().collect();
            let second: HashMap<String, String> = reversed.into_iter().collect();

            let a = FetchKey::new("u", &FetchArgs::new().params(first).headers(entries.clone()));
            let b = FetchKey::new("u", &FetchArgs::new().params(second).headers(entries));
            prop_assert_eq!(a, b);
        }
    }
}
