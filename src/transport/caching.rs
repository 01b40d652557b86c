use dashmap::DashMap;
use reqwest::Method;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{CookieJar, HttpRequest, HttpResponse, Transport};
use crate::error::TransportError;

/// Transport wrapper that answers repeated GET requests from memory
///
/// Only successful responses are kept. Caching can be switched off with
/// [`Transport::set_cache_enabled`], which negotiation code does through
/// [`super::CacheSuppression`].
pub struct CachingTransport<T> {
    inner: T,

    /// Responses indexed by request fingerprint
    responses: DashMap<String, HttpResponse>,

    enabled: AtomicBool,
}

impl<T: Transport> CachingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            responses: DashMap::new(),
            enabled: AtomicBool::new(true),
        }
    }

    /// Drop all cached responses
    pub fn clear(&self) {
        self.responses.clear();
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Whether responses are currently served from and stored in memory
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

fn fingerprint(request: &HttpRequest) -> String {
    let mut query = request.query.clone();
    query.sort();
    let mut cookies = request.cookies.clone();
    cookies.sort();

    format!(
        "{} {} {:?} {:?} {}",
        request.method,
        request.url,
        query,
        cookies,
        request.proxy.as_deref().unwrap_or_default()
    )
}

impl<T: Transport> Transport for CachingTransport<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        if !self.enabled.load(Ordering::SeqCst) || request.method != Method::GET {
            return self.inner.execute(request);
        }

        let key = fingerprint(request);
        if let Some(cached) = self.responses.get(&key) {
            tracing::debug!(url = %request.url, "Serving response from transport cache");
            return Ok(cached.clone());
        }

        let response = self.inner.execute(request)?;
        if response.is_success() {
            self.responses.insert(key, response.clone());
        }
        Ok(response)
    }

    fn cookie_jar(&self) -> &CookieJar {
        self.inner.cookie_jar()
    }

    fn is_caching(&self) -> bool {
        true
    }

    fn set_cache_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::SeqCst)
    }
}
