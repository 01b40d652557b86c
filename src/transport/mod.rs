// Transport layer
// Blocking HTTP execution, the session cookie jar, and optional response caching

mod caching;
mod client;
mod cookies;
#[cfg(test)]
pub(crate) mod stub;

use bytes::Bytes;
use reqwest::Method;
use std::borrow::Cow;
use std::time::Duration;

pub use caching::CachingTransport;
pub use client::ReqwestTransport;
pub use cookies::{Cookie, CookieJar};

use crate::error::TransportError;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound request description, independent of the HTTP library
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,

    /// Request-scoped cookies, sent as an explicit Cookie header
    pub cookies: Vec<(String, String)>,

    /// Form body (application/x-www-form-urlencoded)
    pub form: Option<Vec<(String, String)>>,

    /// Proxy URL for this request only
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            form: None,
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, cookie: &Cookie) -> Self {
        self.cookies.push((cookie.name.clone(), cookie.value.clone()));
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.form = Some(fields);
        self
    }

    pub fn proxy(mut self, proxy: Option<&str>) -> Self {
        self.proxy = proxy.map(str::to_string);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Value of a query parameter, if present
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Fully buffered HTTP response
///
/// The body is read eagerly so responses can be cloned and stored by the
/// memoization layer and by [`CachingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,

    /// Final URL after redirects
    pub url: String,
    pub headers: Vec<(String, String)>,

    /// Cookies set by this response (Set-Cookie headers of the final hop)
    pub cookies: Vec<Cookie>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            url: url.into(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A blocking HTTP transport shared by negotiation and data requests
///
/// Implementations own a session cookie jar: cookies set by responses are
/// remembered and replayed on later requests to matching hosts unless the
/// request carries its own cookies.
pub trait Transport: Send + Sync {
    /// Execute a request and buffer the response
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Session cookie jar
    fn cookie_jar(&self) -> &CookieJar;

    /// Whether this transport may answer requests from a response cache
    fn is_caching(&self) -> bool {
        false
    }

    /// Enable or disable response caching, returning the previous setting
    fn set_cache_enabled(&self, _enabled: bool) -> bool {
        false
    }
}

/// Disables transport-level response caching until dropped
///
/// The previous setting is restored on drop, so every exit path of the
/// enclosing scope (early return, `?`, panic unwinding) re-enables caching.
pub struct CacheSuppression<'a> {
    transport: &'a dyn Transport,
    previous: Option<bool>,
}

impl<'a> CacheSuppression<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        let previous = if transport.is_caching() {
            Some(transport.set_cache_enabled(false))
        } else {
            None
        };
        Self {
            transport,
            previous,
        }
    }
}

impl Drop for CacheSuppression<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous {
            self.transport.set_cache_enabled(previous);
        }
    }
}

/// Execute a request with transport caching suppressed for its duration
pub fn execute_uncached(
    transport: &dyn Transport,
    request: &HttpRequest,
) -> Result<HttpResponse, TransportError> {
    let _guard = CacheSuppression::new(transport);
    transport.execute(request)
}

#[cfg(test)]
mod tests {
    use super::stub::StubTransport;
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get("https://example.com/a")
            .query("symbol", "MSFT")
            .header("User-Agent", "test")
            .proxy(Some("http://proxy:8080"))
            .timeout(Duration::from_secs(5));

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.query_value("symbol"), Some("MSFT"));
        assert_eq!(request.query_value("crumb"), None);
        assert_eq!(request.proxy.as_deref(), Some("http://proxy:8080"));
        assert_eq!(request.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_response_helpers() {
        let mut response = HttpResponse::new(200, "https://example.com", r#"{"a":1}"#);
        response
            .headers
            .push(("Content-Type".to_string(), "application/json".to_string()));

        assert!(response.is_success());
        assert_eq!(response.header("content-type"), Some("application/json"));
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["a"], 1);

        let response = HttpResponse::new(404, "https://example.com", "missing");
        assert!(!response.is_success());
        assert_eq!(response.text(), "missing");
    }

    #[test]
    fn test_cache_suppression_restores_setting() {
        let transport = StubTransport::caching(|req| HttpResponse::new(200, &req.url, "ok"));
        assert!(transport.cache_enabled());

        {
            let _guard = CacheSuppression::new(&transport);
            assert!(!transport.cache_enabled());
        }
        assert!(transport.cache_enabled());

        transport.set_cache_enabled(false);
        {
            let _guard = CacheSuppression::new(&transport);
            assert!(!transport.cache_enabled());
        }
        assert!(!transport.cache_enabled());
    }

    #[test]
    fn test_cache_suppression_restores_on_error() {
        let transport = StubTransport::caching(|_| HttpResponse::new(500, "", ""));
        transport.fail_next_with(TransportError::Timeout {
            url: "https://example.com".to_string(),
        });

        let result = execute_uncached(&transport, &HttpRequest::get("https://example.com"));
        assert!(matches!(result, Err(TransportError::Timeout { .. })));
        assert!(transport.cache_enabled());
        assert_eq!(transport.recorded_cache_flags(), vec![false]);
    }

    #[test]
    fn test_cache_suppression_noop_without_caching() {
        let transport = StubTransport::new(|req| HttpResponse::new(200, &req.url, "ok"));
        let _guard = CacheSuppression::new(&transport);
        assert!(!transport.is_caching());
    }
}
