// In-memory transport for unit tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Cookie, CookieJar, HttpRequest, HttpResponse, Transport};
use crate::error::TransportError;

type Handler = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

/// Answers requests with a closure and records everything it sees
///
/// Response cookies are stored into the jar, and jar cookies are not
/// replayed; tests inspect `requests()` and the jar directly.
pub struct StubTransport {
    handler: Handler,
    jar: CookieJar,
    requests: Mutex<Vec<HttpRequest>>,

    /// Cache flag observed by each request, only tracked for caching stubs
    cache_flags: Mutex<Vec<bool>>,
    caching: bool,
    cache_enabled: AtomicBool,
    pending_error: Mutex<Option<TransportError>>,
}

impl StubTransport {
    pub fn new(handler: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            jar: CookieJar::new(),
            requests: Mutex::new(Vec::new()),
            cache_flags: Mutex::new(Vec::new()),
            caching: false,
            cache_enabled: AtomicBool::new(false),
            pending_error: Mutex::new(None),
        }
    }

    /// A stub that reports itself as a caching transport
    pub fn caching(handler: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static) -> Self {
        Self {
            caching: true,
            cache_enabled: AtomicBool::new(true),
            ..Self::new(handler)
        }
    }

    pub fn fail_next_with(&self, error: TransportError) {
        *self.pending_error.lock() = Some(error);
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of requests whose URL ends with `suffix`
    pub fn count_to(&self, suffix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .count()
    }

    pub fn recorded_cache_flags(&self) -> Vec<bool> {
        self.cache_flags.lock().clone()
    }
}

impl Transport for StubTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        if self.caching {
            self.cache_flags.lock().push(self.cache_enabled());
        }

        if let Some(error) = self.pending_error.lock().take() {
            return Err(error);
        }

        let response = (self.handler)(request);
        self.jar.extend(response.cookies.iter().cloned());
        Ok(response)
    }

    fn cookie_jar(&self) -> &CookieJar {
        &self.jar
    }

    fn is_caching(&self) -> bool {
        self.caching
    }

    fn set_cache_enabled(&self, enabled: bool) -> bool {
        self.cache_enabled.swap(enabled, Ordering::SeqCst)
    }
}

/// Response carrying a single cookie
pub fn with_cookie(mut response: HttpResponse, name: &str, value: &str, domain: &str) -> HttpResponse {
    response.cookies.push(Cookie::new(name, value, domain));
    response
}
