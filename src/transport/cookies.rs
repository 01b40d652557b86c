// Session cookie storage
// Shared by every request a transport issues, serializable for persistence

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};

/// A cookie issued by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,

    /// Domain the cookie applies to, without a leading dot
    pub domain: String,

    /// Only sent to `domain` itself, not its subdomains
    #[serde(default)]
    pub host_only: bool,
    pub acquired_at: DateTime<Utc>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            host_only: true,
            acquired_at: Utc::now(),
        }
    }

    /// Parse a Set-Cookie header value received from `host`
    ///
    /// Returns `None` for malformed headers and for cookies the server is
    /// deleting (an expiry in the past or `Max-Age` of zero or less).
    pub fn parse_set_cookie(header: &str, host: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim().trim_matches('"'), host.to_lowercase());

        for attribute in parts {
            let (key, val) = match attribute.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attribute.trim(), ""),
            };

            if key.eq_ignore_ascii_case("domain") {
                let domain = val.trim_start_matches('.').to_lowercase();
                if !domain.is_empty() {
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
            } else if key.eq_ignore_ascii_case("max-age") {
                if val.parse::<i64>().map(|secs| secs <= 0).unwrap_or(false) {
                    return None;
                }
            } else if key.eq_ignore_ascii_case("expires") {
                if let Ok(expires) = DateTime::parse_from_rfc2822(&val.replace('-', " ")) {
                    if expires.with_timezone(&Utc) <= Utc::now() {
                        return None;
                    }
                }
            }
        }

        Some(cookie)
    }

    /// Whether this cookie should be sent to `host`
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        if self.host_only {
            return host == self.domain;
        }
        host == self.domain || host.ends_with(&format!(".{}", self.domain))
    }
}

/// In-memory cookie jar used as reqwest's cookie provider
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<Vec<Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cookie, replacing any cookie with the same name and domain
    pub fn insert(&self, cookie: Cookie) {
        let mut cookies = self.cookies.write();
        cookies.retain(|c| !(c.name == cookie.name && c.domain == cookie.domain));
        cookies.push(cookie);
    }

    pub fn extend(&self, cookies: impl IntoIterator<Item = Cookie>) {
        for cookie in cookies {
            self.insert(cookie);
        }
    }

    /// Copy of every cookie currently held
    pub fn snapshot(&self) -> Vec<Cookie> {
        self.cookies.read().clone()
    }

    pub fn clear(&self) {
        self.cookies.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.read().len()
    }

    /// Cookie header value for a request to `host`
    pub fn header_for(&self, host: &str) -> Option<String> {
        let cookies = self.cookies.read();
        let pairs: Vec<String> = cookies
            .iter()
            .filter(|c| c.matches_host(host))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Remember cookies from Set-Cookie headers received from `host`
    pub fn store_set_cookie_headers<'a>(&self, headers: impl Iterator<Item = &'a str>, host: &str) {
        for header in headers {
            match Cookie::parse_set_cookie(header, host) {
                Some(cookie) => self.insert(cookie),
                None => self.remove_deleted(header, host),
            }
        }
    }

    fn remove_deleted(&self, header: &str, host: &str) {
        if let Some((name, _)) = header.split(';').next().and_then(|p| p.split_once('=')) {
            let name = name.trim();
            self.cookies
                .write()
                .retain(|c| !(c.name == name && c.matches_host(host)));
        }
    }
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &reqwest::Url) {
        let host = url.host_str().unwrap_or_default();
        let headers = cookie_headers.filter_map(|value| value.to_str().ok());
        self.store_set_cookie_headers(headers, host);
    }

    fn cookies(&self, url: &reqwest::Url) -> Option<HeaderValue> {
        let host = url.host_str()?;
        self.header_for(host)
            .and_then(|header| HeaderValue::from_str(&header).ok())
    }
}
