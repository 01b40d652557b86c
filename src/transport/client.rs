use dashmap::DashMap;
use reqwest::blocking::Client;
use reqwest::header::{COOKIE, SET_COOKIE};
use std::sync::Arc;
use std::time::Duration;

use super::{Cookie, CookieJar, HttpRequest, HttpResponse, Transport};
use crate::error::TransportError;

/// Blocking reqwest transport
///
/// reqwest binds proxies to a client, so one client is built per distinct
/// proxy URL. Every client shares the same cookie jar.
pub struct ReqwestTransport {
    /// Clients indexed by proxy URL ("" for direct connections)
    clients: DashMap<String, Client>,

    /// Session cookies shared by all clients
    jar: Arc<CookieJar>,

    connect_timeout: Duration,

    /// Honor HTTP(S)_PROXY environment variables when no proxy is given
    use_system_proxy: bool,
}

impl ReqwestTransport {
    /// Create a transport that honors system proxy settings
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            jar: Arc::new(CookieJar::new()),
            connect_timeout,
            use_system_proxy: true,
        }
    }

    /// Create a transport that ignores system proxy settings
    pub fn direct(connect_timeout: Duration) -> Self {
        Self {
            use_system_proxy: false,
            ..Self::new(connect_timeout)
        }
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, TransportError> {
        let key = proxy.unwrap_or_default();
        if let Some(client) = self.clients.get(key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .cookie_provider(Arc::clone(&self.jar))
            .connect_timeout(self.connect_timeout);

        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| TransportError::InvalidRequest {
                url: proxy_url.to_string(),
                message: format!("invalid proxy: {}", e),
            })?;
            builder = builder.proxy(proxy);
        } else if !self.use_system_proxy {
            builder = builder.no_proxy();
        }

        let client = builder.build().map_err(|e| TransportError::InvalidRequest {
            url: key.to_string(),
            message: format!("failed to create HTTP client: {}", e),
        })?;

        tracing::debug!(proxy = key, "Created HTTP client");
        self.clients.insert(key.to_string(), client.clone());
        Ok(client)
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = self.client_for(request.proxy.as_deref())?;

        let mut builder = client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.cookies.is_empty() {
            let header = request
                .cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(COOKIE, header);
        }
        if let Some(ref form) = request.form {
            builder = builder.form(form);
        }

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            "Sending HTTP request"
        );

        let response = builder
            .send()
            .map_err(|e| TransportError::from_reqwest(&request.url, e))?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let host = response.url().host_str().unwrap_or_default().to_string();

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let cookies: Vec<Cookie> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| Cookie::parse_set_cookie(value, &host))
            .collect();

        let body = response
            .bytes()
            .map_err(|e| TransportError::from_reqwest(&url, e))?;

        tracing::debug!(status = status, url = %url, "Received HTTP response");

        Ok(HttpResponse {
            status,
            url,
            headers,
            cookies,
            body,
        })
    }

    fn cookie_jar(&self) -> &CookieJar {
        &self.jar
    }
}
