// Everything a strategy needs for one acquisition attempt

use std::time::Duration;

use super::credentials::CredentialCache;
use super::state::SharedAuthState;
use super::types::Endpoints;
use crate::error::TransportError;
use crate::transport::{execute_uncached, HttpRequest, HttpResponse, Transport};

pub(crate) struct NegotiationContext<'a> {
    pub transport: &'a dyn Transport,
    pub cache: &'a CredentialCache,
    pub state: &'a SharedAuthState,
    pub endpoints: &'a Endpoints,
    pub user_agent: &'a str,
    pub proxy: Option<&'a str>,
    pub timeout: Duration,
}

impl NegotiationContext<'_> {
    /// GET request carrying the browser User-Agent, proxy and timeout
    pub fn get(&self, url: impl Into<String>) -> HttpRequest {
        HttpRequest::get(url)
            .header("User-Agent", self.user_agent)
            .proxy(self.proxy)
            .timeout(self.timeout)
    }

    pub fn post(&self, url: impl Into<String>) -> HttpRequest {
        HttpRequest::post(url)
            .header("User-Agent", self.user_agent)
            .proxy(self.proxy)
            .timeout(self.timeout)
    }

    /// Negotiation requests never go through a response cache
    pub fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        execute_uncached(self.transport, request)
    }
}

/// Crumb bodies that are empty or contain an HTML page signal failure
pub(crate) fn usable_crumb(body: &str) -> Option<String> {
    let crumb = body.trim();
    if crumb.is_empty() || crumb.to_ascii_lowercase().contains("<html") {
        return None;
    }
    Some(crumb.to_string())
}
