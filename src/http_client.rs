use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use crate::args::FetchArgs;
use crate::auth::{Credentials, SessionManager, StrategyId};
use crate::error::{FetchError, Result};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// Query parameter the dispatcher injects itself
pub const CRUMB_PARAM: &str = "crumb";

/// Extra attempts after an authentication failure
const AUTH_RETRIES: u32 = 1;

/// URLs longer than this are truncated in logs
const MAX_LOGGED_URL_LEN: usize = 200;

/// HTTP client for Yahoo Finance data endpoints
///
/// Every request carries the crumb (and for the basic strategy the cookie)
/// negotiated by the session manager. A 4xx/5xx answer toggles the strategy
/// and the request is retried once.
pub struct DataClient {
    /// Instrument this client fetches data for
    symbol: String,

    transport: Arc<dyn Transport>,
    session: SessionManager,
}

impl DataClient {
    /// Create a client sharing the process-wide session
    ///
    /// Without a transport a reqwest transport with a 30 second connect
    /// timeout is created.
    pub fn new(symbol: impl Into<String>, transport: Option<Arc<dyn Transport>>) -> Self {
        let transport = transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new(Duration::from_secs(30))));
        let session = SessionManager::new(Arc::clone(&transport));
        Self::with_session(symbol, transport, session)
    }

    /// Create a client over an explicitly configured session
    pub fn with_session(
        symbol: impl Into<String>,
        transport: Arc<dyn Transport>,
        session: SessionManager,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            transport,
            session,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Build the outbound request; `args` is only read
    fn build_request(&self, url: &str, args: &FetchArgs, credentials: &Credentials) -> HttpRequest {
        let mut request = HttpRequest::get(url)
            .proxy(args.proxy.as_ref().and_then(|p| p.https_url()))
            .timeout(args.timeout);

        if let Some(ref params) = args.params {
            request.query = params.to_vec();
        }
        if let Some(ref crumb) = credentials.crumb {
            request = request.query(CRUMB_PARAM, crumb.as_str());
        }

        match args.headers {
            Some(ref headers) => request.headers = headers.to_vec(),
            None => request = request.header("User-Agent", self.session.user_agent()),
        }

        // Basic strategy passes the cookie explicitly; consent relies on the jar
        if self.session.active_strategy() == StrategyId::Basic {
            if let Some(ref cookie) = credentials.cookie {
                request = request.cookie(cookie);
            }
        }

        request
    }

    /// Fetch `url` with the crumb injected, retrying once on auth failure
    ///
    /// Non-success responses are returned, not raised; only invalid arguments
    /// and transport failures are errors.
    pub fn fetch(&self, url: &str, args: &FetchArgs) -> Result<HttpResponse> {
        tracing::debug!("fetch(): {}", loggable_url(url));

        if args
            .params
            .as_ref()
            .is_some_and(|params| params.contains_key(CRUMB_PARAM))
        {
            return Err(FetchError::InvalidArgument(
                "'crumb' is added automatically and must not be passed in params".to_string(),
            ));
        }

        let proxy = args.proxy.as_ref().and_then(|p| p.https_url());
        let mut attempt = 0;

        loop {
            let credentials = self.session.cookie_and_crumb(proxy, args.timeout)?;
            let request = self.build_request(url, args, &credentials);

            let response = self.transport.execute(&request).map_err(|e| {
                tracing::error!(
                    error_kind = e.kind(),
                    error = %e,
                    attempt = attempt + 1,
                    "HTTP request failed"
                );
                e
            })?;

            if response.status < 400 || attempt >= AUTH_RETRIES {
                tracing::debug!(status = response.status, attempt = attempt + 1, "Received response");
                return Ok(response);
            }

            tracing::warn!(
                status = response.status,
                strategy = %self.session.active_strategy(),
                "Request rejected, toggling cookie strategy and retrying"
            );
            self.session.toggle_strategy();
            attempt += 1;
        }
    }

    /// Fetch and decode a JSON body, failing on non-success status
    pub fn fetch_json<T: DeserializeOwned>(&self, url: &str, args: &FetchArgs) -> Result<T> {
        tracing::debug!("fetch_json(): {}", url);
        let response = self.fetch(url, args)?;
        decode_json(response)
    }
}

/// Status check plus JSON decoding shared with the memoized fetcher
pub(crate) fn decode_json<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
    if !response.is_success() {
        return Err(FetchError::Status {
            status: response.status,
            url: response.url,
        });
    }
    Ok(response.json()?)
}

/// URL shortened to [`MAX_LOGGED_URL_LEN`] bytes for log lines
fn loggable_url(url: &str) -> Cow<'_, str> {
    if url.len() <= MAX_LOGGED_URL_LEN {
        return Cow::Borrowed(url);
    }
    let mut end = MAX_LOGGED_URL_LEN;
    while !url.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}...", &url[..end]))
}
