use std::sync::{Arc, Once};
use std::time::Duration;

use super::basic::BasicStrategy;
use super::consent::ConsentStrategy;
use super::context::NegotiationContext;
use super::credentials::CredentialCache;
use super::state::{AuthState, SharedAuthState};
use super::types::{Credentials, Endpoints, StrategyId};
use crate::error::TransportError;
use crate::transport::Transport;

/// Desktop browser User-Agent sent with negotiation and default data requests
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/39.0.2171.95 Safari/537.36";

static CACHING_TRANSPORT_WARNING: Once = Once::new();

/// Session manager
/// Picks the active strategy, fails over to the other one, and owns the
/// shared cookie/crumb state
pub struct SessionManager {
    transport: Arc<dyn Transport>,

    /// Shared with every manager built on the same state
    state: SharedAuthState,

    /// Persistent per-strategy credentials
    cache: Arc<CredentialCache>,

    endpoints: Endpoints,
    user_agent: String,

    basic: BasicStrategy,
    consent: ConsentStrategy,
}

impl SessionManager {
    /// Manager using the process-wide auth state and credential cache
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_state(
            transport,
            AuthState::process_shared(),
            CredentialCache::process_shared(),
            Endpoints::default(),
        )
    }

    pub fn with_state(
        transport: Arc<dyn Transport>,
        state: SharedAuthState,
        cache: Arc<CredentialCache>,
        endpoints: Endpoints,
    ) -> Self {
        if transport.is_caching() && state.lock().cookie().is_none() {
            CACHING_TRANSPORT_WARNING.call_once(|| {
                tracing::warn!(
                    "Transport caches responses; cookie and crumb requests will bypass the cache while negotiating"
                );
            });
        }

        Self {
            transport,
            state,
            cache,
            endpoints,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            basic: BasicStrategy,
            consent: ConsentStrategy,
        }
    }

    /// Override the User-Agent used for negotiation
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn state(&self) -> &SharedAuthState {
        &self.state
    }

    pub fn credential_cache(&self) -> &CredentialCache {
        &self.cache
    }

    pub fn active_strategy(&self) -> StrategyId {
        self.state.lock().strategy()
    }

    /// Switch `basic ⇄ csrf`, clearing cookie and crumb
    ///
    /// Leaving the consent strategy also empties the transport cookie jar so
    /// its session does not leak into basic requests.
    pub fn toggle_strategy(&self) -> StrategyId {
        let mut state = self.state.lock();
        let previous = state.strategy();
        if previous == StrategyId::Csrf {
            self.transport.cookie_jar().clear();
        }
        let next = state.toggle();
        tracing::debug!(from = %previous, to = %next, "Toggled cookie strategy");
        next
    }

    fn context<'a>(&'a self, proxy: Option<&'a str>, timeout: Duration) -> NegotiationContext<'a> {
        NegotiationContext {
            transport: self.transport.as_ref(),
            cache: &self.cache,
            state: &self.state,
            endpoints: &self.endpoints,
            user_agent: &self.user_agent,
            proxy,
            timeout,
        }
    }

    /// Cookie and crumb from the active strategy, with one fallback
    ///
    /// If the active strategy fails the manager toggles once and tries the
    /// other. Whatever the fallback yields is returned, possibly without a
    /// crumb; only transport errors are raised.
    pub fn cookie_and_crumb(
        &self,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Credentials, TransportError> {
        let strategy = self.active_strategy();
        let ctx = self.context(proxy, timeout);
        tracing::debug!(strategy = %strategy, "Acquiring cookie and crumb");

        let credentials = match strategy {
            StrategyId::Csrf => {
                let crumb = self.consent.crumb(&ctx)?;
                if crumb.is_some() {
                    return Ok(Credentials { cookie: None, crumb });
                }

                tracing::warn!("Consent strategy failed, falling back to basic");
                self.toggle_strategy();
                self.basic.cookie_and_crumb(&ctx)?
            }
            StrategyId::Basic => {
                let credentials = self.basic.cookie_and_crumb(&ctx)?;
                if credentials.cookie.is_some() && credentials.crumb.is_some() {
                    return Ok(credentials);
                }

                tracing::warn!("Basic strategy failed, falling back to consent");
                self.toggle_strategy();
                Credentials {
                    cookie: None,
                    crumb: self.consent.crumb(&ctx)?,
                }
            }
        };

        if credentials.crumb.is_none() {
            tracing::warn!(
                strategy = %self.active_strategy(),
                "No crumb from either strategy, sending request without one"
            );
        }
        Ok(credentials)
    }
}
