// Authentication types

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transport::Cookie;

/// Cookie/crumb acquisition strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyId {
    /// Bootstrap cookie from fc.yahoo.com, crumb from query1
    #[default]
    Basic,

    /// EU consent handshake, session cookies kept in the transport jar,
    /// crumb from query2
    Csrf,
}

impl StrategyId {
    /// Credential cache key
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::Basic => "basic",
            StrategyId::Csrf => "csrf",
        }
    }

    pub fn other(&self) -> StrategyId {
        match self {
            StrategyId::Basic => StrategyId::Csrf,
            StrategyId::Csrf => StrategyId::Basic,
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cookie state held for the active strategy
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCookie {
    /// Basic strategy: cookie attached to each data request explicitly
    Explicit(Cookie),

    /// Consent strategy: cookies live only in the transport's jar
    InSession,
}

/// Cookie and crumb as returned to the dispatcher; either may be missing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub cookie: Option<Cookie>,
    pub crumb: Option<String>,
}

/// Persisted credential that passed the freshness check
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCredential {
    pub payload: String,
    pub age: Duration,
}

/// Where a strategy's cookie came from during one acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CookieSource {
    /// Already present in the shared auth state
    Reused,
    /// Loaded from the credential cache
    Persisted,
    /// Obtained over the network just now
    Negotiated,
}

/// Endpoint sequence used for negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub bootstrap: String,
    pub basic_crumb: String,
    pub consent_page: String,
    pub collect_consent: String,
    pub copy_consent: String,
    pub consent_crumb: String,

    /// Page the consent form returns to once accepted
    pub consent_done_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            bootstrap: "https://fc.yahoo.com".to_string(),
            basic_crumb: "https://query1.finance.yahoo.com/v1/test/getcrumb".to_string(),
            consent_page: "https://guce.yahoo.com/consent".to_string(),
            collect_consent: "https://consent.yahoo.com/v2/collectConsent".to_string(),
            copy_consent: "https://guce.yahoo.com/copyConsent".to_string(),
            consent_crumb: "https://query2.finance.yahoo.com/v1/test/getcrumb".to_string(),
            consent_done_url: "https://finance.yahoo.com/".to_string(),
        }
    }
}

impl Endpoints {
    /// Same endpoint sequence served from a single origin, e.g. a mock server
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            bootstrap: format!("{}/bootstrap", base),
            basic_crumb: format!("{}/v1/test/getcrumb", base),
            consent_page: format!("{}/consent", base),
            collect_consent: format!("{}/v2/collectConsent", base),
            copy_consent: format!("{}/copyConsent", base),
            consent_crumb: format!("{}/v2/test/getcrumb", base),
            consent_done_url: format!("{}/", base),
        }
    }
}
