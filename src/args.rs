// Fetch arguments
// Headers, query parameters, proxy and timeout as supplied by callers

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::transport::DEFAULT_TIMEOUT;

/// Key/value pairs given either as a mapping or as an ordered sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pairs {
    Map(HashMap<String, String>),
    Seq(Vec<(String, String)>),
}

/// Immutable, hashable form of [`Pairs`]
///
/// Mappings are sorted by key so insertion order does not matter;
/// sequences keep their order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CanonicalPairs {
    Map(Vec<(String, String)>),
    Seq(Vec<(String, String)>),
}

impl Pairs {
    pub fn contains_key(&self, key: &str) -> bool {
        match self {
            Pairs::Map(map) => map.contains_key(key),
            Pairs::Seq(seq) => seq.iter().any(|(k, _)| k == key),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_> {
        match self {
            Pairs::Map(map) => Box::new(map.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            Pairs::Seq(seq) => Box::new(seq.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        }
    }

    pub fn to_vec(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn canonical(&self) -> CanonicalPairs {
        match self {
            Pairs::Map(map) => {
                let sorted: BTreeMap<&String, &String> = map.iter().collect();
                CanonicalPairs::Map(
                    sorted
                        .into_iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                )
            }
            Pairs::Seq(seq) => CanonicalPairs::Seq(seq.clone()),
        }
    }
}

impl From<HashMap<String, String>> for Pairs {
    fn from(map: HashMap<String, String>) -> Self {
        Pairs::Map(map)
    }
}

impl From<BTreeMap<String, String>> for Pairs {
    fn from(map: BTreeMap<String, String>) -> Self {
        Pairs::Map(map.into_iter().collect())
    }
}

impl From<Vec<(String, String)>> for Pairs {
    fn from(seq: Vec<(String, String)>) -> Self {
        Pairs::Seq(seq)
    }
}

impl From<&[(&str, &str)]> for Pairs {
    fn from(seq: &[(&str, &str)]) -> Self {
        Pairs::Seq(
            seq.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Pairs {
    fn from(seq: [(&str, &str); N]) -> Self {
        Pairs::from(&seq[..])
    }
}

/// Proxy as a single URL or as a scheme → URL mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyConfig {
    Url(String),
    Schemes(HashMap<String, String>),
}

/// Hashable form of [`ProxyConfig`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CanonicalProxy {
    Url(String),
    Schemes(Vec<(String, String)>),
}

impl ProxyConfig {
    /// Proxy used for requests; data endpoints are all HTTPS
    pub fn https_url(&self) -> Option<&str> {
        match self {
            ProxyConfig::Url(url) => Some(url.as_str()),
            ProxyConfig::Schemes(schemes) => schemes.get("https").map(String::as_str),
        }
    }

    pub fn canonical(&self) -> CanonicalProxy {
        match self {
            ProxyConfig::Url(url) => CanonicalProxy::Url(url.clone()),
            ProxyConfig::Schemes(schemes) => {
                let mut pairs: Vec<(String, String)> = schemes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                pairs.sort();
                CanonicalProxy::Schemes(pairs)
            }
        }
    }
}

impl From<&str> for ProxyConfig {
    fn from(url: &str) -> Self {
        ProxyConfig::Url(url.to_string())
    }
}

impl From<String> for ProxyConfig {
    fn from(url: String) -> Self {
        ProxyConfig::Url(url)
    }
}

impl From<HashMap<String, String>> for ProxyConfig {
    fn from(schemes: HashMap<String, String>) -> Self {
        ProxyConfig::Schemes(schemes)
    }
}

/// Optional arguments of `fetch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchArgs {
    /// Replaces the default browser headers when set
    pub headers: Option<Pairs>,
    pub params: Option<Pairs>,
    pub proxy: Option<ProxyConfig>,
    pub timeout: Duration,
}

impl Default for FetchArgs {
    fn default() -> Self {
        Self {
            headers: None,
            params: None,
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl FetchArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(mut self, headers: impl Into<Pairs>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    pub fn params(mut self, params: impl Into<Pairs>) -> Self {
        self.params = Some(params.into());
        self
    }

    pub fn proxy(mut self, proxy: impl Into<ProxyConfig>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
