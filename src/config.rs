use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::args::{FetchArgs, ProxyConfig};
use crate::auth::CredentialCache;

/// Fetch one Yahoo Finance URL with an automatically negotiated cookie and crumb
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Data endpoint URL
    pub url: String,

    /// Instrument symbol the request is made for
    #[arg(short, long, env = "YF_SYMBOL", default_value = "")]
    pub symbol: String,

    /// Query parameter as key=value (repeatable)
    #[arg(short = 'P', long = "param", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Proxy URL used for HTTPS requests
    #[arg(short = 'x', long, env = "YF_PROXY")]
    pub proxy: Option<String>,

    /// Per-request timeout in seconds
    #[arg(short, long, env = "YF_TIMEOUT", default_value = "30")]
    pub timeout: u64,

    /// Connect timeout in seconds
    #[arg(long, env = "YF_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// Directory holding the credential database
    #[arg(long, env = "YF_CACHE_DIR")]
    pub cache_dir: Option<String>,

    /// Do not read or write persisted credentials
    #[arg(long, env = "YF_NO_CREDENTIAL_CACHE")]
    pub no_credential_cache: bool,

    /// Cache successful GET responses in memory
    #[arg(long, env = "YF_CACHE_RESPONSES")]
    pub cache_responses: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// File name of the credential database inside the cache directory
pub const CREDENTIAL_DB_FILE: &str = "credentials.sqlite3";

#[derive(Clone, Debug)]
pub struct Config {
    pub url: String,
    pub symbol: String,
    pub params: Vec<(String, String)>,
    pub proxy: Option<String>,

    // Timeouts
    pub timeout: Duration,
    pub connect_timeout: Duration,

    // Credential persistence; `None` disables it
    pub credential_db_file: Option<PathBuf>,

    pub cache_responses: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args)
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let credential_db_file = if args.no_credential_cache {
            None
        } else {
            match args.cache_dir {
                Some(dir) => Some(expand_tilde(&dir).join(CREDENTIAL_DB_FILE)),
                None => CredentialCache::default_location(),
            }
        };

        let config = Config {
            url: args.url,
            symbol: args.symbol,
            params: args.params,
            proxy: args.proxy.filter(|p| !p.is_empty()),
            timeout: Duration::from_secs(args.timeout),
            connect_timeout: Duration::from_secs(args.connect_timeout),
            credential_db_file,
            cache_responses: args.cache_responses,
            log_level: args.log_level,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.url)
            .with_context(|| format!("Invalid URL: {}", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("URL must use http or https: {}", self.url);
        }
        if self.timeout.is_zero() {
            anyhow::bail!("--timeout must be greater than zero");
        }
        if let Some(ref proxy) = self.proxy {
            reqwest::Url::parse(proxy).with_context(|| format!("Invalid proxy URL: {}", proxy))?;
        }
        Ok(())
    }

    /// Fetch arguments for the configured request
    pub fn fetch_args(&self) -> FetchArgs {
        let mut args = FetchArgs::new().timeout(self.timeout);
        if !self.params.is_empty() {
            args = args.params(self.params.clone());
        }
        if let Some(ref proxy) = self.proxy {
            args = args.proxy(ProxyConfig::from(proxy.as_str()));
        }
        args
    }
}

/// Parse a `key=value` command-line pair
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value pair: no '=' found in '{}'", s))?;
    if key.is_empty() {
        return Err(format!("invalid key=value pair: empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
