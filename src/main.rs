use anyhow::{Context, Result};
use std::sync::Arc;

use yf_session::auth::{AuthState, CredentialCache, Endpoints, SessionManager};
use yf_session::cache::MemoizedFetcher;
use yf_session::config::Config;
use yf_session::http_client::DataClient;
use yf_session::transport::{CachingTransport, ReqwestTransport, Transport};

fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;

    // Initialize logging with a configured level; stdout carries the JSON body
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(url = %config.url, symbol = %config.symbol, "yf-session starting");

    let reqwest_transport = ReqwestTransport::new(config.connect_timeout);
    let transport: Arc<dyn Transport> = if config.cache_responses {
        Arc::new(CachingTransport::new(reqwest_transport))
    } else {
        Arc::new(reqwest_transport)
    };

    let credential_cache = match config.credential_db_file {
        Some(ref path) => {
            tracing::debug!(path = %path.display(), "Using credential cache");
            CredentialCache::open(path)
        }
        None => CredentialCache::disabled(),
    };

    let session = SessionManager::with_state(
        Arc::clone(&transport),
        AuthState::process_shared(),
        Arc::new(credential_cache),
        Endpoints::default(),
    );
    let client = DataClient::with_session(config.symbol.clone(), transport, session);
    let fetcher = MemoizedFetcher::new(client);

    let body: serde_json::Value = fetcher
        .fetch_json(&config.url, &config.fetch_args())
        .with_context(|| format!("Failed to fetch {}", config.url))?;

    tracing::debug!(
        strategy = %fetcher.client().session().active_strategy(),
        "Fetch complete"
    );

    let rendered = serde_json::to_string_pretty(&body).context("Failed to render response")?;
    println!("{}", rendered);

    Ok(())
}
