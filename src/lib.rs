// yf-session - Library root

pub mod args;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod http_client;
pub mod transport;

pub use args::{FetchArgs, Pairs, ProxyConfig};
pub use cache::MemoizedFetcher;
pub use error::{FetchError, TransportError};
pub use http_client::DataClient;
