// Authentication module
// Negotiates the cookie/crumb pair and keeps it shared across clients

mod basic;
mod consent;
mod context;
mod credentials;
mod manager;
mod state;
mod types;

pub use credentials::{CredentialCache, MAX_CREDENTIAL_AGE_HOURS};
pub use manager::{SessionManager, DEFAULT_USER_AGENT};
pub use state::{AuthState, SharedAuthState};
pub use types::{CachedCredential, Credentials, Endpoints, SessionCookie, StrategyId};
