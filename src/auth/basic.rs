// Basic strategy
// Bootstrap cookie from a fixed endpoint, crumb fetched with that cookie attached

use super::context::{usable_crumb, NegotiationContext};
use super::types::{CookieSource, Credentials, SessionCookie, StrategyId};
use crate::error::TransportError;
use crate::transport::Cookie;

/// Cookie, then crumb; the cookie travels as an explicit request cookie
#[derive(Debug, Default)]
pub(crate) struct BasicStrategy;

impl BasicStrategy {
    /// Obtain the bootstrap cookie
    ///
    /// Order: shared state, credential cache, network. `Ok(None)` means the
    /// bootstrap response carried no usable cookie.
    pub fn cookie(&self, ctx: &NegotiationContext) -> Result<Option<(Cookie, CookieSource)>, TransportError> {
        if let Some(SessionCookie::Explicit(cookie)) = ctx.state.lock().cookie() {
            tracing::debug!("Reusing basic cookie");
            return Ok(Some((cookie.clone(), CookieSource::Reused)));
        }

        if let Some(record) = ctx.cache.lookup(StrategyId::Basic) {
            match serde_json::from_str::<Cookie>(&record.payload) {
                Ok(cookie) if !cookie.value.is_empty() => {
                    tracing::debug!(age_minutes = record.age.num_minutes(), "Reusing persisted basic cookie");
                    ctx.state.lock().set_cookie(SessionCookie::Explicit(cookie.clone()));
                    return Ok(Some((cookie, CookieSource::Persisted)));
                }
                Ok(_) => tracing::debug!("Persisted basic cookie is empty"),
                Err(e) => tracing::warn!("Ignoring unreadable basic cookie record: {}", e),
            }
        }

        let request = ctx.get(&ctx.endpoints.bootstrap);
        let response = ctx.send(&request)?;

        let Some(cookie) = response.cookies.into_iter().next() else {
            tracing::debug!(status = response.status, "Bootstrap response set no cookie");
            return Ok(None);
        };
        if cookie.value.is_empty() {
            tracing::debug!(name = %cookie.name, "Bootstrap cookie is empty");
            return Ok(None);
        }

        tracing::debug!(name = %cookie.name, domain = %cookie.domain, "Fetched basic cookie");
        ctx.state.lock().set_cookie(SessionCookie::Explicit(cookie.clone()));

        match serde_json::to_string(&cookie) {
            Ok(payload) => {
                ctx.cache.store(StrategyId::Basic, &payload);
            }
            Err(e) => tracing::warn!("Failed to serialize basic cookie: {}", e),
        }

        Ok(Some((cookie, CookieSource::Negotiated)))
    }

    /// Obtain the crumb, fetching the cookie first if needed
    pub fn crumb(&self, ctx: &NegotiationContext) -> Result<Option<String>, TransportError> {
        if let Some(crumb) = ctx.state.lock().crumb() {
            tracing::debug!("Reusing crumb");
            return Ok(Some(crumb.to_string()));
        }

        let Some((cookie, _)) = self.cookie(ctx)? else {
            return Ok(None);
        };

        let request = ctx.get(&ctx.endpoints.basic_crumb).cookie(&cookie);
        let response = ctx.send(&request)?;

        match usable_crumb(&response.text()) {
            Some(crumb) => {
                tracing::debug!(crumb = %crumb, "Fetched basic crumb");
                ctx.state.lock().set_crumb(crumb.clone());
                Ok(Some(crumb))
            }
            None => {
                tracing::debug!(status = response.status, "Basic crumb endpoint returned no usable crumb");
                Ok(None)
            }
        }
    }

    /// Cookie and crumb together
    pub fn cookie_and_crumb(&self, ctx: &NegotiationContext) -> Result<Credentials, TransportError> {
        let cookie = self.cookie(ctx)?.map(|(cookie, _)| cookie);
        let crumb = if cookie.is_some() { self.crumb(ctx)? } else { None };
        Ok(Credentials { cookie, crumb })
    }
}
