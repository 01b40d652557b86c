// Consent ("csrf") strategy
// Accepts the consent form so the transport's cookie jar holds a session,
// then fetches the crumb using only that session

use once_cell::sync::Lazy;
use regex::Regex;

use super::context::{usable_crumb, NegotiationContext};
use super::types::{CookieSource, SessionCookie, StrategyId};
use crate::error::TransportError;
use crate::transport::Cookie;

static INPUT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<input\b[^>]*>").unwrap());

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#).unwrap()
});

/// Value of the `<input name="...">` element called `name`
fn input_value(html: &str, name: &str) -> Option<String> {
    INPUT_TAG.find_iter(html).find_map(|tag| {
        let mut input_name = None;
        let mut value = None;
        for caps in ATTRIBUTE.captures_iter(tag.as_str()) {
            let attr = caps.get(1)?.as_str();
            let val = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if attr.eq_ignore_ascii_case("name") {
                input_name = Some(val);
            } else if attr.eq_ignore_ascii_case("value") {
                value = Some(val);
            }
        }

        match (input_name, value) {
            (Some(n), Some(v)) if n == name => Some(decode_entities(v)),
            _ => None,
        }
    })
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Consent handshake; no cookie value is handed to the dispatcher
#[derive(Debug, Default)]
pub(crate) struct ConsentStrategy;

impl ConsentStrategy {
    /// Make sure the transport jar holds consent session cookies
    ///
    /// `Ok(None)` when the consent page lacks the expected form fields.
    pub fn cookie(&self, ctx: &NegotiationContext) -> Result<Option<CookieSource>, TransportError> {
        if matches!(ctx.state.lock().cookie(), Some(SessionCookie::InSession)) {
            tracing::debug!("Reusing consent session");
            return Ok(Some(CookieSource::Reused));
        }

        if self.load_persisted(ctx) {
            ctx.state.lock().set_cookie(SessionCookie::InSession);
            return Ok(Some(CookieSource::Persisted));
        }

        let request = ctx.get(&ctx.endpoints.consent_page);
        let response = ctx.send(&request)?;
        let html = response.text();

        let Some(csrf_token) = input_value(&html, "csrfToken") else {
            tracing::debug!(status = response.status, "Consent page has no csrfToken input");
            return Ok(None);
        };
        let Some(session_id) = input_value(&html, "sessionId") else {
            tracing::debug!(status = response.status, "Consent page has no sessionId input");
            return Ok(None);
        };
        tracing::debug!(csrf_token = %csrf_token, session_id = %session_id, "Parsed consent form");

        let form = vec![
            ("agree".to_string(), "agree".to_string()),
            ("agree".to_string(), "agree".to_string()),
            ("consentUUID".to_string(), "default".to_string()),
            ("sessionId".to_string(), session_id.clone()),
            ("csrfToken".to_string(), csrf_token),
            ("originalDoneUrl".to_string(), ctx.endpoints.consent_done_url.clone()),
            ("namespace".to_string(), "yahoo".to_string()),
        ];

        let submit = ctx
            .post(&ctx.endpoints.collect_consent)
            .query("sessionId", session_id.clone())
            .form(form.clone());
        ctx.send(&submit)?;

        let confirm = ctx
            .get(&ctx.endpoints.copy_consent)
            .query("sessionId", session_id)
            .form(form);
        ctx.send(&confirm)?;

        tracing::debug!(cookies = ctx.transport.cookie_jar().len(), "Consent accepted");
        ctx.state.lock().set_cookie(SessionCookie::InSession);
        Ok(Some(CookieSource::Negotiated))
    }

    fn load_persisted(&self, ctx: &NegotiationContext) -> bool {
        let Some(record) = ctx.cache.lookup(StrategyId::Csrf) else {
            return false;
        };

        match serde_json::from_str::<Vec<Cookie>>(&record.payload) {
            Ok(cookies) => {
                tracing::debug!(
                    cookies = cookies.len(),
                    age_minutes = record.age.num_minutes(),
                    "Reusing persisted consent session"
                );
                ctx.transport.cookie_jar().extend(cookies);
                true
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable consent session record: {}", e);
                false
            }
        }
    }

    /// Obtain the crumb over the consent session
    ///
    /// A session negotiated during this call is persisted once the crumb
    /// proves it works.
    pub fn crumb(&self, ctx: &NegotiationContext) -> Result<Option<String>, TransportError> {
        if let Some(crumb) = ctx.state.lock().crumb() {
            tracing::debug!("Reusing crumb");
            return Ok(Some(crumb.to_string()));
        }

        let Some(source) = self.cookie(ctx)? else {
            return Ok(None);
        };

        let request = ctx.get(&ctx.endpoints.consent_crumb);
        let response = ctx.send(&request)?;

        let Some(crumb) = usable_crumb(&response.text()) else {
            tracing::debug!(status = response.status, "Consent crumb endpoint returned no usable crumb");
            return Ok(None);
        };

        tracing::debug!(crumb = %crumb, "Fetched consent crumb");
        ctx.state.lock().set_crumb(crumb.clone());

        if source == CookieSource::Negotiated {
            self.persist(ctx);
        }
        Ok(Some(crumb))
    }

    fn persist(&self, ctx: &NegotiationContext) -> bool {
        let cookies = ctx.transport.cookie_jar().snapshot();
        match serde_json::to_string(&cookies) {
            Ok(payload) => ctx.cache.store(StrategyId::Csrf, &payload),
            Err(e) => {
                tracing::warn!("Failed to serialize consent session: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::CredentialCache;
    use crate::auth::state::{AuthState, SharedAuthState};
    use crate::auth::types::Endpoints;
    use crate::transport::stub::{with_cookie, StubTransport};
    use crate::transport::{HttpResponse, Transport};
    use std::time::Duration;

    const CONSENT_PAGE: &str = r#"<html><body>
        <form method="post" action="/v2/collectConsent?sessionId=3_cc-session">
          <input type="hidden" name="csrfToken" value="tok&amp;en">
          <input type='hidden' value='3_cc-session' name='sessionId'/>
          <input type="hidden" name="originalDoneUrl" value="https://finance.yahoo.com/">
          <button type="submit" name="agree" value="agree">Accept all</button>
        </form></body></html>"#;

    fn context<'a>(
        transport: &'a StubTransport,
        cache: &'a CredentialCache,
        state: &'a SharedAuthState,
        endpoints: &'a Endpoints,
    ) -> NegotiationContext<'a> {
        NegotiationContext {
            transport,
            cache,
            state,
            endpoints,
            user_agent: "test-agent",
            proxy: None,
            timeout: Duration::from_secs(5),
        }
    }

    fn consent_stub(page: &'static str) -> StubTransport {
        StubTransport::caching(move |req| {
            if req.url.ends_with("/consent") {
                HttpResponse::new(200, &req.url, page)
            } else if req.url.ends_with("/collectConsent") {
                with_cookie(HttpResponse::new(200, &req.url, ""), "GUCS", "s1", "stub")
            } else if req.url.ends_with("/copyConsent") {
                with_cookie(HttpResponse::new(200, &req.url, ""), "A1", "a1", "stub")
            } else if req.url.ends_with("/v2/test/getcrumb") {
                HttpResponse::new(200, &req.url, "xyz")
            } else {
                HttpResponse::new(404, &req.url, "")
            }
        })
    }

    #[test]
    fn test_input_value_parsing() {
        assert_eq!(input_value(CONSENT_PAGE, "csrfToken").as_deref(), Some("tok&en"));
        assert_eq!(input_value(CONSENT_PAGE, "sessionId").as_deref(), Some("3_cc-session"));
        assert_eq!(input_value(CONSENT_PAGE, "missing"), None);
        assert_eq!(input_value("<INPUT NAME=csrfToken VALUE=abc>", "csrfToken").as_deref(), Some("abc"));
    }

    #[test]
    fn test_handshake_then_crumb() {
        let transport = consent_stub(CONSENT_PAGE);
        let cache = CredentialCache::in_memory();
        let state = AuthState::isolated();
        let endpoints = Endpoints::rooted_at("http://stub");
        let ctx = context(&transport, &cache, &state, &endpoints);

        let crumb = ConsentStrategy.crumb(&ctx).unwrap();
        assert_eq!(crumb.as_deref(), Some("xyz"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 4);

        let submit = &requests[1];
        assert_eq!(submit.method, reqwest::Method::POST);
        assert_eq!(submit.query_value("sessionId"), Some("3_cc-session"));
        let form = submit.form.as_ref().unwrap();
        assert_eq!(form.iter().filter(|(k, _)| k == "agree").count(), 2);
        assert!(form.contains(&("csrfToken".to_string(), "tok&en".to_string())));
        assert!(form.contains(&("namespace".to_string(), "yahoo".to_string())));

        let confirm = &requests[2];
        assert_eq!(confirm.method, reqwest::Method::GET);
        assert_eq!(confirm.query_value("sessionId"), Some("3_cc-session"));

        // Crumb request relies on the session only
        assert!(requests[3].cookies.is_empty());

        // Session persisted verbatim
        let record = cache.lookup(StrategyId::Csrf).unwrap();
        let cookies: Vec<Cookie> = serde_json::from_str(&record.payload).unwrap();
        let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["GUCS", "A1"]);

        assert!(transport.recorded_cache_flags().iter().all(|enabled| !enabled));
        assert!(transport.cache_enabled());
    }

    #[test]
    fn test_missing_form_fields_fail() {
        let transport = consent_stub("<html><body>No form here</body></html>");
        let cache = CredentialCache::in_memory();
        let state = AuthState::isolated();
        let endpoints = Endpoints::rooted_at("http://stub");
        let ctx = context(&transport, &cache, &state, &endpoints);

        assert_eq!(ConsentStrategy.crumb(&ctx).unwrap(), None);
        assert_eq!(transport.request_count(), 1);
        assert!(state.lock().cookie().is_none());
        assert!(cache.lookup(StrategyId::Csrf).is_none());
    }

    #[test]
    fn test_persisted_session_skips_handshake() {
        let transport = consent_stub(CONSENT_PAGE);
        let cache = CredentialCache::in_memory();
        let saved = vec![Cookie::new("A1", "a1", "stub")];
        cache.store(StrategyId::Csrf, &serde_json::to_string(&saved).unwrap());

        let state = AuthState::isolated();
        let endpoints = Endpoints::rooted_at("http://stub");
        let ctx = context(&transport, &cache, &state, &endpoints);

        let crumb = ConsentStrategy.crumb(&ctx).unwrap();
        assert_eq!(crumb.as_deref(), Some("xyz"));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(transport.cookie_jar().snapshot(), saved);
    }

    #[test]
    fn test_html_crumb_is_failure() {
        let transport = StubTransport::new(|req| {
            if req.url.ends_with("/consent") {
                HttpResponse::new(200, &req.url, CONSENT_PAGE)
            } else {
                HttpResponse::new(200, &req.url, "<html>error</html>")
            }
        });
        let cache = CredentialCache::in_memory();
        let state = AuthState::isolated();
        let endpoints = Endpoints::rooted_at("http://stub");
        let ctx = context(&transport, &cache, &state, &endpoints);

        assert_eq!(ConsentStrategy.crumb(&ctx).unwrap(), None);
        assert!(cache.lookup(StrategyId::Csrf).is_none());
        assert!(state.lock().crumb().is_none());
    }
}
