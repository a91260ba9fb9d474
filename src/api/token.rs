//! OAuth access-token cache for the order API.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::transport::HttpTransport;
use crate::error::{OrderBridgeError, Result};
use crate::types::SyncConfig;

/// Bearer credential for the order API. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Holds at most one token and refreshes it on demand.
///
/// The cached token is reused while the current instant is strictly before its expiry.
/// Expiry is `refresh time + token_ttl`, deliberately shorter than the provider's own
/// lifetime. There is no retry here: a failed refresh surfaces as
/// [`OrderBridgeError::Auth`].
pub struct TokenCache {
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    ttl: Duration,
    cached: Option<(AccessToken, Instant)>,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("token_url", &self.token_url)
            .field("ttl", &self.ttl)
            .field("cached", &self.cached.is_some())
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            token_url: format!("{}/oauth/v2/token", config.accounts_base()),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            ttl: config.token_ttl(),
            cached: None,
        }
    }

    /// Cached token if still fresh, otherwise a newly exchanged one.
    pub fn get_token<T: HttpTransport + ?Sized>(&mut self, transport: &T) -> Result<AccessToken> {
        if let Some((token, expires_at)) = &self.cached {
            if Instant::now() < *expires_at {
                return Ok(token.clone());
            }
        }
        self.refresh(transport)
    }

    /// Drop the cached token so the next call refreshes.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.cached
            .as_ref()
            .is_some_and(|(_, expires_at)| Instant::now() < *expires_at)
    }

    fn refresh<T: HttpTransport + ?Sized>(&mut self, transport: &T) -> Result<AccessToken> {
        tracing::info!(token.url = %self.token_url, "refreshing access token");
        let form = [
            ("refresh_token", self.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = transport
            .post_form(&self.token_url, &form)
            .map_err(|err| OrderBridgeError::Auth {
                status: 0,
                body: err.to_string(),
            })?;

        if !response.is_success() {
            tracing::error!(http.status = response.status, "access token refresh rejected");
            return Err(OrderBridgeError::Auth {
                status: response.status,
                body: response.body,
            });
        }

        let (access_token, expires_in) = match response.json::<TokenResponse>() {
            Ok(TokenResponse {
                access_token: Some(token),
                expires_in,
            }) if !token.is_empty() => (token, expires_in),
            _ => {
                return Err(OrderBridgeError::Auth {
                    status: response.status,
                    body: response.body,
                });
            }
        };

        let token = AccessToken(access_token);
        self.cached = Some((token.clone(), Instant::now() + self.ttl));
        tracing::info!(
            token.ttl_secs = self.ttl.as_secs(),
            token.provider_expires_in = ?expires_in,
            "access token refreshed"
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::{HttpResponse, TransportError};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedAuth {
        responses: RefCell<VecDeque<std::result::Result<HttpResponse, TransportError>>>,
        calls: RefCell<Vec<Vec<(String, String)>>>,
    }

    impl ScriptedAuth {
        fn push(&self, response: std::result::Result<HttpResponse, TransportError>) {
            self.responses.borrow_mut().push_back(response);
        }
    }

    impl HttpTransport for ScriptedAuth {
        fn post_form(
            &self,
            _url: &str,
            form: &[(&str, &str)],
        ) -> std::result::Result<HttpResponse, TransportError> {
            self.calls.borrow_mut().push(
                form.iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            );
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError("script exhausted".into())))
        }

        fn get(
            &self,
            _url: &str,
            _query: &[(&str, &str)],
            _headers: &[(&str, &str)],
        ) -> std::result::Result<HttpResponse, TransportError> {
            Err(TransportError("unexpected GET".into()))
        }
    }

    fn config() -> SyncConfig {
        SyncConfig::new("client", "secret", "refresh", "org")
    }

    #[test]
    fn fresh_token_is_reused_without_network() {
        let transport = ScriptedAuth::default();
        transport.push(Ok(HttpResponse::new(
            200,
            r#"{"access_token":"tok-1","expires_in":3600}"#,
        )));
        let mut cache = TokenCache::new(&config());

        let first = cache.get_token(&transport).expect("first");
        let second = cache.get_token(&transport).expect("second");

        assert_eq!(first.as_str(), "tok-1");
        assert_eq!(first, second);
        let calls = transport.calls.borrow();
        assert_eq!(calls.len(), 1);
        let form = &calls[0];
        assert!(form.contains(&("grant_type".into(), "refresh_token".into())));
        assert!(form.contains(&("refresh_token".into(), "refresh".into())));
    }

    #[test]
    fn expired_token_is_refreshed() {
        let transport = ScriptedAuth::default();
        transport.push(Ok(HttpResponse::new(200, r#"{"access_token":"tok-1"}"#)));
        transport.push(Ok(HttpResponse::new(200, r#"{"access_token":"tok-2"}"#)));
        let mut cache = TokenCache::new(&config().with_token_ttl(Duration::ZERO));

        assert_eq!(cache.get_token(&transport).expect("first").as_str(), "tok-1");
        assert!(!cache.is_fresh());
        assert_eq!(cache.get_token(&transport).expect("second").as_str(), "tok-2");
    }

    #[test]
    fn rejected_refresh_carries_status_and_body() {
        let transport = ScriptedAuth::default();
        transport.push(Ok(HttpResponse::new(400, r#"{"error":"invalid_code"}"#)));
        let mut cache = TokenCache::new(&config());

        match cache.get_token(&transport) {
            Err(OrderBridgeError::Auth { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_code"));
            }
            other => panic!("expected auth error, got {other:?}"),
        }
        assert!(!cache.is_fresh());
    }

    #[test]
    fn success_without_token_is_an_auth_error() {
        let transport = ScriptedAuth::default();
        transport.push(Ok(HttpResponse::new(200, r#"{"error":"invalid_client"}"#)));
        let mut cache = TokenCache::new(&config());

        let err = cache.get_token(&transport).expect_err("no token in body");
        assert!(err.is_fatal());
    }

    #[test]
    fn debug_never_prints_token() {
        let token = AccessToken("secret-value".into());
        assert!(!format!("{token:?}").contains("secret-value"));
    }
}
