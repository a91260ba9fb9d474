//! Paced, throttle-aware fetches of authoritative order records.

use std::time::Duration;

use serde_json::Value;

use super::token::TokenCache;
use super::transport::{HttpResponse, HttpTransport, ReqwestTransport};
use crate::constants::API_SUCCESS_CODE;
use crate::error::{OrderBridgeError, Result};
use crate::types::{Document, SyncConfig};

/// Result of looking up one record in the external system.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(Document),
    /// Missing, rejected by the API, or unreachable. The caller skips the record.
    NotFound,
}

/// Anything that can produce authoritative records by external id.
pub trait RecordSource {
    /// `Err` is reserved for [`OrderBridgeError::Auth`] (fatal) and
    /// [`OrderBridgeError::RateLimited`] (retry budget spent).
    fn fetch(&mut self, record_id: &str) -> Result<FetchOutcome>;
}

/// Blocking delay used for request pacing and throttling cooldowns.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Client for `GET {api_base}/salesorders/{id}?organization_id=…`.
///
/// Every request, the first included, is preceded by a fixed blocking pause. An HTTP 429
/// triggers a cooldown and another attempt, up to `max_attempts` requests in total.
#[derive(Debug)]
pub struct ExternalRecordClient<T: HttpTransport, Z: Sleeper = ThreadSleeper> {
    transport: T,
    sleeper: Z,
    tokens: TokenCache,
    api_base: String,
    organization_id: String,
    rate_limit_delay: Duration,
    rate_limit_cooldown: Duration,
    max_attempts: u32,
}

impl ExternalRecordClient<ReqwestTransport, ThreadSleeper> {
    /// Client over a `reqwest` blocking transport using the configured timeout.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.http_timeout())?;
        Self::new(config, transport)
    }
}

impl<T: HttpTransport> ExternalRecordClient<T, ThreadSleeper> {
    pub fn new(config: &SyncConfig, transport: T) -> Result<Self> {
        Self::with_sleeper(config, transport, ThreadSleeper)
    }
}

impl<T: HttpTransport, Z: Sleeper> ExternalRecordClient<T, Z> {
    pub fn with_sleeper(config: &SyncConfig, transport: T, sleeper: Z) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            sleeper,
            tokens: TokenCache::new(config),
            api_base: config.api_base().trim_end_matches('/').to_string(),
            organization_id: config.organization_id.clone(),
            rate_limit_delay: config.rate_limit_delay(),
            rate_limit_cooldown: config.rate_limit_cooldown(),
            max_attempts: config.max_attempts,
        })
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[must_use]
    pub fn sleeper(&self) -> &Z {
        &self.sleeper
    }

    pub fn fetch(&mut self, record_id: &str) -> Result<FetchOutcome> {
        let url = format!("{}/salesorders/{record_id}", self.api_base);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.sleeper.sleep(self.rate_limit_delay);
            let token = self.tokens.get_token(&self.transport)?;
            let authorization = format!("Zoho-oauthtoken {}", token.as_str());

            let response = match self.transport.get(
                &url,
                &[("organization_id", self.organization_id.as_str())],
                &[("Authorization", authorization.as_str())],
            ) {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(record.id = record_id, error = %err, "record fetch failed");
                    return Ok(FetchOutcome::NotFound);
                }
            };

            match response.status {
                200 => return Ok(decode_record(record_id, &response)),
                429 if attempt >= self.max_attempts => {
                    tracing::warn!(
                        record.id = record_id,
                        fetch.attempts = attempt,
                        "rate limit persists; giving up on record"
                    );
                    return Err(OrderBridgeError::RateLimited {
                        record_id: record_id.to_string(),
                        attempts: attempt,
                    });
                }
                429 => {
                    tracing::warn!(
                        record.id = record_id,
                        fetch.attempt = attempt,
                        cooldown_ms = self.rate_limit_cooldown.as_millis() as u64,
                        "rate limit hit; cooling down"
                    );
                    self.sleeper.sleep(self.rate_limit_cooldown);
                }
                status => {
                    if status == 401 {
                        // Let the next fetch exchange a new token.
                        self.tokens.invalidate();
                    }
                    tracing::warn!(
                        record.id = record_id,
                        http.status = status,
                        "record fetch returned error status"
                    );
                    return Ok(FetchOutcome::NotFound);
                }
            }
        }
    }
}

impl<T: HttpTransport, Z: Sleeper> RecordSource for ExternalRecordClient<T, Z> {
    fn fetch(&mut self, record_id: &str) -> Result<FetchOutcome> {
        ExternalRecordClient::fetch(self, record_id)
    }
}

fn decode_record(record_id: &str, response: &HttpResponse) -> FetchOutcome {
    let body: Value = match response.json() {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(record.id = record_id, error = %err, "record body is not JSON");
            return FetchOutcome::NotFound;
        }
    };

    let code = body.get("code").and_then(Value::as_i64);
    if code != Some(API_SUCCESS_CODE) {
        let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
        tracing::warn!(
            record.id = record_id,
            api.code = ?code,
            api.message = message,
            "order API reported an error"
        );
        return FetchOutcome::NotFound;
    }

    match body.get("salesorder") {
        Some(Value::Object(record)) => FetchOutcome::Found(record.clone()),
        _ => {
            tracing::warn!(record.id = record_id, "success response without a salesorder body");
            FetchOutcome::NotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::TransportError;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct RecordingSleeper {
        slept: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    #[derive(Default)]
    struct Scripted {
        gets: RefCell<VecDeque<std::result::Result<HttpResponse, TransportError>>>,
        requests: RefCell<Vec<(String, Vec<(String, String)>, Vec<(String, String)>)>>,
        token_posts: RefCell<usize>,
    }

    impl Scripted {
        fn then(self, status: u16, body: &str) -> Self {
            self.gets
                .borrow_mut()
                .push_back(Ok(HttpResponse::new(status, body)));
            self
        }
    }

    fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    impl HttpTransport for Scripted {
        fn post_form(
            &self,
            _url: &str,
            _form: &[(&str, &str)],
        ) -> std::result::Result<HttpResponse, TransportError> {
            *self.token_posts.borrow_mut() += 1;
            Ok(HttpResponse::new(200, r#"{"access_token":"tok","expires_in":3600}"#))
        }

        fn get(
            &self,
            url: &str,
            query: &[(&str, &str)],
            headers: &[(&str, &str)],
        ) -> std::result::Result<HttpResponse, TransportError> {
            self.requests
                .borrow_mut()
                .push((url.to_string(), owned(query), owned(headers)));
            self.gets
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError("connection refused".into())))
        }
    }

    fn config() -> SyncConfig {
        SyncConfig::new("id", "secret", "refresh", "20083870449")
            .with_base_urls("https://accounts.test", "https://api.test/inventory/v1")
    }

    const OK_BODY: &str = r#"{"code":0,"message":"success","salesorder":{
        "salesorder_id":"9001","customer_name":"Acme Ltd"}}"#;

    #[test]
    fn success_unwraps_record_and_sends_org_and_token() {
        let transport = Scripted::default().then(200, OK_BODY);
        let mut client =
            ExternalRecordClient::with_sleeper(&config(), transport, RecordingSleeper::default())
                .expect("client");

        let record = match client.fetch("9001").expect("fetch") {
            FetchOutcome::Found(record) => record,
            other => panic!("expected record, got {other:?}"),
        };
        assert_eq!(record["customer_name"], "Acme Ltd");

        let requests = client.transport().requests.borrow();
        let (url, query, headers) = &requests[0];
        assert_eq!(url, "https://api.test/inventory/v1/salesorders/9001");
        assert_eq!(query, &owned(&[("organization_id", "20083870449")]));
        assert_eq!(headers, &owned(&[("Authorization", "Zoho-oauthtoken tok")]));
        assert_eq!(
            *client.sleeper().slept.borrow(),
            vec![Duration::from_millis(1_200)]
        );
    }

    #[test]
    fn embedded_failure_code_is_not_found() {
        let transport = Scripted::default()
            .then(200, r#"{"code":1002,"message":"Sales order does not exist."}"#);
        let mut client =
            ExternalRecordClient::with_sleeper(&config(), transport, RecordingSleeper::default())
                .expect("client");
        assert_eq!(client.fetch("404").expect("fetch"), FetchOutcome::NotFound);
    }

    #[test]
    fn throttle_then_success_costs_one_cooldown() {
        let transport = Scripted::default().then(429, "").then(200, OK_BODY);
        let mut client =
            ExternalRecordClient::with_sleeper(&config(), transport, RecordingSleeper::default())
                .expect("client");

        assert!(matches!(client.fetch("9001").expect("fetch"), FetchOutcome::Found(_)));
        let slept = client.sleeper().slept.borrow().clone();
        let cooldowns = slept
            .iter()
            .filter(|d| **d == Duration::from_secs(60))
            .count();
        assert_eq!(cooldowns, 1);
        assert_eq!(client.transport().requests.borrow().len(), 2);
        assert_eq!(*client.transport().token_posts.borrow(), 1);
    }

    #[test]
    fn persistent_throttling_is_bounded() {
        let transport = Scripted::default()
            .then(429, "")
            .then(429, "")
            .then(429, "")
            .then(200, OK_BODY);
        let mut client =
            ExternalRecordClient::with_sleeper(&config(), transport, RecordingSleeper::default())
                .expect("client");

        let err = client.fetch("9001").expect_err("retry budget spent");
        assert!(err.is_transient());
        assert!(matches!(err, OrderBridgeError::RateLimited { attempts: 3, .. }));
        assert_eq!(client.transport().requests.borrow().len(), 3);
    }

    #[test]
    fn other_statuses_and_network_errors_are_not_found() {
        let transport = Scripted::default().then(500, "boom");
        let mut client =
            ExternalRecordClient::with_sleeper(&config(), transport, RecordingSleeper::default())
                .expect("client");
        assert_eq!(client.fetch("1").expect("5xx"), FetchOutcome::NotFound);
        // Script exhausted: the transport now reports a connection error.
        assert_eq!(client.fetch("2").expect("network"), FetchOutcome::NotFound);
    }

    #[test]
    fn unauthorized_drops_cached_token() {
        let transport = Scripted::default().then(401, "").then(200, OK_BODY);
        let mut client =
            ExternalRecordClient::with_sleeper(&config(), transport, RecordingSleeper::default())
                .expect("client");

        assert_eq!(client.fetch("1").expect("401"), FetchOutcome::NotFound);
        assert!(!client.tokens().is_fresh());
        assert!(matches!(client.fetch("1").expect("retry"), FetchOutcome::Found(_)));
        assert_eq!(*client.transport().token_posts.borrow(), 2);
    }
}
