//! Configuration for the external order API and the migration passes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_HTTP_TIMEOUT, DEFAULT_MAX_ATTEMPTS, DEFAULT_RATE_LIMIT_COOLDOWN,
    DEFAULT_RATE_LIMIT_DELAY, DEFAULT_TOKEN_TTL, MAX_BATCH_OPS,
};
use crate::error::{OrderBridgeError, Result};

/// Data-centre region of the order API. Only affects base URLs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiRegion {
    #[default]
    Eu,
    Com,
}

impl ApiRegion {
    /// Unknown selectors fall back to the `.com` data centre.
    #[must_use]
    pub fn parse(selector: &str) -> Self {
        if selector.trim().eq_ignore_ascii_case("eu") {
            Self::Eu
        } else {
            Self::Com
        }
    }

    #[must_use]
    pub fn accounts_base(self) -> &'static str {
        match self {
            Self::Eu => "https://accounts.zoho.eu",
            Self::Com => "https://accounts.zoho.com",
        }
    }

    #[must_use]
    pub fn api_base(self) -> &'static str {
        match self {
            Self::Eu => "https://www.zohoapis.eu/inventory/v1",
            Self::Com => "https://www.zohoapis.com/inventory/v1",
        }
    }
}

fn default_rate_limit_delay_ms() -> u64 {
    DEFAULT_RATE_LIMIT_DELAY.as_millis() as u64
}

fn default_rate_limit_cooldown_ms() -> u64 {
    DEFAULT_RATE_LIMIT_COOLDOWN.as_millis() as u64
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_token_ttl_secs() -> u64 {
    DEFAULT_TOKEN_TTL.as_secs()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT.as_secs()
}

fn default_batch_size() -> usize {
    MAX_BATCH_OPS
}

/// Credentials and tunables for a sync run.
///
/// Deserializes from partial input; anything missing takes its default. Base URL
/// overrides exist for staging endpoints and local test servers.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(default)]
    pub region: ApiRegion,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub accounts_base: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    #[serde(default = "default_rate_limit_cooldown_ms")]
    pub rate_limit_cooldown_ms: u64,
    /// Total requests per record, counting the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Operations per commit for the chunked customer passes.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            region: ApiRegion::default(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            organization_id: String::new(),
            accounts_base: None,
            api_base: None,
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            rate_limit_cooldown_ms: default_rate_limit_cooldown_ms(),
            max_attempts: default_max_attempts(),
            token_ttl_secs: default_token_ttl_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            batch_size: default_batch_size(),
        }
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("region", &self.region)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("organization_id", &self.organization_id)
            .field("accounts_base", &self.accounts_base())
            .field("api_base", &self.api_base())
            .field("rate_limit_delay_ms", &self.rate_limit_delay_ms)
            .field("rate_limit_cooldown_ms", &self.rate_limit_cooldown_ms)
            .field("max_attempts", &self.max_attempts)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl SyncConfig {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            organization_id: organization_id.into(),
            ..Self::default()
        }
    }

    /// Reads `ZOHO_REGION`, `ZOHO_CLIENT_ID`, `ZOHO_CLIENT_SECRET`, `ZOHO_REFRESH_TOKEN`
    /// and `ZOHO_ORG_ID` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a caller-supplied variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| OrderBridgeError::InvalidConfig {
                    reason: format!("{key} is not set"),
                })
        };
        let mut config = Self::new(
            required("ZOHO_CLIENT_ID")?,
            required("ZOHO_CLIENT_SECRET")?,
            required("ZOHO_REFRESH_TOKEN")?,
            required("ZOHO_ORG_ID")?,
        );
        config.region = lookup("ZOHO_REGION")
            .map_or(ApiRegion::Eu, |value| ApiRegion::parse(&value));
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(OrderBridgeError::InvalidConfig {
                reason: "max_attempts must be at least 1".into(),
            });
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_OPS {
            return Err(OrderBridgeError::InvalidConfig {
                reason: format!("batch_size must be within 1..={MAX_BATCH_OPS}"),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn accounts_base(&self) -> &str {
        self.accounts_base
            .as_deref()
            .unwrap_or(self.region.accounts_base())
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or(self.region.api_base())
    }

    #[must_use]
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    #[must_use]
    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }

    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub fn with_region(mut self, region: ApiRegion) -> Self {
        self.region = region;
        self
    }

    #[must_use]
    pub fn with_base_urls(
        mut self,
        accounts_base: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        self.accounts_base = Some(accounts_base.into());
        self.api_base = Some(api_base.into());
        self
    }

    #[must_use]
    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay_ms = delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl_secs = ttl.as_secs();
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}
