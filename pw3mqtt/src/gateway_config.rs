use std::time::Duration;

use serde_derive::Deserialize;

use crate::error::{Error, Result};

/// Fixed address of the gateway on its own network segment.
pub const GATEWAY_HOST: &str = "192.168.91.1";

/// Poll intervals below this are rejected at startup.
pub const MIN_POLL_INTERVAL: u64 = 5;

fn default_host() -> String {
    GATEWAY_HOST.to_string()
}

fn default_request_timeout() -> u64 {
    5
}

fn default_cache_ttl() -> u64 {
    4
}

fn default_config_ttl() -> u64 {
    29
}

fn default_cooldown() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    30
}

fn default_poll_backoff() -> u64 {
    1
}

/// Gateway section of `config.toml`. All durations are in seconds.
#[derive(Clone, Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Bound on waiting for a resource lock, defaults to `request_timeout`.
    pub lock_timeout: Option<u64>,
    /// TTL for volatile resources (status, components, vitals).
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// TTL for slow-changing resources (configuration, firmware).
    #[serde(default = "default_config_ttl")]
    pub config_ttl: u64,
    #[serde(default = "default_cooldown")]
    pub cooldown: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Added to the poll interval every time the gateway rate limits us.
    #[serde(default = "default_poll_backoff")]
    pub poll_backoff: u64,
    /// Also fetch per-unit vitals, one extra round trip per battery unit.
    #[serde(default)]
    pub report_vitals: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            host: default_host(),
            request_timeout: default_request_timeout(),
            lock_timeout: None,
            cache_ttl: default_cache_ttl(),
            config_ttl: default_config_ttl(),
            cooldown: default_cooldown(),
            poll_interval: default_poll_interval(),
            poll_backoff: default_poll_backoff(),
            report_vitals: false,
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.password.is_empty() {
            return Err(Error::Config("gateway password is required".into()));
        }
        if self.host.is_empty() {
            return Err(Error::Config("gateway host must not be empty".into()));
        }
        if self.request_timeout == 0 {
            return Err(Error::Config("request timeout must be positive".into()));
        }
        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(Error::Config(format!(
                "poll interval must be >= {MIN_POLL_INTERVAL}s, got {}s",
                self.poll_interval
            )));
        }
        Ok(())
    }

    pub fn settings(&self) -> GatewaySettings {
        GatewaySettings {
            request_timeout: Duration::from_secs(self.request_timeout),
            lock_timeout: Duration::from_secs(self.lock_timeout.unwrap_or(self.request_timeout)),
            cache_ttl: Duration::from_secs(self.cache_ttl),
            config_ttl: Duration::from_secs(self.config_ttl),
            cooldown: Duration::from_secs(self.cooldown),
        }
    }
}

/// Resolved timing knobs of the gateway client.
#[derive(Clone, Copy, Debug)]
pub struct GatewaySettings {
    pub request_timeout: Duration,
    pub lock_timeout: Duration,
    pub cache_ttl: Duration,
    pub config_ttl: Duration,
    pub cooldown: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewayConfig::default().settings()
    }
}
