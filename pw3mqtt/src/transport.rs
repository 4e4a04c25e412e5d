use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;

use crate::error::{Error, Result};

/// Username the gateway expects for Basic auth.
pub const GATEWAY_USER: &str = "Tesla_Energy_Device";

/// Status codes the gateway uses to push back.
const BUSY_CODES: [u16; 2] = [429, 503];

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

// This trait decouples the gateway client from the HTTP implementation.
// Production code uses `ReqwestBackend`; tests script responses instead.
pub trait HttpBackend: Send + Sync {
    /// Plain, unauthenticated GET of the gateway root.
    fn probe(&self) -> Result<HttpResponse>;

    fn get(&self, path: &str) -> Result<HttpResponse>;

    fn post(&self, path: &str, body: Vec<u8>) -> Result<HttpResponse>;
}

pub struct ReqwestBackend {
    client: Client,
    base_url: String,
    password: String,
}

impl ReqwestBackend {
    pub fn new(host: &str, password: &str, timeout: Duration) -> Result<Self> {
        // the gateway presents a self-signed certificate
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            base_url: format!("https://{host}"),
            password: password.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn into_response(response: reqwest::blocking::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

impl HttpBackend for ReqwestBackend {
    fn probe(&self) -> Result<HttpResponse> {
        Self::into_response(self.client.get(&self.base_url).send()?)
    }

    fn get(&self, path: &str) -> Result<HttpResponse> {
        let response = self
            .client
            .get(self.url(path))
            .basic_auth(GATEWAY_USER, Some(&self.password))
            .send()?;
        Self::into_response(response)
    }

    fn post(&self, path: &str, body: Vec<u8>) -> Result<HttpResponse> {
        let response = self
            .client
            .post(self.url(path))
            .basic_auth(GATEWAY_USER, Some(&self.password))
            .header(CONTENT_TYPE, "application/octet-string")
            .body(body)
            .send()?;
        Self::into_response(response)
    }
}

/// Process-wide cooldown deadline, stored as milliseconds after `epoch`
/// so that readers only need an atomic load. Zero means "no cooldown".
pub struct RateLimitState {
    epoch: Instant,
    cooldown_until: AtomicU64,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            cooldown_until: AtomicU64::new(0),
        }
    }

    fn millis_since_epoch(&self, at: Instant) -> u64 {
        // +1 keeps a deadline at the very epoch distinguishable from "unset"
        at.saturating_duration_since(self.epoch).as_millis() as u64 + 1
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        match self.cooldown_until.load(Ordering::Acquire) {
            0 => None,
            ms => Some(self.epoch + Duration::from_millis(ms - 1)),
        }
    }

    pub fn is_cooling_down(&self) -> bool {
        match self.cooldown_until.load(Ordering::Acquire) {
            0 => false,
            deadline => self.millis_since_epoch(Instant::now()) < deadline,
        }
    }

    pub fn enter_cooldown(&self, duration: Duration) {
        let deadline = self.millis_since_epoch(Instant::now() + duration);
        self.cooldown_until.store(deadline, Ordering::Release);
    }

    pub fn clear(&self) {
        self.cooldown_until.store(0, Ordering::Release);
    }
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP round trips with cooldown enforcement and status classification.
pub struct Transport<B: HttpBackend> {
    backend: B,
    cooldown: Duration,
    rate_limit: RateLimitState,
}

impl<B: HttpBackend> Transport<B> {
    pub fn new(backend: B, cooldown: Duration) -> Self {
        Self {
            backend,
            cooldown,
            rate_limit: RateLimitState::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn rate_limit(&self) -> &RateLimitState {
        &self.rate_limit
    }

    /// Returns `true` if the gateway looks like the newer hardware
    /// generation, which answers its root URL with something other than 200.
    /// This is a heuristic, not a guarantee.
    pub fn probe(&self) -> Result<bool> {
        let response = self.backend.probe()?;
        debug!("Gateway probe answered HTTP {}", response.status);
        Ok(response.status != 200)
    }

    pub fn get(&self, path: &str, force: bool) -> Result<Vec<u8>> {
        self.check_cooldown(force)?;
        debug!("GET {path}");
        let response = self.backend.get(path)?;
        self.classify(response)
    }

    pub fn post(&self, path: &str, body: Vec<u8>, force: bool) -> Result<Vec<u8>> {
        self.check_cooldown(force)?;
        debug!("POST {path} ({} bytes)", body.len());
        let response = self.backend.post(path, body)?;
        let body = self.classify(response)?;
        self.rate_limit.clear();
        Ok(body)
    }

    fn check_cooldown(&self, force: bool) -> Result<()> {
        if !force && self.rate_limit.is_cooling_down() {
            return Err(Error::RateLimited);
        }
        Ok(())
    }

    fn classify(&self, response: HttpResponse) -> Result<Vec<u8>> {
        match response.status {
            200 => Ok(response.body),
            403 => Err(Error::AccessDenied),
            status if BUSY_CODES.contains(&status) => {
                warn!(
                    "Gateway answered HTTP {status}, pausing calls for {:?}",
                    self.cooldown
                );
                self.rate_limit.enter_cooldown(self.cooldown);
                Err(Error::RateLimiting {
                    status,
                    cooldown: self.cooldown,
                })
            }
            status => Err(Error::Protocol(status)),
        }
    }
}
