use std::time::Duration;

use thiserror::Error;

use crate::resource::ResourceKey;

/// How the poll loop should react to a failed refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// The gateway asked us to slow down: stretch the poll interval.
    Backoff,
    /// Skip this cycle and try again on the next tick.
    Transient,
    /// Stop polling.
    Fatal,
}

#[derive(Debug, Error)]
pub enum Error {
    // ── Rate limiting ───────────────────────────────────────────────
    /// A previous response put us into cooldown and it has not expired yet.
    #[error("Rate limit cooldown active -- pausing gateway calls")]
    RateLimited,

    /// The gateway just answered with a busy status code.
    #[error("Gateway signalled rate limiting (HTTP {status}) -- cooling down for {cooldown:?}")]
    RateLimiting { status: u16, cooldown: Duration },

    // ── Gateway responses ───────────────────────────────────────────
    #[error("Access denied: check the gateway password")]
    AccessDenied,

    /// Unexpected HTTP status code.
    #[error("Unexpected response from gateway: HTTP {0}")]
    Protocol(u16),

    /// A response body that could not be decoded.
    #[error("Undecodable {what} from gateway: {message}")]
    Decode { what: &'static str, message: String },

    #[error("Gateway DIN changed from '{previous}' to '{current}'")]
    DinMismatch { previous: String, current: String },

    #[error("Gateway does not speak the component protocol (older hardware generation)")]
    UnsupportedGateway,

    // ── Local ───────────────────────────────────────────────────────
    #[error("Could not acquire {resource} lock within {timeout:?}")]
    LockTimeout {
        resource: ResourceKey,
        timeout: Duration,
    },

    /// Connection refused, DNS failure, request timeout, ...
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn decode(what: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            what,
            message: err.to_string(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::RateLimiting { .. } => Severity::Backoff,
            Self::RateLimited | Self::LockTimeout { .. } | Self::Http(_) => Severity::Transient,
            Self::AccessDenied
            | Self::Protocol(_)
            | Self::Decode { .. }
            | Self::DinMismatch { .. }
            | Self::UnsupportedGateway
            | Self::Config(_) => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl From<protobuf::Error> for Error {
    fn from(err: protobuf::Error) -> Self {
        Self::decode("envelope", err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::decode("JSON payload", err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
