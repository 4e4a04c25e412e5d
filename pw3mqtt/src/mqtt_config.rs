use std::path::PathBuf;

use serde_derive::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_CLIENT_ID: &str = "powerwall3mqtt";
const DEFAULT_BASE_TOPIC: &str = "homeassistant";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub tls: Option<bool>,
    /// PEM bundle trusted in addition to the platform roots.
    pub ca: Option<PathBuf>,
    /// PEM client certificate chain, requires `key`.
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    /// Set to `false` to accept any broker certificate.
    pub verify_tls: Option<bool>,
    /// Discovery prefix of the Home Assistant instance.
    pub base_topic: Option<String>,
}

impl MqttConfig {
    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or(DEFAULT_CLIENT_ID)
    }

    /// A CA bundle or client certificate implies TLS.
    pub fn use_tls(&self) -> bool {
        self.tls.unwrap_or(false) || self.ca.is_some() || self.cert.is_some()
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls.unwrap_or(true)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("MQTT broker host is required".into()));
        }
        match (&self.cert, &self.key) {
            (Some(_), None) => Err(Error::Config("MQTT client cert given without key".into())),
            (None, Some(_)) => Err(Error::Config("MQTT client key given without cert".into())),
            _ => Ok(()),
        }
    }

    pub fn base_topic(&self) -> &str {
        self.base_topic.as_deref().unwrap_or(DEFAULT_BASE_TOPIC)
    }

    /// Carries `online` while we are connected and the broker's last will
    /// (`offline`) after we vanish.
    pub fn will_topic(&self) -> String {
        format!("{}/will", self.client_id())
    }

    /// Where Home Assistant announces its own availability.
    pub fn status_topic(&self) -> String {
        format!("{}/status", self.base_topic())
    }
}
