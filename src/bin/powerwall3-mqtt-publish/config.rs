use std::path::PathBuf;
use std::str::FromStr;
use std::{env, fs};

use anyhow::{bail, Context};
use log::LevelFilter;
use pw3mqtt::gateway_config::GatewayConfig;
use pw3mqtt::mqtt_config::MqttConfig;
use serde_derive::Deserialize;

const CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    pub log_level: Option<String>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub home_assistant: Option<MqttConfig>,
    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// `config.toml` in the working directory, or next to the executable.
fn find_config_file() -> Option<PathBuf> {
    let cwd = env::current_dir().ok().map(|dir| dir.join(CONFIG_FILE));
    let exe = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE)));
    [cwd, exe].into_iter().flatten().find(|path| path.exists())
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse_env<T: FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_var(name)
        .map(|value| {
            value
                .parse()
                .with_context(|| format!("${name} is not valid: '{value}'"))
        })
        .transpose()
}

impl Config {
    pub fn load() -> anyhow::Result<Config> {
        // parse config from TOML file if present, the environment may provide the rest
        let mut config = match find_config_file() {
            Some(path) => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("could not read {}", path.display()))?;
                let mut config: Config = toml::from_str(&contents)
                    .with_context(|| format!("{} is unparsable", path.display()))?;
                config.source = Some(path);
                config
            }
            None => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        // $LOG_LEVEL
        if let Some(level) = env_var("LOG_LEVEL") {
            self.log_level = Some(level);
        }
        // $TEDAPI_PASSWORD
        if let Some(password) = env_var("TEDAPI_PASSWORD") {
            self.gateway.password = password;
        }
        // $TEDAPI_HOST
        if let Some(host) = env_var("TEDAPI_HOST") {
            self.gateway.host = host;
        }
        // $TEDAPI_POLL_INTERVAL
        if let Some(interval) = parse_env("TEDAPI_POLL_INTERVAL")? {
            self.gateway.poll_interval = interval;
        }
        // $TEDAPI_REPORT_VITALS
        if let Some(report) = parse_env("TEDAPI_REPORT_VITALS")? {
            self.gateway.report_vitals = report;
        }

        // $MQTT_BROKER_HOST
        if let Some(host) = env_var("MQTT_BROKER_HOST") {
            self.mqtt_mut().host = host;
        }
        // $MQTT_PORT (optional)
        if let Some(port) = parse_env("MQTT_PORT")? {
            self.mqtt_mut().port = Some(port);
        }
        // $MQTT_USERNAME (optional)
        if let Some(username) = env_var("MQTT_USERNAME") {
            self.mqtt_mut().username = Some(username);
        }
        // $MQTT_PASSWORD (optional)
        if let Some(password) = env_var("MQTT_PASSWORD") {
            self.mqtt_mut().password = Some(password);
        }
        // $MQTT_CA, $MQTT_CERT and $MQTT_KEY (optional PEM files)
        if let Some(ca) = env_var("MQTT_CA") {
            self.mqtt_mut().ca = Some(ca.into());
        }
        if let Some(cert) = env_var("MQTT_CERT") {
            self.mqtt_mut().cert = Some(cert.into());
        }
        if let Some(key) = env_var("MQTT_KEY") {
            self.mqtt_mut().key = Some(key.into());
        }
        // $MQTT_VERIFY_TLS (optional)
        if let Some(verify) = parse_env("MQTT_VERIFY_TLS")? {
            self.mqtt_mut().verify_tls = Some(verify);
        }
        Ok(())
    }

    fn mqtt_mut(&mut self) -> &mut MqttConfig {
        self.home_assistant.get_or_insert_with(MqttConfig::default)
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
            .as_deref()
            .and_then(|level| LevelFilter::from_str(level).ok())
            .unwrap_or(LevelFilter::Info)
    }

    pub fn validate(&self) -> anyhow::Result<&MqttConfig> {
        self.gateway.validate()?;
        match &self.home_assistant {
            Some(mqtt) if !mqtt.host.is_empty() => {
                mqtt.validate()?;
                Ok(mqtt)
            }
            _ => bail!("an MQTT broker host is required ([home_assistant] host or $MQTT_BROKER_HOST)"),
        }
    }
}
