mod config;
mod logging;
mod rumqttc_wrapper;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use config::Config;
use log::{error, info};
use pw3mqtt::gateway::Gateway;
use pw3mqtt::home_assistant::HomeAssistant;
use pw3mqtt::poller::{Poller, PollerSettings};
use pw3mqtt::transport::ReqwestBackend;
use rumqttc_wrapper::RumqttcWrapper;

fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            logging::init_logger(log::LevelFilter::Info);
            error!("{e:#}");
            std::process::exit(1);
        }
    };

    logging::init_logger(config.log_level());
    info!("Running revision: {}", env!("GIT_HASH"));
    if std::env::args().len() > 1 {
        error!("Arguments passed. Tool is configured by config.toml and the environment");
    }

    if let Err(e) = run(config) {
        error!("{e:#}");
        std::process::exit(1);
    }
    info!("Shut down");
}

fn run(config: Config) -> anyhow::Result<()> {
    match &config.source {
        Some(path) => info!("loaded configuration from {}", path.display()),
        None => info!("no config.toml found, using environment only"),
    }
    let mqtt = config.validate()?;
    let gateway_config = &config.gateway;

    info!("gateway host: {}", gateway_config.host);
    let settings = gateway_config.settings();
    let backend = ReqwestBackend::new(
        &gateway_config.host,
        &gateway_config.password,
        settings.request_timeout,
    )?;
    let gateway = Arc::new(Gateway::new(backend, settings));
    gateway.connect().context("initial handshake with gateway failed")?;
    if !gateway.is_newer_generation() {
        bail!("Powerwall appears to be older than Powerwall 3");
    }
    info!("Gateway firmware {}", gateway.firmware_version(false)?);

    let mut poller = Poller::new(
        Arc::clone(&gateway),
        PollerSettings {
            poll_interval: Duration::from_secs(gateway_config.poll_interval),
            backoff_step: Duration::from_secs(gateway_config.poll_backoff),
            report_vitals: gateway_config.report_vitals,
        },
    );
    info!(
        "using poll interval of {}s, vitals {}",
        gateway_config.poll_interval,
        if gateway_config.report_vitals { "enabled" } else { "disabled" }
    );

    let shutdown = poller.handle();
    ctrlc::set_handler(move || {
        shutdown.shutdown();
    })
    .context("could not install signal handler")?;

    info!("Publishing to Home Assistant via {}", mqtt.host);
    let client = RumqttcWrapper::new(mqtt, Some(poller.handle()))?;
    poller.add_collector(Box::new(HomeAssistant::new(client, mqtt)));

    poller.run()?;
    Ok(())
}
