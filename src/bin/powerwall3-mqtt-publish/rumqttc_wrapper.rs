use std::{path::Path, sync::Arc, thread, time::Duration};

use anyhow::{anyhow, Context};
use log::{debug, info, warn};
use pw3mqtt::{
    mqtt_config::MqttConfig,
    mqtt_wrapper::{self, OFFLINE, ONLINE},
    poller::PollHandle,
};
use rumqttc::{
    tokio_rustls::rustls::{
        self,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        crypto::{ring, verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms},
        ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
    },
    Client, Event, LastWill, MqttOptions, Packet, Transport,
};
use rustls_pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer, ServerName, UnixTime};

pub struct RumqttcWrapper {
    client: Client,
}

fn match_qos(qos: mqtt_wrapper::QoS) -> rumqttc::QoS {
    match qos {
        mqtt_wrapper::QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        mqtt_wrapper::QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        mqtt_wrapper::QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// Accepts any broker certificate but still checks handshake signatures.
#[derive(Debug)]
struct NoVerification(WebPkiSupportedAlgorithms);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.supported_schemes()
    }
}

fn load_certs(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .map_err(|e| anyhow!("could not read certificates from {}: {e:?}", path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("{} holds no certificates", path.display());
    }
    Ok(certs)
}

fn tls_transport(config: &MqttConfig) -> anyhow::Result<Transport> {
    // Use rustls-native-certs to load root certificates from the operating system.
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!("could not load platform certificate: {e}");
    }
    for cert in native.certs {
        roots.add(cert)?;
    }
    if let Some(ca) = &config.ca {
        for cert in load_certs(ca)? {
            roots
                .add(cert)
                .with_context(|| format!("invalid CA certificate in {}", ca.display()))?;
        }
    }

    let builder = if config.verify_tls() {
        ClientConfig::builder().with_root_certificates(roots)
    } else {
        warn!("MQTT broker certificate is not verified");
        let algorithms = ring::default_provider().signature_verification_algorithms;
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification(algorithms)))
    };

    let client_config = match (&config.cert, &config.key) {
        (Some(cert), Some(key)) => {
            let key = PrivateKeyDer::from_pem_file(key)
                .map_err(|e| anyhow!("could not read private key from {}: {e:?}", key.display()))?;
            builder
                .with_client_auth_cert(load_certs(cert)?, key)
                .context("client certificate does not match its key")?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(Transport::tls_with_config(client_config.into()))
}

impl RumqttcWrapper {
    /// Connects to the broker and, if `availability` is given, forwards Home
    /// Assistant's `online`/`offline` announcements to it.
    pub fn new(config: &MqttConfig, availability: Option<PollHandle>) -> anyhow::Result<Self> {
        let use_tls = config.use_tls();
        let port = config.port.unwrap_or(if use_tls { 8883 } else { 1883 });

        let mut mqttoptions = MqttOptions::new(config.client_id(), &config.host, port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        let will_topic = config.will_topic();
        mqttoptions.set_last_will(LastWill::new(
            &will_topic,
            OFFLINE,
            rumqttc::QoS::AtLeastOnce,
            true,
        ));
        debug!("MQTT will set on '{will_topic}' to '{OFFLINE}'");
        if use_tls {
            mqttoptions.set_transport(tls_transport(config)?);
        }

        //parse the mqtt authentication options
        if let Some((username, password)) = match (&config.username, &config.password) {
            (None, _) => None,
            (Some(username), None) => Some((username.clone(), "".into())),
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
        } {
            mqttoptions.set_credentials(username, password);
        }

        let (client, mut connection) = Client::new(mqttoptions, 512);

        let status_topic = config.status_topic();
        let broker = format!("{}:{}", config.host, port);
        let events = client.clone();
        thread::spawn(move || {
            // keep polling the event loop to make sure outgoing messages get sent;
            // the iterator reconnects after errors, so back off a little between them
            for notification in connection.iter() {
                match notification {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker '{broker}'");
                        if let Err(e) = events.try_subscribe(&status_topic, rumqttc::QoS::AtLeastOnce) {
                            warn!("subscription to '{status_topic}' failed: {e}");
                        } else {
                            info!("Subscribed to MQTT topic '{status_topic}'");
                        }
                        if let Err(e) =
                            events.try_publish(&will_topic, rumqttc::QoS::AtLeastOnce, true, ONLINE)
                        {
                            warn!("could not announce availability: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == status_topic => {
                        let online = publish.payload.as_ref() == ONLINE.as_bytes();
                        info!(
                            "Received Home Assistant status {}",
                            if online { ONLINE } else { OFFLINE }
                        );
                        if let Some(handle) = &availability {
                            if !handle.availability_changed(online) {
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT connection error: {e}");
                        thread::sleep(Duration::from_secs(1));
                    }
                }
            }
        });
        Ok(Self { client })
    }
}

impl mqtt_wrapper::MqttWrapper for RumqttcWrapper {
    fn subscribe(&mut self, topic: &str, qos: mqtt_wrapper::QoS) -> anyhow::Result<()> {
        Ok(self.client.subscribe(topic, match_qos(qos))?)
    }

    fn publish<S, V>(
        &mut self,
        topic: S,
        qos: mqtt_wrapper::QoS,
        retain: bool,
        payload: V,
    ) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>,
    {
        // try publishing up to three times
        for _ in 0..2 {
            if self
                .client
                .try_publish(topic.clone(), match_qos(qos), retain, payload.clone())
                .is_ok()
            {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(100));
        }
        Ok(self
            .client
            .try_publish(topic, match_qos(qos), retain, payload)?)
    }
}
