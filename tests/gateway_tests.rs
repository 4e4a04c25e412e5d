use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pw3mqtt::envelope;
use pw3mqtt::error::{Error, Result, Severity};
use pw3mqtt::gateway::{Gateway, TelemetrySource};
use pw3mqtt::gateway_config::GatewaySettings;
use pw3mqtt::protos::tedapi::Message;
use pw3mqtt::queries;
use pw3mqtt::transport::{HttpBackend, HttpResponse};
use serde_json::{json, Value};

const GATEWAY_DIN: &str = "1232100-00-E--TG000000000001";
const UNIT_VIN: &str = "1707000-11-J--TG1234567890AB";

/// Scripted stand-in for the gateway's HTTP surface.
struct FakeGateway {
    probe_status: u16,
    din: Mutex<String>,
    delay: Duration,
    scripted: Mutex<VecDeque<u16>>,
    requests: Mutex<Vec<String>>,
    posts: AtomicUsize,
    config: Value,
    status: Value,
    components: Value,
    devices: HashMap<String, Value>,
}

impl FakeGateway {
    fn new() -> Self {
        let mut devices = HashMap::new();
        devices.insert(UNIT_VIN.to_string(), unit_components());
        Self {
            probe_status: 404,
            din: Mutex::new(GATEWAY_DIN.to_string()),
            delay: Duration::ZERO,
            scripted: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            posts: AtomicUsize::new(0),
            config: json!({
                "vin": GATEWAY_DIN,
                "site_info": { "site_name": "Home" },
                "battery_blocks": [
                    { "vin": UNIT_VIN, "type": "Powerwall3" },
                    { "vin": "1092170-03-E--TG0000", "type": "Powerwall2" }
                ]
            }),
            status: json!({ "control": { "systemStatus": { "nominalFullPackEnergyWh": 40500 } } }),
            components: json!({ "components": {} }),
            devices,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn older_generation(mut self) -> Self {
        self.probe_status = 200;
        self
    }

    /// The next POST answers with `status` and no body.
    fn script(&self, status: u16) {
        self.scripted.lock().unwrap().push_back(status);
    }

    fn set_din(&self, din: &str) {
        *self.din.lock().unwrap() = din.to_string();
    }

    fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    fn count(&self, kind: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| *r == kind)
            .count()
    }

    fn respond(&self, path: &str, request: &Message) -> (String, Message) {
        let envelope = request.message.get_or_default();
        let mut response = Message::new();
        let body = response.message.mut_or_insert_default();

        if envelope.config.is_some() {
            body.config.mut_or_insert_default().mut_recv().file.mut_or_insert_default().text =
                self.config.to_string();
            return ("config".into(), response);
        }

        if envelope.firmware.is_some() {
            let system = body.firmware.mut_or_insert_default().mut_system();
            system.din = GATEWAY_DIN.to_string();
            let gateway = system.gateway.mut_or_insert_default();
            gateway.part_number = "1841000-01-E".to_string();
            gateway.serial_number = "GF2230000000".to_string();
            let version = system.version.mut_or_insert_default();
            version.text = "24.36.2".to_string();
            version.githash = vec![0xab, 0x01];
            let five = system.five.mut_or_insert_default();
            five.part_number = "1232100-00-E".to_string();
            five.serial_number = "TG000000000001".to_string();
            system.six = 2;
            return ("firmware".into(), response);
        }

        let query = envelope.payload.get_or_default().send();
        let (kind, text) = match path
            .strip_prefix("tedapi/device/")
            .and_then(|rest| rest.strip_suffix("/v1"))
        {
            Some(device) => (
                format!("device:{device}"),
                self.devices.get(device).cloned().unwrap_or(json!({})),
            ),
            None if query.payload.get_or_default().text == queries::STATUS.text => {
                ("status".to_string(), self.status.clone())
            }
            None => ("components".to_string(), self.components.clone()),
        };
        body.payload.mut_or_insert_default().mut_recv().text = text.to_string();
        (kind, response)
    }
}

impl HttpBackend for FakeGateway {
    fn probe(&self) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: self.probe_status,
            body: Vec::new(),
        })
    }

    fn get(&self, path: &str) -> Result<HttpResponse> {
        assert_eq!(path, envelope::DIN_PATH);
        self.requests.lock().unwrap().push("din".into());
        Ok(HttpResponse {
            status: 200,
            body: self.din.lock().unwrap().clone().into_bytes(),
        })
    }

    fn post(&self, path: &str, body: Vec<u8>) -> Result<HttpResponse> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        if let Some(status) = self.scripted.lock().unwrap().pop_front() {
            return Ok(HttpResponse {
                status,
                body: Vec::new(),
            });
        }
        let request = envelope::decode(&body)?;
        let (kind, response) = self.respond(path, &request);
        self.requests.lock().unwrap().push(kind);
        Ok(HttpResponse {
            status: 200,
            body: envelope::encode(&response)?,
        })
    }
}

fn unit_components() -> Value {
    json!({
        "components": {
            "pch": [{
                "signals": [
                    { "name": "PCH_PvState_A", "textValue": "Pv_Active" },
                    { "name": "PCH_PvVoltageA", "value": 300.0 },
                    { "name": "PCH_PvCurrentA", "value": 2.0 },
                    { "name": "PCH_AcFrequency", "value": 60.0 }
                ],
                "activeAlerts": []
            }],
            "bms": [{
                "signals": [
                    { "name": "BMS_nominalEnergyRemaining", "value": 6.5 },
                    { "name": "BMS_nominalFullPackEnergy", "value": 13.5 }
                ],
                "activeAlerts": [{ "name": "BMS_a066_SW_BmsContactorOpen" }]
            }]
        }
    })
}

fn settings() -> GatewaySettings {
    GatewaySettings {
        request_timeout: Duration::from_secs(1),
        lock_timeout: Duration::from_secs(2),
        cache_ttl: Duration::from_millis(200),
        config_ttl: Duration::from_millis(400),
        cooldown: Duration::from_secs(60),
    }
}

fn gateway(fake: FakeGateway) -> Gateway<FakeGateway> {
    Gateway::new(fake, settings())
}

#[test]
fn connect_probes_and_records_din() {
    let gateway = gateway(FakeGateway::new());
    assert_eq!(gateway.connect().unwrap(), GATEWAY_DIN);
    assert!(gateway.is_newer_generation());

    // a second connect reuses the session
    gateway.connect().unwrap();
    assert_eq!(gateway.transport().backend().count("din"), 1);
}

#[test]
fn cached_value_served_within_ttl() {
    let gateway = gateway(FakeGateway::new());
    let first = gateway.status(false).unwrap();
    let second = gateway.status(false).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(gateway.transport().backend().count("status"), 1);
}

#[test]
fn expired_value_fetched_again_exactly_once() {
    let gateway = gateway(FakeGateway::new());
    gateway.status(false).unwrap();
    thread::sleep(Duration::from_millis(250));

    gateway.status(false).unwrap();
    gateway.status(false).unwrap();
    assert_eq!(gateway.transport().backend().count("status"), 2);
}

#[test]
fn ttl_depends_on_resource() {
    let gateway = gateway(FakeGateway::new());
    gateway.config(false).unwrap();
    gateway.status(false).unwrap();
    thread::sleep(Duration::from_millis(250));

    // status expired, configuration has not
    gateway.config(false).unwrap();
    gateway.status(false).unwrap();
    let backend = gateway.transport().backend();
    assert_eq!(backend.count("config"), 1);
    assert_eq!(backend.count("status"), 2);
}

#[test]
fn forced_fetch_bypasses_cache() {
    let gateway = gateway(FakeGateway::new());
    gateway.config(false).unwrap();
    gateway.config(true).unwrap();
    assert_eq!(gateway.transport().backend().count("config"), 2);
}

#[test]
fn concurrent_callers_share_one_fetch() {
    let gateway = gateway(FakeGateway::new().with_delay(Duration::from_millis(100)));
    gateway.connect().unwrap();

    let values: Vec<Arc<Value>> = thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| gateway.status(false))).collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    });

    assert_eq!(gateway.transport().backend().posts(), 1);
    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
}

#[test]
fn different_resources_do_not_wait_on_each_other() {
    let gateway = gateway(FakeGateway::new().with_delay(Duration::from_millis(200)));
    gateway.connect().unwrap();

    let start = std::time::Instant::now();
    thread::scope(|s| {
        let status = s.spawn(|| gateway.status(false));
        let config = s.spawn(|| gateway.config(false));
        status.join().unwrap().unwrap();
        config.join().unwrap().unwrap();
    });
    assert!(start.elapsed() < Duration::from_millis(380));
}

#[test]
fn lock_timeout_when_fetch_is_slow() {
    let fake = FakeGateway::new().with_delay(Duration::from_millis(400));
    let mut settings = settings();
    settings.lock_timeout = Duration::from_millis(50);
    let gateway = Gateway::new(fake, settings);
    gateway.connect().unwrap();

    thread::scope(|s| {
        let slow = s.spawn(|| gateway.status(false));
        thread::sleep(Duration::from_millis(50));
        let err = gateway.status(false).unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }), "{err}");
        assert_eq!(err.severity(), Severity::Transient);
        slow.join().unwrap().unwrap();
    });
}

#[test]
fn rate_limit_enters_cooldown() {
    let gateway = gateway(FakeGateway::new());
    gateway.connect().unwrap();
    let backend = gateway.transport().backend();

    backend.script(429);
    let err = gateway.status(false).unwrap_err();
    assert!(matches!(err, Error::RateLimiting { status: 429, .. }), "{err}");
    assert_eq!(err.severity(), Severity::Backoff);
    assert!(gateway.transport().rate_limit().is_cooling_down());

    // rejected locally, no transport call
    let posts = backend.posts();
    let err = gateway.config(false).unwrap_err();
    assert!(matches!(err, Error::RateLimited), "{err}");
    assert_eq!(backend.posts(), posts);

    // forced calls still go out and a success clears the cooldown
    gateway.config(true).unwrap();
    assert_eq!(backend.posts(), posts + 1);
    assert!(!gateway.transport().rate_limit().is_cooling_down());
}

#[test]
fn service_unavailable_is_rate_limiting() {
    let gateway = gateway(FakeGateway::new());
    gateway.transport().backend().script(503);
    let err = gateway.config(false).unwrap_err();
    assert!(matches!(err, Error::RateLimiting { status: 503, .. }), "{err}");
}

#[test]
fn access_denied_is_fatal() {
    let gateway = gateway(FakeGateway::new());
    gateway.transport().backend().script(403);
    let err = gateway.config(false).unwrap_err();
    assert!(matches!(err, Error::AccessDenied), "{err}");
    assert!(err.is_fatal());
}

#[test]
fn unexpected_status_is_protocol_error() {
    let gateway = gateway(FakeGateway::new());
    gateway.transport().backend().script(500);
    let err = gateway.status(false).unwrap_err();
    assert!(matches!(err, Error::Protocol(500)), "{err}");
    assert!(err.is_fatal());
}

#[test]
fn changed_din_is_a_mismatch() {
    let gateway = gateway(FakeGateway::new());
    gateway.connect().unwrap();
    gateway.transport().backend().set_din("1232100-00-E--TG999");

    let err = gateway.din(true).unwrap_err();
    assert!(matches!(err, Error::DinMismatch { .. }), "{err}");
    assert!(err.is_fatal());
    // the recorded identity is kept
    assert_eq!(gateway.din(false).unwrap(), GATEWAY_DIN);

    // an explicit reconnect starts a new session
    assert_eq!(gateway.reconnect().unwrap(), "1232100-00-E--TG999");
}

#[test]
fn older_gateway_cannot_query_components() {
    let gateway = gateway(FakeGateway::new().older_generation());
    gateway.connect().unwrap();
    assert!(!gateway.is_newer_generation());

    let err = gateway.components(false).unwrap_err();
    assert!(matches!(err, Error::UnsupportedGateway), "{err}");
    let err = gateway.vitals_for_device(UNIT_VIN, false).unwrap_err();
    assert!(matches!(err, Error::UnsupportedGateway), "{err}");
}

#[test]
fn firmware_is_decoded() {
    let gateway = gateway(FakeGateway::new());
    let firmware = gateway.firmware(false).unwrap();
    assert_eq!(firmware.gateway.part_number, "1841000-01-E");
    assert_eq!(firmware.gateway.serial_number, "GF2230000000");
    assert_eq!(firmware.version.githash, "ab01");
    assert_eq!(firmware.five.serial_number, "TG000000000001");
    assert_eq!(firmware.six, 2);
    assert_eq!(gateway.firmware_version(false).unwrap(), "24.36.2");
    assert_eq!(gateway.transport().backend().count("firmware"), 1);
}

#[test]
fn battery_blocks_come_from_config() {
    let gateway = gateway(FakeGateway::new());
    let blocks = gateway.battery_blocks(false).unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0]["vin"], UNIT_VIN);
}

#[test]
fn device_queries_are_addressed_to_the_unit() {
    let gateway = gateway(FakeGateway::new());
    let data = gateway.components_for_device(UNIT_VIN, false).unwrap();
    assert!(data["components"]["bms"].is_array());
    assert_eq!(
        gateway
            .transport()
            .backend()
            .count(&format!("device:{UNIT_VIN}")),
        1
    );
}

#[test]
fn aggregated_vitals_cover_battery_units_only() {
    let gateway = gateway(FakeGateway::new());
    let vitals = gateway.aggregated_vitals(false).unwrap();

    assert_eq!(vitals.len(), 4);
    let pod = &vitals[&format!("TEPOD--{UNIT_VIN}")];
    assert_eq!(pod["POD_nom_energy_remaining"], 6500);
    assert_eq!(pod["POD_nom_full_pack_energy"], 13500);
    assert_eq!(pod["POD_nom_energy_to_be_charged"], 7000);
    assert_eq!(pod["alerts"], json!(["BMS_a066_SW_BmsContactorOpen"]));

    let pvac = &vitals[&format!("PVAC--{UNIT_VIN}")];
    assert_eq!(pvac["PVAC_PVMeasuredPower_A"], 600.0);
    assert_eq!(pvac["PVAC_Fout"], 60.0);
    assert_eq!(pvac["serialNumber"], "TG1234567890AB");
    assert_eq!(vitals[&format!("TEPINV--{UNIT_VIN}")]["PINV_Fout"], 60.0);

    let backend = gateway.transport().backend();
    assert_eq!(backend.count("components"), 1);
    assert_eq!(backend.count("device:1092170-03-E--TG0000"), 0);

    // served from cache
    gateway.aggregated_vitals(false).unwrap();
    assert_eq!(backend.count(&format!("device:{UNIT_VIN}")), 1);
}

#[test]
fn aggregated_vitals_failure_is_not_cached() {
    let gateway = gateway(FakeGateway::new());
    gateway.config(false).unwrap();
    gateway.components(false).unwrap();

    // the per-unit query is the next POST
    gateway.transport().backend().script(500);
    let err = gateway.aggregated_vitals(false).unwrap_err();
    assert!(matches!(err, Error::Protocol(500)), "{err}");

    let vitals = gateway.aggregated_vitals(false).unwrap();
    assert_eq!(vitals.len(), 4);
}

#[test]
fn snapshot_bundles_resources() {
    let gateway = gateway(FakeGateway::new());
    let snapshot = gateway.snapshot(false, false).unwrap();
    assert_eq!(snapshot.firmware.version.text, "24.36.2");
    assert_eq!(snapshot.config["vin"], GATEWAY_DIN);
    assert_eq!(
        snapshot.status["control"]["systemStatus"]["nominalFullPackEnergyWh"],
        40500
    );
    assert!(snapshot.vitals.is_none());

    let snapshot = gateway.snapshot(false, true).unwrap();
    assert!(snapshot.vitals.is_some());
}

#[test]
fn forced_snapshot_fetches_each_resource_once() {
    let gateway = gateway(FakeGateway::new());
    gateway.connect().unwrap();

    let snapshot = gateway.snapshot(true, true).unwrap();
    assert!(snapshot.vitals.is_some());

    let backend = gateway.transport().backend();
    for kind in ["config", "status", "firmware", "components"] {
        assert_eq!(backend.count(kind), 1, "{kind}");
    }
    assert_eq!(backend.count(&format!("device:{UNIT_VIN}")), 1);
    assert_eq!(backend.posts(), 5);
}
