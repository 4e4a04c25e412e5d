use crate::home_assistant_config::{DeviceConfig, SensorConfig};
use crate::metric_collector::MetricCollector;
use crate::mqtt_config::MqttConfig;
use crate::mqtt_wrapper::{MqttWrapper, QoS, ONLINE};
use crate::snapshot::{Snapshot, Vitals};
use crate::vitals::{is_battery_unit, PV_STRINGS};

use log::{debug, error, info};
use serde_json::{json, Map, Value};

const MODEL: &str = "Powerwall3";

pub struct HomeAssistant<MQTT: MqttWrapper> {
    client: MQTT,
    base_topic: String,
    availability_topic: String,
}

impl<MQTT: MqttWrapper> HomeAssistant<MQTT> {
    pub fn new(client: MQTT, config: &MqttConfig) -> Self {
        Self {
            client,
            base_topic: config.base_topic().to_string(),
            availability_topic: config.will_topic(),
        }
    }

    pub fn client(&self) -> &MQTT {
        &self.client
    }

    fn state_topic(&self, device_id: &str) -> String {
        format!("{}/device/{}/state", self.base_topic, device_id)
    }

    fn publish_json(&mut self, topic: &str, payload: &Value, retain: bool) {
        debug!("Publishing to {topic} with payload {payload}");

        if let Err(e) = self
            .client
            .publish(topic, QoS::AtMostOnce, retain, payload.to_string())
        {
            error!("Failed to publish message: {e:?}");
        }
    }

    fn publish_configs(&mut self, device: &DeviceConfig, sensor_configs: &[SensorConfig]) {
        // configs let home assistant know what sensors are available and where to find them
        for sensor_config in sensor_configs {
            let config_topic = format!(
                "{}/{}/{}/{}/config",
                self.base_topic,
                sensor_config.component.as_str(),
                device.id(),
                sensor_config.unique_id
            );
            match serde_json::to_value(sensor_config) {
                Ok(payload) => self.publish_json(&config_topic, &payload, true),
                Err(e) => error!("Failed to serialize sensor config: {e}"),
            }
        }
        info!("Discovery sent for device '{}'", device.id());
    }

    /// Battery units listed in the site configuration. Their vitals are
    /// only attached when the snapshot carries any.
    fn units<'a>(snapshot: &'a Snapshot) -> Vec<BatteryUnit<'a>> {
        let vitals = snapshot.vitals.as_deref();
        let site = Site::new(snapshot);
        snapshot.config["battery_blocks"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|block| {
                let block_type = block["type"].as_str()?;
                let vin = block["vin"].as_str()?;
                is_battery_unit(block_type).then(|| BatteryUnit {
                    vin,
                    block_type,
                    site_name: site.site_name(),
                    vitals,
                })
            })
            .collect()
    }
}

impl<MQTT: MqttWrapper> MetricCollector for HomeAssistant<MQTT> {
    fn discover(&mut self, snapshot: &Snapshot) {
        let site = Site::new(snapshot);
        let system = site.device_config();
        let state_topic = self.state_topic(system.id());
        let sensors = site.create_sensor_configs(&state_topic, &self.availability_topic);
        self.publish_configs(&system, &sensors);

        for unit in Self::units(snapshot) {
            let device = unit.device_config(&system);
            let state_topic = self.state_topic(device.id());
            let sensors = unit.create_sensor_configs(&state_topic, &device, &self.availability_topic);
            self.publish_configs(&device, &sensors);
        }
    }

    fn publish(&mut self, snapshot: &Snapshot) {
        // states contain the actual data
        let site = Site::new(snapshot);
        let topic = self.state_topic(&site.device_id());
        self.publish_json(&topic, &site.to_json_payload(), false);

        for unit in Self::units(snapshot) {
            if unit.vitals.is_none() {
                continue;
            }
            let topic = self.state_topic(&unit.device_id());
            self.publish_json(&topic, &unit.to_json_payload(), false);
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn number(value: &Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// Site-wide view of a snapshot: configuration and status of the gateway.
struct Site<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> Site<'a> {
    fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot }
    }

    fn site_info(&self) -> &'a Value {
        &self.snapshot.config["site_info"]
    }

    fn site_name(&self) -> &'a str {
        self.site_info()["site_name"].as_str().unwrap_or("Tesla Energy")
    }

    fn device_id(&self) -> String {
        let vin = self.snapshot.config["vin"].as_str().unwrap_or(&self.snapshot.firmware.din);
        format!("TeslaEnergySystem_{vin}")
    }

    fn device_config(&self) -> DeviceConfig {
        let firmware = &self.snapshot.firmware;
        DeviceConfig::new(self.site_name().to_string(), MODEL.to_string(), self.device_id())
            .with_model_id(firmware.gateway.part_number.clone())
            .with_serial_number(firmware.gateway.serial_number.clone())
            .with_sw_version(firmware.version.text.clone())
    }

    /// Realtime power of one meter aggregate location, e.g. `SITE`.
    fn power(&self, location: &str) -> f64 {
        self.snapshot.status["control"]["meterAggregates"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|meter| {
                meter["location"]
                    .as_str()
                    .is_some_and(|l| l.eq_ignore_ascii_case(location))
            })
            .map(|meter| round2(number(&meter["realPowerW"])))
            .unwrap_or(0.0)
    }

    fn grid_connected(&self) -> bool {
        self.snapshot.status["esCan"]["bus"]["ISLANDER"]["ISLAND_GridConnection"]
            ["ISLAND_GridConnected"]
            == "ISLAND_GridConnected_Connected"
    }

    fn calibrating(&self) -> bool {
        self.snapshot.status["control"]["alerts"]["active"]
            .as_array()
            .is_some_and(|alerts| alerts.iter().any(|a| a == "BatteryCalibration"))
    }

    fn to_json_payload(&self) -> Value {
        // when modifying this function, modify the sensor configs in create_sensor_configs accordingly
        let system = &self.snapshot.status["control"]["systemStatus"];
        let full = number(&system["nominalFullPackEnergyWh"]);
        // the gateway keeps 5% of the pack out of reach of the user
        let hidden = (full / 20.0).trunc();
        let capacity = full - hidden;
        let remaining = number(&system["nominalEnergyRemainingWh"]) - hidden;
        let load = self.power("LOAD");

        let battery = (capacity > 0.0).then(|| (remaining * 100.0 / capacity).trunc());
        let time_remaining = (load != 0.0).then(|| (remaining * 3600.0 / load).round());

        let info = self.site_info();
        json!({
            "mqtt_availability": ONLINE,
            "battery": battery,
            "battery_capacity": capacity,
            "battery_remaining": remaining,
            "battery_reserve_hidden": hidden,
            "battery_reserve_user": (number(&info["backup_reserve_percent"]) * 100.0 / 105.0).trunc(),
            "battery_power": self.power("BATTERY"),
            "battery_time_remaining": time_remaining,
            "calibration": on_off(self.calibrating()),
            "commission_date": info["battery_commission_date"],
            "grid_power": self.power("SITE"),
            "grid_status": on_off(self.grid_connected()),
            "inverter_capacity": number(&info["nominal_system_power_ac"]) * 1000.0,
            "load_power": load,
            "solar_power": self.power("SOLAR"),
            "firmware_version": self.snapshot.firmware.version.text,
        })
    }

    fn create_sensor_configs(&self, state_topic: &str, availability: &str) -> Vec<SensorConfig> {
        let device = self.device_config();
        let d = &device;
        let t = state_topic;

        let sensors = vec![
            SensorConfig::battery(t, d, "Battery", "battery"),
            SensorConfig::energy_storage(t, d, "Battery Capacity", "battery_capacity"),
            SensorConfig::power(t, d, "Battery Power", "battery_power"),
            SensorConfig::energy_storage(t, d, "Battery Remaining", "battery_remaining"),
            SensorConfig::energy_storage(t, d, "Battery Hidden Reserve", "battery_reserve_hidden"),
            SensorConfig::battery(t, d, "Battery Reserve", "battery_reserve_user"),
            SensorConfig::duration(t, d, "Battery Time Remaining", "battery_time_remaining"),
            SensorConfig::running(t, d, "Calibration", "calibration"),
            SensorConfig::timestamp(t, d, "Commission Date", "commission_date"),
            SensorConfig::power(t, d, "Grid Power", "grid_power"),
            SensorConfig::connectivity(t, d, "Grid Status", "grid_status"),
            SensorConfig::power(t, d, "Inverter Capacity", "inverter_capacity"),
            SensorConfig::power(t, d, "Load Power", "load_power"),
            SensorConfig::power(t, d, "Solar Power", "solar_power"),
            SensorConfig::string(t, d, "Firmware Version", "firmware_version"),
            // split bidirectional flows into import/export style sensors
            SensorConfig::power(t, d, "Battery Power Charge", "battery_power")
                .with_template("[ value_json.battery_power | int, 0 ] | max")
                .disabled(),
            SensorConfig::power(t, d, "Battery Power Discharge", "battery_power")
                .with_template("[ value_json.battery_power | int, 0 ] | min | abs")
                .disabled(),
            SensorConfig::power(t, d, "Grid Power Import", "grid_power")
                .with_template("[ value_json.grid_power | int, 0 ] | max")
                .disabled(),
            SensorConfig::power(t, d, "Grid Power Export", "grid_power")
                .with_template("[ value_json.grid_power | int, 0 ] | min | abs")
                .disabled(),
        ];

        sensors
            .into_iter()
            .map(|sensor| sensor.with_availability(availability))
            .collect()
    }
}

/// One battery unit as seen through the aggregated vitals.
struct BatteryUnit<'a> {
    vin: &'a str,
    block_type: &'a str,
    site_name: &'a str,
    vitals: Option<&'a Vitals>,
}

impl BatteryUnit<'_> {
    fn serial_number(&self) -> &str {
        self.vin.split_once("--").map_or(self.vin, |(_, serial)| serial)
    }

    fn part_number(&self) -> &str {
        self.vin.split_once("--").map_or(self.vin, |(part, _)| part)
    }

    fn device_id(&self) -> String {
        format!("{}_{}", self.block_type, self.vin)
    }

    fn device_config(&self, parent: &DeviceConfig) -> DeviceConfig {
        DeviceConfig::new(
            format!("{} {}", self.site_name, self.serial_number()),
            MODEL.to_string(),
            self.device_id(),
        )
        .with_model_id(self.part_number().to_string())
        .with_serial_number(self.serial_number().to_string())
        .via(parent)
    }

    fn entry(&self, prefix: &str) -> &Value {
        self.vitals
            .and_then(|vitals| vitals.get(&format!("{prefix}--{}", self.vin)))
            .unwrap_or(&Value::Null)
    }

    fn to_json_payload(&self) -> Value {
        let pod = self.entry("TEPOD");
        let pvac = self.entry("PVAC");

        let mut strings = Map::new();
        for label in PV_STRINGS {
            strings.insert(
                label.to_string(),
                json!({
                    "mode": pvac[format!("PVAC_PvState_{label}")],
                    "current": round2(number(&pvac[format!("PVAC_PVCurrent_{label}")])),
                    "voltage": round2(number(&pvac[format!("PVAC_PVMeasuredVoltage_{label}")])),
                    "power": round2(number(&pvac[format!("PVAC_PVMeasuredPower_{label}")])),
                }),
            );
        }

        json!({
            "mqtt_availability": ONLINE,
            "battery_capacity": pod["POD_nom_full_pack_energy"],
            "battery_remaining": pod["POD_nom_energy_remaining"],
            "strings": strings,
        })
    }

    fn create_sensor_configs(
        &self,
        state_topic: &str,
        device: &DeviceConfig,
        availability: &str,
    ) -> Vec<SensorConfig> {
        let t = state_topic;
        let mut sensors = vec![
            SensorConfig::energy_storage(t, device, "Battery Capacity", "battery_capacity"),
            SensorConfig::energy_storage(t, device, "Battery Remaining", "battery_remaining"),
        ];

        // per-string sensors are noisy, leave them for the user to enable
        for label in PV_STRINGS {
            let key = format!("strings.{label}");
            sensors.extend([
                SensorConfig::string(
                    t,
                    device,
                    &format!("PV String {label} Mode"),
                    &format!("{key}.mode"),
                )
                .disabled(),
                SensorConfig::current(
                    t,
                    device,
                    &format!("PV String {label} Current"),
                    &format!("{key}.current"),
                )
                .disabled(),
                SensorConfig::voltage(
                    t,
                    device,
                    &format!("PV String {label} Voltage"),
                    &format!("{key}.voltage"),
                )
                .disabled(),
                SensorConfig::power(
                    t,
                    device,
                    &format!("PV String {label} Power"),
                    &format!("{key}.power"),
                )
                .disabled(),
            ]);
        }

        sensors
            .into_iter()
            .map(|sensor| sensor.with_availability(availability))
            .collect()
    }
}
