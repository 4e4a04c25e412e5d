use serde::Serialize;

/// `DeviceConfig` groups entities under one device in Home Assistant's MQTT
/// discovery protocol.
#[derive(Serialize, Clone, Debug)]
pub struct DeviceConfig {
    name: String,
    model: String,
    identifiers: Vec<String>,
    manufacturer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sw_version: Option<String>, // firmware of the physical device
    #[serde(skip_serializing_if = "Option::is_none")]
    via_device: Option<String>,
}

impl DeviceConfig {
    pub fn new(name: String, model: String, identifier: String) -> Self {
        Self {
            name,
            model,
            identifiers: vec![identifier],
            manufacturer: "Tesla".to_string(),
            model_id: None,
            serial_number: None,
            sw_version: None,
            via_device: None,
        }
    }

    pub fn with_model_id(mut self, model_id: String) -> Self {
        self.model_id = Some(model_id);
        self
    }

    pub fn with_serial_number(mut self, serial_number: String) -> Self {
        self.serial_number = Some(serial_number);
        self
    }

    pub fn with_sw_version(mut self, sw_version: String) -> Self {
        self.sw_version = Some(sw_version);
        self
    }

    /// Marks this device as reached through `parent`.
    pub fn via(mut self, parent: &DeviceConfig) -> Self {
        self.via_device = parent.identifiers.first().cloned();
        self
    }

    pub fn id(&self) -> &str {
        self.identifiers.first().map(String::as_str).unwrap_or_default()
    }
}

/// Entity platforms used by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    Sensor,
    BinarySensor,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Sensor => "sensor",
            Component::BinarySensor => "binary_sensor",
        }
    }
}

/// One entry of an entity's availability list.
#[derive(Serialize, Clone, Debug)]
pub struct Availability {
    topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_template: Option<String>,
}

/// `SensorConfig` is the discovery payload of one Home Assistant entity.
///
/// More information about the MQTT discovery protocol can be found here:
/// https://www.home-assistant.io/integrations/mqtt/#mqtt-discovery
#[derive(Serialize, Debug)]
pub struct SensorConfig {
    #[serde(skip)]
    pub component: Component,
    pub unique_id: String,
    name: String,
    state_topic: String,
    value_template: String,
    device: DeviceConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    availability: Vec<Availability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled_by_default: Option<bool>,
}

fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

impl SensorConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new_sensor(
        component: Component,
        state_topic: &str,
        device_config: &DeviceConfig,
        name: &str,
        key: &str,
        device_class: Option<&str>,
        unit_of_measurement: Option<&str>,
        state_class: Option<&str>,
    ) -> Self {
        SensorConfig {
            component,
            unique_id: format!("{}_{}", device_config.id(), slug(name)),
            name: name.to_string(),
            state_topic: state_topic.to_string(),
            value_template: format!("{{{{ value_json.{key} }}}}"),
            device: device_config.clone(),
            availability: Vec::new(),
            unit_of_measurement: unit_of_measurement.map(str::to_string),
            device_class: device_class.map(str::to_string),
            state_class: state_class.map(str::to_string),
            enabled_by_default: None,
        }
    }

    /// Entity starts out disabled in Home Assistant.
    pub fn disabled(mut self) -> Self {
        self.enabled_by_default = Some(false);
        self
    }

    /// Replace the value template with a raw Jinja expression.
    pub fn with_template(mut self, expression: &str) -> Self {
        self.value_template = format!("{{{{ {expression} }}}}");
        self
    }

    /// Available while the state document says `online` and the bridge's
    /// will topic has not flipped to `offline`.
    pub fn with_availability(mut self, will_topic: &str) -> Self {
        self.availability = vec![
            Availability {
                topic: self.state_topic.clone(),
                value_template: Some("{{ value_json.mqtt_availability }}".to_string()),
            },
            Availability {
                topic: will_topic.to_string(),
                value_template: None,
            },
        ];
        self
    }

    pub fn value_template(&self) -> &str {
        &self.value_template
    }

    fn sensor(
        state_topic: &str,
        device_config: &DeviceConfig,
        name: &str,
        key: &str,
        device_class: &str,
        unit: Option<&str>,
        state_class: Option<&str>,
    ) -> Self {
        Self::new_sensor(
            Component::Sensor,
            state_topic,
            device_config,
            name,
            key,
            Some(device_class),
            unit,
            state_class,
        )
    }

    pub fn string(state_topic: &str, device_config: &DeviceConfig, name: &str, key: &str) -> Self {
        Self::new_sensor(
            Component::Sensor,
            state_topic,
            device_config,
            name,
            key,
            None,
            None,
            None,
        )
    }

    pub fn battery(state_topic: &str, device_config: &DeviceConfig, name: &str, key: &str) -> Self {
        Self::sensor(state_topic, device_config, name, key, "battery", Some("%"), None)
    }

    pub fn power(state_topic: &str, device_config: &DeviceConfig, name: &str, key: &str) -> Self {
        Self::sensor(
            state_topic,
            device_config,
            name,
            key,
            "power",
            Some("W"),
            Some("measurement"),
        )
    }

    pub fn energy_storage(
        state_topic: &str,
        device_config: &DeviceConfig,
        name: &str,
        key: &str,
    ) -> Self {
        Self::sensor(state_topic, device_config, name, key, "energy_storage", Some("Wh"), None)
    }

    pub fn voltage(state_topic: &str, device_config: &DeviceConfig, name: &str, key: &str) -> Self {
        Self::sensor(state_topic, device_config, name, key, "voltage", Some("V"), None)
    }

    pub fn current(state_topic: &str, device_config: &DeviceConfig, name: &str, key: &str) -> Self {
        Self::sensor(state_topic, device_config, name, key, "current", Some("A"), None)
    }

    pub fn duration(state_topic: &str, device_config: &DeviceConfig, name: &str, key: &str) -> Self {
        Self::sensor(state_topic, device_config, name, key, "duration", Some("s"), None)
    }

    pub fn timestamp(state_topic: &str, device_config: &DeviceConfig, name: &str, key: &str) -> Self {
        Self::sensor(state_topic, device_config, name, key, "timestamp", None, None)
    }

    pub fn connectivity(
        state_topic: &str,
        device_config: &DeviceConfig,
        name: &str,
        key: &str,
    ) -> Self {
        Self::new_sensor(
            Component::BinarySensor,
            state_topic,
            device_config,
            name,
            key,
            Some("connectivity"),
            None,
            None,
        )
    }

    pub fn running(state_topic: &str, device_config: &DeviceConfig, name: &str, key: &str) -> Self {
        Self::new_sensor(
            Component::BinarySensor,
            state_topic,
            device_config,
            name,
            key,
            Some("running"),
            None,
            None,
        )
    }
}
