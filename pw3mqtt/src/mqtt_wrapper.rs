#[derive(Clone, Copy, Debug)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Availability payloads on the will topic.
pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

/// Broker connection used by the collectors. The binary wraps its rumqttc
/// client in this; tests record into a vector instead.
pub trait MqttWrapper {
    fn subscribe(&mut self, topic: &str, qos: QoS) -> anyhow::Result<()>;

    fn publish<S, V>(&mut self, topic: S, qos: QoS, retain: bool, payload: V) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>;
}
