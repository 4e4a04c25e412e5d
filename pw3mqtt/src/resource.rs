use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::timeout_lock::TimeoutLock;

/// Every individually cached and locked unit of gateway telemetry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Din,
    Config,
    Status,
    Firmware,
    Components,
    DeviceComponents(String),
    DeviceVitals(String),
    Vitals,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Din => write!(f, "din"),
            Self::Config => write!(f, "config"),
            Self::Status => write!(f, "status"),
            Self::Firmware => write!(f, "firmware"),
            Self::Components => write!(f, "components"),
            Self::DeviceComponents(din) => write!(f, "components({din})"),
            Self::DeviceVitals(din) => write!(f, "vitals({din})"),
            Self::Vitals => write!(f, "vitals"),
        }
    }
}

/// One fetch lock per resource key, created on first use.
pub struct LockTable {
    timeout: Duration,
    locks: Mutex<HashMap<ResourceKey, Arc<TimeoutLock<()>>>>,
}

impl LockTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &ResourceKey) -> Arc<TimeoutLock<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(TimeoutLock::new((), self.timeout))),
        )
    }
}
