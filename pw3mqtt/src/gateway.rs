use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use log::{debug, error, info};
use parking_lot::RwLock;
use serde_json::Value;

use crate::cache::ResourceCache;
use crate::envelope;
use crate::error::{Error, Result};
use crate::gateway_config::GatewaySettings;
use crate::protos::tedapi::Message;
use crate::queries;
use crate::resource::{LockTable, ResourceKey};
use crate::snapshot::{FirmwareInfo, Snapshot, Vitals};
use crate::transport::{HttpBackend, Transport};
use crate::vitals;

/// Anything that can hand a publisher a fresh view of the site.
pub trait TelemetrySource {
    fn snapshot(&self, force: bool, include_vitals: bool) -> Result<Snapshot>;
}

impl<T: TelemetrySource + ?Sized> TelemetrySource for Arc<T> {
    fn snapshot(&self, force: bool, include_vitals: bool) -> Result<Snapshot> {
        (**self).snapshot(force, include_vitals)
    }
}

/// Cached, single-flight client for the gateway's telemetry resources.
///
/// Each resource follows the same template: serve from cache, otherwise
/// take the resource's own lock, re-check the cache, make sure a session
/// exists, fetch, decode and cache. Callers asking for different resources
/// never wait on each other.
pub struct Gateway<B: HttpBackend> {
    transport: Transport<B>,
    settings: GatewaySettings,
    din: RwLock<Option<String>>,
    newer_generation: AtomicBool,
    locks: LockTable,
    json: ResourceCache<ResourceKey, Arc<Value>>,
    firmware: ResourceCache<ResourceKey, Arc<FirmwareInfo>>,
    vitals: ResourceCache<ResourceKey, Arc<Vitals>>,
}

impl<B: HttpBackend> Gateway<B> {
    pub fn new(backend: B, settings: GatewaySettings) -> Self {
        Self {
            transport: Transport::new(backend, settings.cooldown),
            settings,
            din: RwLock::new(None),
            newer_generation: AtomicBool::new(false),
            locks: LockTable::new(settings.lock_timeout),
            json: ResourceCache::new(),
            firmware: ResourceCache::new(),
            vitals: ResourceCache::new(),
        }
    }

    pub fn transport(&self) -> &Transport<B> {
        &self.transport
    }

    pub fn is_newer_generation(&self) -> bool {
        self.newer_generation.load(Ordering::Acquire)
    }

    /// Handshake with the gateway unless a session already exists.
    pub fn connect(&self) -> Result<String> {
        if let Some(din) = self.din.read().clone() {
            return Ok(din);
        }
        self.reconnect()
    }

    /// Drop the current identity, probe the gateway and fetch its DIN again.
    pub fn reconnect(&self) -> Result<String> {
        debug!("Testing connection to gateway");
        *self.din.write() = None;
        let newer = self.transport.probe().inspect_err(|e| {
            error!("Unable to connect to gateway: {e}");
            error!("Please verify your host has a route to the gateway");
        })?;
        if newer {
            debug!("Detected newer generation gateway");
        }
        self.newer_generation.store(newer, Ordering::Release);
        self.din(true)
    }

    /// The gateway's device identity.
    ///
    /// A fetched DIN that differs from the one recorded for this session is
    /// reported as `DinMismatch` and never replaces it.
    pub fn din(&self, force: bool) -> Result<String> {
        let key = ResourceKey::Din;
        let lock = self.locks.get(&key);
        let _guard = lock.acquire().map_err(|e| Error::LockTimeout {
            resource: key,
            timeout: e.timeout,
        })?;

        if !force {
            if let Some(din) = self.din.read().clone() {
                debug!("Using cached din");
                return Ok(din);
            }
        }

        debug!("Fetching din from gateway");
        let body = self.transport.get(envelope::DIN_PATH, force)?;
        let current = String::from_utf8(body).map_err(|e| Error::decode("din", e))?;

        let mut din = self.din.write();
        if let Some(previous) = din.as_ref() {
            if *previous != current {
                return Err(Error::DinMismatch {
                    previous: previous.clone(),
                    current,
                });
            }
        }
        info!("Gateway DIN: {current}");
        *din = Some(current.clone());
        Ok(current)
    }

    fn cached<V: Clone>(
        &self,
        cache: &ResourceCache<ResourceKey, V>,
        key: ResourceKey,
        ttl: Duration,
        force: bool,
        fetch: impl FnOnce(&str) -> Result<V>,
    ) -> Result<V> {
        if !force {
            if let Some(value) = cache.get(&key) {
                debug!("Using cached {key}");
                return Ok(value);
            }
        }

        let lock = self.locks.get(&key);
        let _guard = lock.acquire().map_err(|e| Error::LockTimeout {
            resource: key.clone(),
            timeout: e.timeout,
        })?;

        // a previous holder may have just filled the slot
        if !force {
            if let Some(value) = cache.get(&key) {
                debug!("Using cached {key}");
                return Ok(value);
            }
        }

        let din = self.connect()?;
        debug!("Fetching {key} from gateway");
        let value = fetch(&din)?;
        cache.put(key, value.clone(), ttl);
        Ok(value)
    }

    fn post_envelope(&self, path: &str, request: &Message, force: bool) -> Result<Message> {
        let body = self.transport.post(path, envelope::encode(request)?, force)?;
        envelope::decode(&body)
    }

    fn require_newer_generation(&self) -> Result<()> {
        if self.is_newer_generation() {
            Ok(())
        } else {
            Err(Error::UnsupportedGateway)
        }
    }

    /// Site configuration (`config.json` on the gateway).
    pub fn config(&self, force: bool) -> Result<Arc<Value>> {
        self.cached(
            &self.json,
            ResourceKey::Config,
            self.settings.config_ttl,
            force,
            |din| {
                let request = envelope::config_request(din);
                let response = self.post_envelope(envelope::PRIMARY_PATH, &request, force)?;
                let config: Value = serde_json::from_str(envelope::config_text(&response)?)?;
                debug!("Configuration: {config}");
                Ok(Arc::new(config))
            },
        )
    }

    pub fn status(&self, force: bool) -> Result<Arc<Value>> {
        self.cached(
            &self.json,
            ResourceKey::Status,
            self.settings.cache_ttl,
            force,
            |din| {
                let request = envelope::query_request(din, &queries::STATUS);
                let response = self.post_envelope(envelope::PRIMARY_PATH, &request, force)?;
                let status: Value = serde_json::from_str(envelope::query_text(&response)?)?;
                debug!("Status: {status}");
                Ok(Arc::new(status))
            },
        )
    }

    pub fn firmware(&self, force: bool) -> Result<Arc<FirmwareInfo>> {
        self.cached(
            &self.firmware,
            ResourceKey::Firmware,
            self.settings.config_ttl,
            force,
            |din| {
                let request = envelope::firmware_request(din);
                let response = self.post_envelope(envelope::PRIMARY_PATH, &request, force)?;
                let firmware = envelope::firmware_info(&response)?;
                debug!("Firmware: {firmware:?}");
                Ok(Arc::new(firmware))
            },
        )
    }

    /// Human readable firmware version, e.g. `24.36.2`.
    pub fn firmware_version(&self, force: bool) -> Result<String> {
        Ok(self.firmware(force)?.version.text.clone())
    }

    /// Component signals of the gateway's own unit.
    pub fn components(&self, force: bool) -> Result<Arc<Value>> {
        self.cached(
            &self.json,
            ResourceKey::Components,
            self.settings.cache_ttl,
            force,
            |din| {
                self.require_newer_generation()?;
                let request = envelope::query_request(din, &queries::COMPONENTS);
                let response = self.post_envelope(envelope::PRIMARY_PATH, &request, force)?;
                let components: Value = serde_json::from_str(envelope::query_text(&response)?)?;
                debug!("Components: {components}");
                Ok(Arc::new(components))
            },
        )
    }

    fn device_query(&self, primary: &str, device: &str, force: bool) -> Result<Arc<Value>> {
        self.require_newer_generation()?;
        let request = envelope::device_query_request(primary, device, &queries::COMPONENTS);
        let response = self.post_envelope(&envelope::device_path(device), &request, force)?;
        let data: Value = serde_json::from_str(envelope::query_text(&response)?)?;
        debug!("Battery unit ('{device}'): {data}");
        Ok(Arc::new(data))
    }

    /// Component signals of one battery unit, addressed through the gateway.
    pub fn components_for_device(&self, device: &str, force: bool) -> Result<Arc<Value>> {
        self.cached(
            &self.json,
            ResourceKey::DeviceComponents(device.to_string()),
            self.settings.cache_ttl,
            force,
            |din| self.device_query(din, device, force),
        )
    }

    pub fn vitals_for_device(&self, device: &str, force: bool) -> Result<Arc<Value>> {
        self.cached(
            &self.json,
            ResourceKey::DeviceVitals(device.to_string()),
            self.settings.cache_ttl,
            force,
            |din| self.device_query(din, device, force),
        )
    }

    pub fn battery_blocks(&self, force: bool) -> Result<Vec<Value>> {
        Ok(blocks(&*self.config(force)?).to_vec())
    }

    /// Vitals of every battery unit, in the legacy layout.
    ///
    /// Costs two round trips plus one per battery unit. Any failing fetch
    /// aborts the whole aggregate and nothing is cached.
    pub fn aggregated_vitals(&self, force: bool) -> Result<Arc<Vitals>> {
        self.vitals_with_config(None, force)
    }

    /// Like `aggregated_vitals`, reusing `config` when the caller already
    /// holds a fresh copy.
    fn vitals_with_config(&self, config: Option<&Arc<Value>>, force: bool) -> Result<Arc<Vitals>> {
        self.cached(
            &self.vitals,
            ResourceKey::Vitals,
            self.settings.cache_ttl,
            force,
            |_| {
                let config = match config {
                    Some(config) => Arc::clone(config),
                    None => self.config(force)?,
                };
                self.components(force)?;

                let mut aggregate = Vitals::new();
                for block in blocks(&config) {
                    let block_type = block["type"].as_str().unwrap_or_default();
                    if !vitals::is_battery_unit(block_type) {
                        continue;
                    }
                    let vin = block["vin"]
                        .as_str()
                        .ok_or_else(|| Error::decode("battery block", "missing vin"))?;
                    let data = self.vitals_for_device(vin, force)?;
                    vitals::add_battery_unit(&mut aggregate, vin, &data)?;
                }
                Ok(Arc::new(aggregate))
            },
        )
    }
}

fn blocks(config: &Value) -> &[Value] {
    config["battery_blocks"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
}

impl<B: HttpBackend> TelemetrySource for Gateway<B> {
    fn snapshot(&self, force: bool, include_vitals: bool) -> Result<Snapshot> {
        let firmware = self.firmware(force)?;
        let config = self.config(force)?;
        let status = self.status(force)?;
        let vitals = if include_vitals {
            Some(self.vitals_with_config(Some(&config), force)?)
        } else {
            None
        };
        Ok(Snapshot {
            firmware,
            config,
            status,
            vitals,
            fetched_at: Local::now(),
        })
    }
}
