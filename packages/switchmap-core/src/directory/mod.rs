//! Persisted device directory.
//!
//! Switches and devices live in flat arenas addressed by [`SwitchId`] and
//! [`DeviceId`]; devices point at their switch by id. MAC is the unique device
//! key across the whole directory.

mod oui;
mod persistence;

pub use oui::lookup_vendor;
pub use persistence::{default_directory_path, JsonFileStore};

use crate::merge::MergedRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl std::fmt::Display for SwitchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "switch#{}", self.0)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchRecord {
    pub id: SwitchId,
    pub address: String,
    /// Core device whose address-resolution table covers this switch
    pub core_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedDevice {
    pub id: DeviceId,
    /// Upper-case colon-separated MAC, unique in the directory
    pub mac: String,
    pub port: u32,
    pub vlan: u32,
    /// IPv4 address or `NOT_FOUND`
    pub ip_address: String,
    /// true while the device is seen in passes covering its switch
    pub status: bool,
    pub updated_at: DateTime<Utc>,
    pub switch_id: SwitchId,
    #[serde(default)]
    pub vendor: Option<String>,
    /// Operator-assigned workplace label, unique when set
    #[serde(default)]
    pub workplace_number: Option<String>,
}

/// Longest accepted workplace label
pub const MAX_WORKPLACE_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted(DeviceId),
    Updated(DeviceId),
}

impl Upsert {
    pub fn id(&self) -> DeviceId {
        match self {
            Upsert::Inserted(id) | Upsert::Updated(id) => *id,
        }
    }
}

/// Filters for [`DeviceDirectory::query`]. Text filters match substrings.
#[derive(Debug, Clone, Default)]
pub struct DeviceQuery {
    pub switch: Option<String>,
    pub status: Option<bool>,
    pub vlan: Option<u32>,
    pub mac: Option<String>,
    pub ip: Option<String>,
    /// Workplace label (substring); devices without one never match
    pub workplace: Option<String>,
}

/// On-disk shape of the directory; indexes are rebuilt on load
#[derive(Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    switches: Vec<SwitchRecord>,
    #[serde(default)]
    devices: Vec<PersistedDevice>,
    #[serde(default)]
    last_discovery: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "DirectoryFile")]
pub struct DeviceDirectory {
    switches: Vec<SwitchRecord>,
    devices: Vec<PersistedDevice>,
    /// Start of the last discovery pass
    last_discovery: Option<DateTime<Utc>>,
    #[serde(skip)]
    device_by_mac: HashMap<String, usize>,
    #[serde(skip)]
    device_by_id: HashMap<DeviceId, usize>,
}

impl From<DirectoryFile> for DeviceDirectory {
    fn from(file: DirectoryFile) -> Self {
        let mut directory = DeviceDirectory {
            switches: file.switches,
            devices: file.devices,
            last_discovery: file.last_discovery,
            device_by_mac: HashMap::new(),
            device_by_id: HashMap::new(),
        };
        for (position, device) in directory.devices.iter().enumerate() {
            directory.device_by_mac.insert(device.mac.clone(), position);
            directory.device_by_id.insert(device.id, position);
        }
        directory
    }
}

impl PartialEq for DeviceDirectory {
    fn eq(&self, other: &Self) -> bool {
        self.switches == other.switches
            && self.devices == other.devices
            && self.last_discovery == other.last_discovery
    }
}

impl DeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switches(&self) -> &[SwitchRecord] {
        &self.switches
    }

    pub fn devices(&self) -> &[PersistedDevice] {
        &self.devices
    }

    pub fn last_discovery(&self) -> Option<DateTime<Utc>> {
        self.last_discovery
    }

    pub fn set_last_discovery(&mut self, at: DateTime<Utc>) {
        self.last_discovery = Some(at);
    }

    /// Add a switch, or refresh its core address if already known.
    pub fn register_switch(&mut self, address: &str, core_address: &str) -> SwitchId {
        if let Some(record) = self.switches.iter_mut().find(|s| s.address == address) {
            if record.core_address != core_address {
                tracing::info!(
                    "Switch {} moved from core {} to {}",
                    address,
                    record.core_address,
                    core_address
                );
                record.core_address = core_address.to_string();
            }
            return record.id;
        }

        let id = SwitchId(self.switches.iter().map(|s| s.id.0).max().unwrap_or(0) + 1);
        self.switches.push(SwitchRecord {
            id,
            address: address.to_string(),
            core_address: core_address.to_string(),
        });
        tracing::debug!("Registered switch {} as {}", address, id);
        id
    }

    pub fn switch_id(&self, address: &str) -> Option<SwitchId> {
        self.switches.iter().find(|s| s.address == address).map(|s| s.id)
    }

    pub fn switch(&self, id: SwitchId) -> Option<&SwitchRecord> {
        self.switches.iter().find(|s| s.id == id)
    }

    /// Devices currently owned by `switch_id`
    pub fn find_devices(&self, switch_id: SwitchId) -> Vec<&PersistedDevice> {
        self.devices.iter().filter(|d| d.switch_id == switch_id).collect()
    }

    pub fn device(&self, id: DeviceId) -> Option<&PersistedDevice> {
        self.device_by_id.get(&id).map(|&position| &self.devices[position])
    }

    pub fn device_by_mac(&self, mac: &str) -> Option<&PersistedDevice> {
        self.device_by_mac.get(mac).map(|&position| &self.devices[position])
    }

    /// Record an observation of `row` on `switch_id`.
    ///
    /// An existing record with the same MAC is updated in place and moved to
    /// `switch_id` if it was seen elsewhere before.
    pub fn upsert_device(
        &mut self,
        switch_id: SwitchId,
        row: &MergedRow,
        now: DateTime<Utc>,
    ) -> Upsert {
        let mac = row.mac.to_string();

        if let Some(&position) = self.device_by_mac.get(&mac) {
            let device = &mut self.devices[position];
            if device.switch_id != switch_id {
                tracing::info!("Device {} moved from {} to {}", mac, device.switch_id, switch_id);
                device.switch_id = switch_id;
            }
            device.port = row.port;
            device.vlan = row.vlan;
            device.ip_address = row.ip.to_string();
            device.status = true;
            device.updated_at = now;
            return Upsert::Updated(device.id);
        }

        let id = DeviceId(self.devices.iter().map(|d| d.id.0).max().unwrap_or(0) + 1);
        let vendor = lookup_vendor(&mac);
        let position = self.devices.len();
        self.devices.push(PersistedDevice {
            id,
            mac: mac.clone(),
            port: row.port,
            vlan: row.vlan,
            ip_address: row.ip.to_string(),
            status: true,
            updated_at: now,
            switch_id,
            vendor,
            workplace_number: None,
        });
        self.device_by_mac.insert(mac, position);
        self.device_by_id.insert(id, position);
        Upsert::Inserted(id)
    }

    /// Flip a device offline. Returns whether its status changed.
    pub fn mark_offline(&mut self, id: DeviceId) -> bool {
        match self.device_by_id.get(&id) {
            Some(&position) => {
                let device = &mut self.devices[position];
                let changed = device.status;
                device.status = false;
                changed
            }
            None => false,
        }
    }

    /// Set or clear the workplace label of the device with MAC or IPv4 `key`.
    ///
    /// Passes never touch the label. A label already held by another device
    /// is rejected.
    pub fn annotate(
        &mut self,
        key: &str,
        workplace: Option<&str>,
    ) -> Result<DeviceId, AnnotateError> {
        let position = self
            .position_by_key(key)
            .ok_or_else(|| AnnotateError::UnknownDevice(key.to_string()))?;
        let workplace = workplace.map(str::trim).filter(|w| !w.is_empty());

        if let Some(label) = workplace {
            if label.chars().count() > MAX_WORKPLACE_LEN {
                return Err(AnnotateError::TooLong(label.to_string()));
            }
            let holder = self
                .devices
                .iter()
                .enumerate()
                .find(|(p, d)| *p != position && d.workplace_number.as_deref() == Some(label));
            if let Some((_, owner)) = holder {
                return Err(AnnotateError::DuplicateWorkplace {
                    workplace: label.to_string(),
                    owner: owner.mac.clone(),
                });
            }
        }

        let device = &mut self.devices[position];
        device.workplace_number = workplace.map(str::to_string);
        tracing::info!(
            "Workplace of {} set to {}",
            device.mac,
            device.workplace_number.as_deref().unwrap_or("none")
        );
        Ok(device.id)
    }

    fn position_by_key(&self, key: &str) -> Option<usize> {
        let key = key.trim();
        if let Ok(ip) = key.parse::<Ipv4Addr>() {
            let ip = ip.to_string();
            return self.devices.iter().position(|d| d.ip_address == ip);
        }
        let mac = key.to_uppercase().replace('-', ":");
        self.device_by_mac.get(&mac).copied()
    }

    /// Devices matching every set filter, ordered by switch then port
    pub fn query(&self, query: &DeviceQuery) -> Vec<&PersistedDevice> {
        let switch_ids: Option<Vec<SwitchId>> = query.switch.as_ref().map(|pattern| {
            self.switches
                .iter()
                .filter(|s| s.address.contains(pattern.as_str()))
                .map(|s| s.id)
                .collect()
        });
        let mac = query.mac.as_ref().map(|m| m.to_uppercase());

        let mut devices: Vec<&PersistedDevice> = self
            .devices
            .iter()
            .filter(|d| switch_ids.as_ref().is_none_or(|ids| ids.contains(&d.switch_id)))
            .filter(|d| query.status.is_none_or(|status| d.status == status))
            .filter(|d| query.vlan.is_none_or(|vlan| d.vlan == vlan))
            .filter(|d| mac.as_ref().is_none_or(|m| d.mac.contains(m.as_str())))
            .filter(|d| query.ip.as_ref().is_none_or(|ip| d.ip_address.contains(ip.as_str())))
            .filter(|d| {
                query.workplace.as_ref().is_none_or(|w| {
                    d.workplace_number
                        .as_ref()
                        .is_some_and(|label| label.contains(w.as_str()))
                })
            })
            .collect();

        devices.sort_by_key(|d| (d.switch_id, d.port, d.id));
        devices
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotateError {
    #[error("No device with MAC or IP {0}")]
    UnknownDevice(String),

    #[error("Workplace {workplace} is already assigned to {owner}")]
    DuplicateWorkplace { workplace: String, owner: String },

    #[error("Workplace {0:?} is longer than 50 characters")]
    TooLong(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Directory I/O failed on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory file {path} is not valid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No data directory available for the directory file")]
    NoDataDir,
}

/// Load/save boundary for [`DeviceDirectory`]
pub trait DirectoryStore {
    fn load(&self) -> Result<DeviceDirectory, StoreError>;
    fn save(&self, directory: &DeviceDirectory) -> Result<(), StoreError>;
}

/// Directory kept in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    directory: Mutex<DeviceDirectory>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(directory: DeviceDirectory) -> Self {
        Self {
            directory: Mutex::new(directory),
            saves: Mutex::new(0),
        }
    }

    /// Number of completed saves
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|count| *count).unwrap_or(0)
    }
}

impl DirectoryStore for MemoryStore {
    fn load(&self) -> Result<DeviceDirectory, StoreError> {
        Ok(self
            .directory
            .lock()
            .map(|directory| directory.clone())
            .unwrap_or_default())
    }

    fn save(&self, directory: &DeviceDirectory) -> Result<(), StoreError> {
        if let Ok(mut stored) = self.directory.lock() {
            *stored = directory.clone();
        }
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}
