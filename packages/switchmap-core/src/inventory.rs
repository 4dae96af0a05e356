//! Devices to poll: core devices and the access switches behind them.

use crate::snmp::oid::parse_components;
use crate::walker::{PollTarget, ARP_PHYS_ADDRESS_OID, FDB_PORT_OID};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

fn default_arp_oid() -> String {
    ARP_PHYS_ADDRESS_OID.to_string()
}

fn default_fdb_oid() -> String {
    FDB_PORT_OID.to_string()
}

/// An access switch whose forwarding table is walked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    pub address: String,
    #[serde(default = "default_fdb_oid")]
    pub oid: String,
    /// Uplink ports; the walk stops at the first one
    #[serde(default)]
    pub excluded_ports: Vec<u32>,
}

/// A core device whose address-resolution table is walked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSwitchConfig {
    pub address: String,
    #[serde(default = "default_arp_oid")]
    pub oid: String,
    #[serde(default)]
    pub switches: Vec<SwitchConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Empty address in {0}")]
    EmptyAddress(String),

    #[error("Invalid OID {oid} for {address}")]
    InvalidOid { address: String, oid: String },

    #[error("Switch {0} is listed more than once")]
    DuplicateSwitch(String),

    #[error("Core device {0} is listed more than once")]
    DuplicateCore(String),

    #[error("{field} = {value} is out of range")]
    OutOfRange { field: &'static str, value: u64 },
}

/// Validated polling inventory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    cores: Vec<CoreSwitchConfig>,
}

impl Inventory {
    pub fn new(cores: Vec<CoreSwitchConfig>) -> Result<Self, ConfigError> {
        let mut core_addresses = HashSet::new();
        let mut switch_addresses = HashSet::new();

        for core in &cores {
            if core.address.trim().is_empty() {
                return Err(ConfigError::EmptyAddress("core_switches".to_string()));
            }
            if !core_addresses.insert(core.address.as_str()) {
                return Err(ConfigError::DuplicateCore(core.address.clone()));
            }
            check_oid(&core.address, &core.oid)?;

            for switch in &core.switches {
                if switch.address.trim().is_empty() {
                    return Err(ConfigError::EmptyAddress(format!("switches of {}", core.address)));
                }
                if !switch_addresses.insert(switch.address.as_str()) {
                    return Err(ConfigError::DuplicateSwitch(switch.address.clone()));
                }
                check_oid(&switch.address, &switch.oid)?;
            }
        }

        Ok(Self { cores })
    }

    pub fn cores(&self) -> &[CoreSwitchConfig] {
        &self.cores
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    pub fn switch_count(&self) -> usize {
        self.cores.iter().map(|c| c.switches.len()).sum()
    }

    /// `(switch address, core address)` for every configured switch
    pub fn switch_assignments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cores
            .iter()
            .flat_map(|core| {
                core.switches
                    .iter()
                    .map(move |s| (s.address.as_str(), core.address.as_str()))
            })
    }

    pub fn forwarding_targets(&self) -> Vec<PollTarget> {
        self.cores
            .iter()
            .flat_map(|core| core.switches.iter())
            .map(|s| {
                PollTarget::new(&s.address, &s.oid)
                    .with_excluded_ports(s.excluded_ports.iter().copied())
            })
            .collect()
    }

    pub fn arp_targets(&self) -> Vec<PollTarget> {
        self.cores
            .iter()
            .map(|core| PollTarget::new(&core.address, &core.oid))
            .collect()
    }
}

fn check_oid(address: &str, oid: &str) -> Result<(), ConfigError> {
    match parse_components(oid) {
        Ok(components) if !components.is_empty() => Ok(()),
        _ => Err(ConfigError::InvalidOid {
            address: address.to_string(),
            oid: oid.to_string(),
        }),
    }
}
