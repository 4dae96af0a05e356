//! Join of forwarding-table rows with address-resolution rows.
//!
//! Every forwarding row is kept; rows without an ARP entry for their MAC get
//! the `NOT_FOUND` IP.

use crate::walker::{serialize_mac, ArpRow, ForwardingRow};
use mac_address::MacAddress;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

/// Placeholder stored when no address-resolution entry matched a MAC
pub const IP_NOT_FOUND: &str = "NOT_FOUND";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIp {
    Known(Ipv4Addr),
    NotFound,
}

impl std::fmt::Display for DeviceIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceIp::Known(ip) => write!(f, "{}", ip),
            DeviceIp::NotFound => write!(f, "{}", IP_NOT_FOUND),
        }
    }
}

impl Serialize for DeviceIp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Forwarding row enriched with the IP from the core devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedRow {
    pub switch: String,
    pub vlan: u32,
    #[serde(serialize_with = "serialize_mac")]
    pub mac: MacAddress,
    pub port: u32,
    pub ip: DeviceIp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutput {
    /// Merged rows grouped by owning switch
    pub by_switch: BTreeMap<String, Vec<MergedRow>>,
    /// First core device of the pass, for logging only
    pub representative_core: Option<String>,
}

impl MergeOutput {
    pub fn row_count(&self) -> usize {
        self.by_switch.values().map(Vec::len).sum()
    }

    pub fn resolved_count(&self) -> usize {
        self.by_switch
            .values()
            .flatten()
            .filter(|row| row.ip != DeviceIp::NotFound)
            .count()
    }
}

/// Join `forwarding` with `arp_by_core` on MAC.
///
/// When several ARP rows carry the same MAC the first one wins, scanning core
/// devices in address order.
pub fn merge(
    forwarding: Vec<ForwardingRow>,
    arp_by_core: &BTreeMap<String, Vec<ArpRow>>,
) -> MergeOutput {
    let mut ip_by_mac: HashMap<[u8; 6], Ipv4Addr> = HashMap::new();
    for row in arp_by_core.values().flatten() {
        ip_by_mac.entry(row.mac.bytes()).or_insert(row.ip);
    }

    let mut by_switch: BTreeMap<String, Vec<MergedRow>> = BTreeMap::new();
    for row in forwarding {
        let ip = ip_by_mac
            .get(&row.mac.bytes())
            .map(|ip| DeviceIp::Known(*ip))
            .unwrap_or(DeviceIp::NotFound);

        by_switch.entry(row.switch.clone()).or_default().push(MergedRow {
            switch: row.switch,
            vlan: row.vlan,
            mac: row.mac,
            port: row.port,
            ip,
        });
    }

    let output = MergeOutput {
        by_switch,
        representative_core: arp_by_core.keys().next().cloned(),
    };

    tracing::info!(
        "Merged {} rows across {} switches ({} with IP, core {})",
        output.row_count(),
        output.by_switch.len(),
        output.resolved_count(),
        output.representative_core.as_deref().unwrap_or("-")
    );

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(text: &str) -> MacAddress {
        text.parse().unwrap()
    }

    fn fdb(switch: &str, vlan: u32, mac_text: &str, port: u32) -> ForwardingRow {
        ForwardingRow {
            switch: switch.to_string(),
            vlan,
            mac: mac(mac_text),
            port,
        }
    }

    fn arp(vlan: u32, mac_text: &str, ip: [u8; 4]) -> ArpRow {
        ArpRow {
            vlan,
            mac: mac(mac_text),
            ip: Ipv4Addr::from(ip),
        }
    }

    #[test]
    fn test_matched_row_gets_ip() {
        let forwarding = vec![fdb("10.0.0.1", 10, "AA:BB:CC:DD:EE:01", 3)];
        let mut arp_rows = BTreeMap::new();
        arp_rows.insert(
            "10.0.0.254".to_string(),
            vec![arp(10, "AA:BB:CC:DD:EE:01", [10, 0, 0, 50])],
        );

        let output = merge(forwarding, &arp_rows);

        assert_eq!(output.representative_core.as_deref(), Some("10.0.0.254"));
        assert_eq!(
            output.by_switch["10.0.0.1"],
            vec![MergedRow {
                switch: "10.0.0.1".to_string(),
                vlan: 10,
                mac: mac("AA:BB:CC:DD:EE:01"),
                port: 3,
                ip: DeviceIp::Known(Ipv4Addr::new(10, 0, 0, 50)),
            }]
        );
    }

    #[test]
    fn test_unmatched_row_keeps_sentinel() {
        let forwarding = vec![fdb("10.0.0.1", 10, "AA:BB:CC:DD:EE:01", 3)];

        let output = merge(forwarding, &BTreeMap::new());

        let row = &output.by_switch["10.0.0.1"][0];
        assert_eq!(row.ip, DeviceIp::NotFound);
        assert_eq!(row.ip.to_string(), "NOT_FOUND");
        assert_eq!(row.port, 3);
        assert!(output.representative_core.is_none());
    }

    #[test]
    fn test_merge_is_total_and_grouped() {
        let forwarding = vec![
            fdb("10.0.0.1", 10, "AA:BB:CC:DD:EE:01", 3),
            fdb("10.0.0.2", 20, "AA:BB:CC:DD:EE:02", 4),
            fdb("10.0.0.1", 10, "AA:BB:CC:DD:EE:03", 5),
            fdb("10.0.0.2", 20, "AA:BB:CC:DD:EE:04", 6),
        ];
        let mut arp_rows = BTreeMap::new();
        arp_rows.insert(
            "10.0.0.254".to_string(),
            vec![
                arp(10, "AA:BB:CC:DD:EE:03", [10, 0, 0, 53]),
                arp(99, "AA:BB:CC:DD:EE:99", [10, 0, 0, 99]),
            ],
        );

        let total = forwarding.len();
        let output = merge(forwarding, &arp_rows);

        assert_eq!(output.row_count(), total);
        assert_eq!(output.resolved_count(), 1);
        assert_eq!(output.by_switch.len(), 2);
        assert_eq!(output.by_switch["10.0.0.1"].len(), 2);
        assert_eq!(output.by_switch["10.0.0.2"].len(), 2);
    }

    #[test]
    fn test_first_match_wins() {
        let forwarding = vec![fdb("10.0.0.1", 10, "AA:BB:CC:DD:EE:01", 3)];
        let mut arp_rows = BTreeMap::new();
        arp_rows.insert(
            "10.0.0.253".to_string(),
            vec![arp(10, "AA:BB:CC:DD:EE:01", [10, 0, 0, 7])],
        );
        arp_rows.insert(
            "10.0.0.254".to_string(),
            vec![arp(10, "AA:BB:CC:DD:EE:01", [10, 0, 0, 8])],
        );

        let output = merge(forwarding, &arp_rows);

        assert_eq!(
            output.by_switch["10.0.0.1"][0].ip,
            DeviceIp::Known(Ipv4Addr::new(10, 0, 0, 7))
        );
        assert_eq!(output.representative_core.as_deref(), Some("10.0.0.253"));
    }
}
