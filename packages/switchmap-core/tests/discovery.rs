use chrono::{Duration, Utc};
use mac_address::MacAddress;
use std::net::Ipv4Addr;
use switchmap_core::directory::{DeviceQuery, DirectoryStore, MemoryStore};
use switchmap_core::inventory::{CoreSwitchConfig, Inventory, SwitchConfig};
use switchmap_core::snmp::oid::{encode_ip_index, encode_mac_index};
use switchmap_core::snmp::{BindingValue, TableSession};
use switchmap_core::walker::{WalkKind, ARP_PHYS_ADDRESS_OID, FDB_PORT_OID};
use switchmap_core::{run_discovery, DiscoverySettings};

fn mac(last: u8) -> MacAddress {
    MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
}

fn add_fdb(session: &mut TableSession, switch: &str, vlan: u32, last: u8, port: i64) {
    session
        .insert(
            switch,
            &encode_mac_index(FDB_PORT_OID, vlan, &mac(last)),
            BindingValue::Integer(port),
        )
        .unwrap();
}

fn add_arp(session: &mut TableSession, core: &str, vlan: u32, last: u8) {
    session
        .insert(
            core,
            &encode_ip_index(ARP_PHYS_ADDRESS_OID, vlan, Ipv4Addr::new(10, 0, 0, last)),
            BindingValue::Octets(mac(last).bytes().to_vec()),
        )
        .unwrap();
}

fn inventory() -> Inventory {
    let switch = |address: &str, excluded: Vec<u32>| SwitchConfig {
        address: address.to_string(),
        oid: FDB_PORT_OID.to_string(),
        excluded_ports: excluded,
    };

    Inventory::new(vec![CoreSwitchConfig {
        address: "10.0.0.254".to_string(),
        oid: ARP_PHYS_ADDRESS_OID.to_string(),
        switches: vec![
            switch("10.0.0.1", vec![24]),
            switch("10.0.0.2", vec![]),
            switch("10.0.0.3", vec![]),
        ],
    }])
    .unwrap()
}

#[tokio::test]
async fn test_discovery_end_to_end() {
    let store = MemoryStore::new();
    let inventory = inventory();
    let settings = DiscoverySettings { skip_vlan: Some(1) };
    let t0 = Utc::now();

    // Pass 1: switch 3 is unreachable, switch 1 has an uplink and a VLAN 1 entry
    let mut first = TableSession::new();
    add_fdb(&mut first, "10.0.0.1", 1, 0x10, 3);
    add_fdb(&mut first, "10.0.0.1", 10, 0x01, 3);
    add_fdb(&mut first, "10.0.0.1", 10, 0x02, 4);
    add_fdb(&mut first, "10.0.0.1", 20, 0x05, 24);
    add_fdb(&mut first, "10.0.0.1", 20, 0x06, 5);
    add_fdb(&mut first, "10.0.0.2", 10, 0x03, 7);
    add_fdb(&mut first, "10.0.0.3", 10, 0x04, 1);
    first.mark_unreachable("10.0.0.3");
    add_arp(&mut first, "10.0.0.254", 10, 0x01);
    add_arp(&mut first, "10.0.0.254", 10, 0x03);

    let report = run_discovery(&first, &first, &inventory, &settings, &store, t0)
        .await
        .unwrap();

    assert_eq!(report.switches_polled, 3);
    assert_eq!(report.forwarding_rows, 3);
    assert_eq!(report.arp_rows, 2);
    assert_eq!(report.resolved_rows, 2);
    assert_eq!(report.summary.inserted, 3);
    assert_eq!(report.representative_core.as_deref(), Some("10.0.0.254"));
    assert!(!report.success());
    assert_eq!(report.failed_targets.len(), 1);
    assert_eq!(report.failed_targets[0].address, "10.0.0.3");
    assert_eq!(report.failed_targets[0].kind, WalkKind::ForwardingTable);

    let directory = store.load().unwrap();
    assert_eq!(directory.switches().len(), 3);
    assert_eq!(directory.last_discovery(), Some(t0));
    assert!(directory.device_by_mac("AA:BB:CC:DD:EE:10").is_none());
    assert!(directory.device_by_mac("AA:BB:CC:DD:EE:06").is_none());
    let first_device = directory.device_by_mac("AA:BB:CC:DD:EE:01").unwrap();
    assert_eq!(first_device.ip_address, "10.0.0.1");
    assert_eq!(first_device.port, 3);
    assert_eq!(directory.device_by_mac("AA:BB:CC:DD:EE:02").unwrap().ip_address, "NOT_FOUND");

    // Pass 2: EE:02 is gone from switch 1, EE:03 moved to switch 1
    let mut second = TableSession::new();
    add_fdb(&mut second, "10.0.0.1", 10, 0x01, 3);
    add_fdb(&mut second, "10.0.0.1", 10, 0x03, 9);
    add_fdb(&mut second, "10.0.0.2", 10, 0x07, 2);
    second.mark_unreachable("10.0.0.3");
    add_arp(&mut second, "10.0.0.254", 10, 0x01);

    let t1 = t0 + Duration::minutes(15);
    let report = run_discovery(&second, &second, &inventory, &settings, &store, t1)
        .await
        .unwrap();

    assert_eq!(report.summary.inserted, 1);
    assert_eq!(report.summary.updated, 2);
    assert_eq!(report.summary.marked_offline, 1);

    let directory = store.load().unwrap();
    let gone = directory.device_by_mac("AA:BB:CC:DD:EE:02").unwrap();
    assert!(!gone.status);
    assert_eq!(gone.updated_at, t0);

    let moved = directory.device_by_mac("AA:BB:CC:DD:EE:03").unwrap();
    assert!(moved.status);
    assert_eq!(moved.port, 9);
    assert_eq!(moved.switch_id, directory.switch_id("10.0.0.1").unwrap());
    assert_eq!(moved.ip_address, "NOT_FOUND");

    let online = directory.query(&DeviceQuery {
        status: Some(true),
        ..Default::default()
    });
    assert_eq!(online.len(), 3);
    assert_eq!(store.save_count(), 2);
}
