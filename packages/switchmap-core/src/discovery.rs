//! One discovery pass from inventory to persisted directory.

use crate::config::Config;
use crate::directory::{DirectoryStore, StoreError};
use crate::inventory::{ConfigError, Inventory};
use crate::merge::merge;
use crate::reconcile::{reconcile, ReconcileError, ReconcileSummary};
use crate::snmp::PollingSession;
use crate::walker::{poll_core_devices, poll_switches, ForwardingTable, TargetFailure};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverySettings {
    /// VLAN whose forwarding entries are ignored
    pub skip_vlan: Option<u32>,
}

/// Faults that abort a whole pass
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid inventory: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub started_at: DateTime<Utc>,
    pub switches_polled: usize,
    pub cores_polled: usize,
    pub forwarding_rows: usize,
    pub arp_rows: usize,
    /// Merged rows that found an IP
    pub resolved_rows: usize,
    pub representative_core: Option<String>,
    pub summary: ReconcileSummary,
    /// Targets excluded from this pass
    pub failed_targets: Vec<TargetFailure>,
}

impl DiscoveryReport {
    /// True when every target was walked
    pub fn success(&self) -> bool {
        self.failed_targets.is_empty()
    }
}

/// Run one pass: walk all switches and core devices, merge, reconcile and
/// save the directory.
///
/// Unreachable targets are reported in [`DiscoveryReport::failed_targets`];
/// the devices of a failed switch keep their previous state. A switch that
/// answered with no rows has all its devices marked offline.
pub async fn run_discovery<S, C, St>(
    switch_session: &S,
    core_session: &C,
    inventory: &Inventory,
    settings: &DiscoverySettings,
    store: &St,
    now: DateTime<Utc>,
) -> Result<DiscoveryReport, DiscoveryError>
where
    S: PollingSession,
    C: PollingSession,
    St: DirectoryStore,
{
    tracing::info!(
        "Starting discovery: {} switches behind {} core devices",
        inventory.switch_count(),
        inventory.cores().len()
    );

    let mut directory = store.load()?;
    for (switch, core) in inventory.switch_assignments() {
        directory.register_switch(switch, core);
    }

    let switch_targets = inventory.forwarding_targets();
    let core_targets = inventory.arp_targets();
    let strategy = ForwardingTable::new(settings.skip_vlan);

    let (switches, cores) = futures::join!(
        poll_switches(switch_session, &strategy, &switch_targets),
        poll_core_devices(core_session, &core_targets)
    );

    let forwarding_rows = switches.rows.len();
    let arp_rows = cores.rows.values().map(Vec::len).sum();

    let mut merged = merge(switches.rows, &cores.rows);
    for address in &switches.succeeded {
        merged.by_switch.entry(address.clone()).or_default();
    }

    let summary = reconcile(&mut directory, &merged.by_switch, now)?;
    directory.set_last_discovery(now);
    store.save(&directory)?;

    let mut failed_targets = switches.failures;
    failed_targets.extend(cores.failures);

    let report = DiscoveryReport {
        started_at: now,
        switches_polled: switch_targets.len(),
        cores_polled: core_targets.len(),
        forwarding_rows,
        arp_rows,
        resolved_rows: merged.resolved_count(),
        representative_core: merged.representative_core,
        summary,
        failed_targets,
    };

    if report.success() {
        tracing::info!("Discovery finished: {} devices reconciled", forwarding_rows);
    } else {
        tracing::warn!(
            "Discovery finished with {} failed targets",
            report.failed_targets.len()
        );
    }

    Ok(report)
}

/// [`run_discovery`] with inventory and settings taken from `config`
pub async fn run_configured<S, C, St>(
    config: &Config,
    switch_session: &S,
    core_session: &C,
    store: &St,
    now: DateTime<Utc>,
) -> Result<DiscoveryReport, DiscoveryError>
where
    S: PollingSession,
    C: PollingSession,
    St: DirectoryStore,
{
    let inventory = config.inventory()?;
    run_discovery(
        switch_session,
        core_session,
        &inventory,
        &config.discovery.settings(),
        store,
        now,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DeviceQuery, MemoryStore};
    use crate::inventory::{CoreSwitchConfig, SwitchConfig};
    use crate::snmp::oid::encode_mac_index;
    use crate::snmp::{BindingValue, TableSession};
    use crate::walker::FDB_PORT_OID;

    fn inventory(switches: &[&str]) -> Inventory {
        Inventory::new(vec![CoreSwitchConfig {
            address: "10.0.0.254".to_string(),
            oid: crate::walker::ARP_PHYS_ADDRESS_OID.to_string(),
            switches: switches
                .iter()
                .map(|address| SwitchConfig {
                    address: address.to_string(),
                    oid: FDB_PORT_OID.to_string(),
                    excluded_ports: vec![],
                })
                .collect(),
        }])
        .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let config: Config = toml::from_str(
            r#"
[[core_switches]]
address = "10.0.0.254"
[[core_switches.switches]]
address = "10.0.0.1"
[[core_switches.switches]]
address = "10.0.0.1"
"#,
        )
        .unwrap();
        let session = TableSession::new();
        let store = MemoryStore::new();

        let err = run_configured(&config, &session, &session, &store, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, DiscoveryError::Config(ConfigError::DuplicateSwitch(_))));
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_switch_goes_offline_failed_switch_kept() {
        let first_mac = "AA:BB:CC:DD:EE:01".parse().unwrap();
        let second_mac = "AA:BB:CC:DD:EE:02".parse().unwrap();
        let first = TableSession::new()
            .with_row(
                "10.0.0.1",
                &encode_mac_index(FDB_PORT_OID, 10, &first_mac),
                BindingValue::Integer(3),
            )
            .with_row(
                "10.0.0.2",
                &encode_mac_index(FDB_PORT_OID, 10, &second_mac),
                BindingValue::Integer(4),
            );
        let store = MemoryStore::new();
        let inventory = inventory(&["10.0.0.1", "10.0.0.2"]);
        let settings = DiscoverySettings::default();

        let report = run_discovery(&first, &first, &inventory, &settings, &store, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.summary.inserted, 2);
        // Core device has no table
        assert_eq!(report.failed_targets.len(), 1);
        assert!(!report.success());

        // Switch 1 answers an empty table, switch 2 is unreachable
        let mut second =
            TableSession::new().with_row("10.0.0.1", "1.3.6.1.9", BindingValue::Integer(0));
        second.mark_unreachable("10.0.0.2");

        let report = run_discovery(&second, &second, &inventory, &settings, &store, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.summary.marked_offline, 1);

        let directory = store.load().unwrap();
        let offline = directory.query(&DeviceQuery {
            status: Some(false),
            ..Default::default()
        });
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].mac, "AA:BB:CC:DD:EE:01");
        assert!(directory.device_by_mac("AA:BB:CC:DD:EE:02").unwrap().status);
        assert!(directory.last_discovery().is_some());
    }
}
