//! Switchmap Core Library
//!
//! Discovers where devices are plugged in by walking SNMP tables:
//! - Forwarding tables of access switches (VLAN, MAC, port)
//! - Address-resolution tables of core devices (VLAN, IP, MAC)
//! - Merge of both views by MAC and reconciliation into a device directory
//!
//! # Example
//!
//! ```no_run
//! use switchmap_core::{config, discovery, directory::JsonFileStore, snmp::SnmpSession};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (config, _source) = config::load_config()?;
//!     let options = config.snmp.session_options();
//!     let switches = SnmpSession::new(config.snmp.switch_auth.clone(), options.clone());
//!     let cores = SnmpSession::new(config.snmp.core_auth.clone(), options);
//!     let store = JsonFileStore::open_default()?;
//!
//!     let now = chrono::Utc::now();
//!     let report = discovery::run_configured(&config, &switches, &cores, &store, now).await?;
//!     println!("{} devices inserted", report.summary.inserted);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod directory;
pub mod discovery;
pub mod guard;
pub mod inventory;
pub mod merge;
pub mod reconcile;
pub mod snmp;
pub mod walker;

// Re-export commonly used types
pub use config::{Config, ConfigSource};
pub use directory::{
    AnnotateError, DeviceDirectory, DeviceQuery, DirectoryStore, JsonFileStore, MemoryStore,
    PersistedDevice,
};
pub use discovery::{
    run_configured, run_discovery, DiscoveryError, DiscoveryReport, DiscoverySettings,
};
pub use guard::{GuardBusy, RunGuard, RunPermit};
pub use inventory::{ConfigError, Inventory};
pub use merge::{merge, DeviceIp, MergeOutput, MergedRow};
pub use reconcile::{reconcile, ReconcileError, ReconcileSummary, Reconciler};
pub use walker::{walk, walk_kind, PollTarget, WalkError, WalkKind, WalkOutput};
