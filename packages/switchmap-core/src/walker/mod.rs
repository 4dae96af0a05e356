//! Table walkers.
//!
//! A walk repeatedly issues get-next requests starting at a table's root OID
//! and stops when the agent leaves the table subtree, an excluded port is
//! reached, or the session fails. Two table kinds are supported:
//! - bridge forwarding table (VLAN + MAC -> port) on access switches
//! - address-resolution table (VLAN + IP -> MAC) on core devices

mod arp;
mod fanout;
mod fdb;

pub use arp::AddressResolution;
pub use fanout::{poll_core_devices, poll_switches, run_many, FanOut, TargetFailure};
pub use fdb::ForwardingTable;

use crate::snmp::oid::{self, DecodeError};
use crate::snmp::{BindingValue, PollingSession, SessionError};
use mac_address::MacAddress;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use thiserror::Error;

/// dot1qTpFdbPort
pub const FDB_PORT_OID: &str = "1.3.6.1.2.1.17.7.1.2.2.1.2";
/// ipNetToMediaPhysAddress
pub const ARP_PHYS_ADDRESS_OID: &str = "1.3.6.1.2.1.4.22.1.2";

/// The kinds of table this crate knows how to walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkKind {
    ForwardingTable,
    AddressResolution,
}

impl WalkKind {
    /// Standard root OID for this table
    pub fn default_root(&self) -> &'static str {
        match self {
            WalkKind::ForwardingTable => FDB_PORT_OID,
            WalkKind::AddressResolution => ARP_PHYS_ADDRESS_OID,
        }
    }
}

impl std::fmt::Display for WalkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalkKind::ForwardingTable => write!(f, "forwarding table"),
            WalkKind::AddressResolution => write!(f, "address-resolution table"),
        }
    }
}

/// One device to poll in one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTarget {
    pub address: String,
    pub root_oid: String,
    /// Port numbers that end a forwarding-table walk
    #[serde(default)]
    pub excluded_ports: BTreeSet<u32>,
}

impl PollTarget {
    pub fn new(address: impl Into<String>, root_oid: impl Into<String>) -> Self {
        let root_oid: String = root_oid.into();
        Self {
            address: address.into(),
            // Agents answer without the leading dot
            root_oid: root_oid.trim_start_matches('.').to_string(),
            excluded_ports: BTreeSet::new(),
        }
    }

    pub fn with_excluded_ports(mut self, ports: impl IntoIterator<Item = u32>) -> Self {
        self.excluded_ports.extend(ports);
        self
    }
}

/// A forwarding-table entry seen on an access switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardingRow {
    pub switch: String,
    pub vlan: u32,
    #[serde(serialize_with = "serialize_mac")]
    pub mac: MacAddress,
    pub port: u32,
}

/// An address-resolution entry seen on a core device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArpRow {
    pub vlan: u32,
    #[serde(serialize_with = "serialize_mac")]
    pub mac: MacAddress,
    pub ip: Ipv4Addr,
}

pub(crate) fn serialize_mac<S: Serializer>(
    mac: &MacAddress,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(mac)
}

/// Outcome of interpreting one binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<R> {
    Row(R),
    /// Not a device binding; continue with the next OID
    Skip,
    /// Stop the walk and keep what was collected
    EndOfTable,
}

/// Per-table interpretation of get-next responses
pub trait TableStrategy {
    type Row;

    const KIND: WalkKind;

    /// Turn the decoded index and value of one binding into a walk step
    fn interpret(
        &self,
        target: &PollTarget,
        index: &[u32],
        value: &BindingValue,
    ) -> Result<Step<Self::Row>, DecodeError>;
}

/// Reasons a single walk fails
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalkError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Failed to decode {oid} from {target}: {source}")]
    Decode {
        target: String,
        oid: String,
        #[source]
        source: DecodeError,
    },

    #[error("Empty response from {0}")]
    EmptyResponse(String),

    #[error("{target} answered {returned} which does not follow {requested}")]
    NotIncreasing {
        target: String,
        requested: String,
        returned: String,
    },
}

/// Walk one table on one target to its natural end.
pub async fn walk<S, T>(
    session: &S,
    strategy: &T,
    target: &PollTarget,
) -> Result<Vec<T::Row>, WalkError>
where
    S: PollingSession,
    T: TableStrategy,
{
    let root = target.root_oid.as_str();
    let decode_error = |oid: &str, source: DecodeError| WalkError::Decode {
        target: target.address.clone(),
        oid: oid.to_string(),
        source,
    };

    let mut current = root.to_string();
    let mut current_key = oid::parse_components(root).map_err(|e| decode_error(root, e))?;
    let mut rows = Vec::new();
    let mut requests = 0usize;

    loop {
        let bindings = session.get_next(&target.address, &current).await?;
        requests += 1;

        let Some(binding) = bindings.into_iter().next() else {
            return Err(WalkError::EmptyResponse(target.address.clone()));
        };

        if binding.value.is_exception() || !oid::is_within(&binding.oid, root) {
            break;
        }

        let key = oid::parse_components(&binding.oid).map_err(|e| decode_error(&binding.oid, e))?;
        if key <= current_key {
            return Err(WalkError::NotIncreasing {
                target: target.address.clone(),
                requested: current,
                returned: binding.oid,
            });
        }

        let index = oid::decode(&binding.oid, root).map_err(|e| decode_error(&binding.oid, e))?;
        match strategy
            .interpret(target, &index, &binding.value)
            .map_err(|e| decode_error(&binding.oid, e))?
        {
            Step::Row(row) => rows.push(row),
            Step::Skip => {}
            Step::EndOfTable => {
                tracing::debug!(
                    "{}: walk of {} stopped at {}",
                    target.address,
                    T::KIND,
                    binding.oid
                );
                break;
            }
        }

        current = binding.oid;
        current_key = key;
    }

    tracing::debug!(
        "{}: {} walk finished with {} rows after {} requests",
        target.address,
        T::KIND,
        rows.len(),
        requests
    );

    Ok(rows)
}

/// Rows of a walk selected at runtime by [`WalkKind`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WalkOutput {
    Forwarding(Vec<ForwardingRow>),
    AddressResolution(Vec<ArpRow>),
}

impl WalkOutput {
    pub fn len(&self) -> usize {
        match self {
            WalkOutput::Forwarding(rows) => rows.len(),
            WalkOutput::AddressResolution(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Walk a single target with the strategy mapped to `kind`.
pub async fn walk_kind<S: PollingSession>(
    session: &S,
    kind: WalkKind,
    target: &PollTarget,
    skip_vlan: Option<u32>,
) -> Result<WalkOutput, WalkError> {
    match kind {
        WalkKind::ForwardingTable => walk(session, &ForwardingTable::new(skip_vlan), target)
            .await
            .map(WalkOutput::Forwarding),
        WalkKind::AddressResolution => walk(session, &AddressResolution, target)
            .await
            .map(WalkOutput::AddressResolution),
    }
}
