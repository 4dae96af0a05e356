//! Concurrent walks over many targets.
//!
//! All walks of a batch are multiplexed on the calling task; one failing
//! target never cancels its siblings.

use super::{
    walk, AddressResolution, ArpRow, ForwardingRow, ForwardingTable, PollTarget, TableStrategy,
    WalkError, WalkKind,
};
use crate::snmp::PollingSession;
use serde::Serialize;
use std::collections::BTreeMap;

/// A target whose walk did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetFailure {
    pub address: String,
    pub kind: WalkKind,
    pub reason: String,
}

/// Flattened rows of a batch plus the targets that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOut<T> {
    pub rows: T,
    /// Targets whose walk completed, in input order
    pub succeeded: Vec<String>,
    pub failures: Vec<TargetFailure>,
}

/// Run one walk per target concurrently and return every outcome in input order.
pub async fn run_many<S, T>(
    session: &S,
    strategy: &T,
    targets: &[PollTarget],
) -> Vec<(String, Result<Vec<T::Row>, WalkError>)>
where
    S: PollingSession,
    T: TableStrategy,
{
    let walks = targets.iter().map(|target| async move {
        let outcome = walk(session, strategy, target).await;
        (target.address.clone(), outcome)
    });

    futures::future::join_all(walks).await
}

fn split_outcomes<R>(
    kind: WalkKind,
    outcomes: Vec<(String, Result<Vec<R>, WalkError>)>,
) -> (Vec<(String, Vec<R>)>, Vec<TargetFailure>) {
    let mut successes = Vec::new();
    let mut failures = Vec::new();

    for (address, outcome) in outcomes {
        match outcome {
            Ok(rows) => successes.push((address, rows)),
            Err(e) => {
                tracing::warn!("{} walk of {} failed: {}", kind, address, e);
                failures.push(TargetFailure {
                    address,
                    kind,
                    reason: e.to_string(),
                });
            }
        }
    }

    (successes, failures)
}

/// Walk the forwarding table of every switch and concatenate the rows.
pub async fn poll_switches<S: PollingSession>(
    session: &S,
    strategy: &ForwardingTable,
    targets: &[PollTarget],
) -> FanOut<Vec<ForwardingRow>> {
    let outcomes = run_many(session, strategy, targets).await;
    let (successes, failures) = split_outcomes(WalkKind::ForwardingTable, outcomes);

    let mut rows = Vec::new();
    let mut succeeded = Vec::with_capacity(successes.len());
    for (address, switch_rows) in successes {
        rows.extend(switch_rows);
        succeeded.push(address);
    }

    tracing::info!(
        "Forwarding tables: {} rows from {}/{} switches",
        rows.len(),
        succeeded.len(),
        targets.len()
    );

    FanOut {
        rows,
        succeeded,
        failures,
    }
}

/// Walk the address-resolution table of every core device, keyed by address.
pub async fn poll_core_devices<S: PollingSession>(
    session: &S,
    targets: &[PollTarget],
) -> FanOut<BTreeMap<String, Vec<ArpRow>>> {
    let outcomes = run_many(session, &AddressResolution, targets).await;
    let (successes, failures) = split_outcomes(WalkKind::AddressResolution, outcomes);

    let mut rows: BTreeMap<String, Vec<ArpRow>> = BTreeMap::new();
    let mut succeeded = Vec::with_capacity(successes.len());
    for (address, core_rows) in successes {
        rows.entry(address.clone()).or_default().extend(core_rows);
        succeeded.push(address);
    }

    tracing::info!(
        "Address-resolution tables: {} rows from {}/{} core devices",
        rows.values().map(Vec::len).sum::<usize>(),
        succeeded.len(),
        targets.len()
    );

    FanOut {
        rows,
        succeeded,
        failures,
    }
}
