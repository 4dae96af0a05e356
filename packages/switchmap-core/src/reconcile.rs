//! Reconciliation of a merged snapshot against the device directory.

use crate::directory::{DeviceDirectory, DirectoryStore, StoreError, SwitchId, Upsert};
use crate::merge::MergedRow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Switch {0} is not registered in the directory")]
    UnknownSwitch(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub updated: usize,
    pub marked_offline: usize,
    /// Switches whose devices were reconciled
    pub switches: usize,
}

/// Apply `snapshot` (merged rows grouped by switch address) to `directory`.
///
/// Only devices owned by switches present in `snapshot` are considered for
/// going offline. Unknown switches fail the call before any change is made.
pub fn reconcile(
    directory: &mut DeviceDirectory,
    snapshot: &BTreeMap<String, Vec<MergedRow>>,
    now: DateTime<Utc>,
) -> Result<ReconcileSummary, ReconcileError> {
    let resolved: Vec<(SwitchId, &Vec<MergedRow>)> = snapshot
        .iter()
        .map(|(address, rows)| {
            directory
                .switch_id(address)
                .map(|id| (id, rows))
                .ok_or_else(|| ReconcileError::UnknownSwitch(address.clone()))
        })
        .collect::<Result<_, _>>()?;

    let mut summary = ReconcileSummary {
        switches: resolved.len(),
        ..Default::default()
    };

    for (switch_id, rows) in &resolved {
        for row in rows.iter() {
            match directory.upsert_device(*switch_id, row, now) {
                Upsert::Inserted(_) => summary.inserted += 1,
                Upsert::Updated(_) => summary.updated += 1,
            }
        }
    }

    for (switch_id, rows) in &resolved {
        let seen: HashSet<String> = rows.iter().map(|row| row.mac.to_string()).collect();
        let absent: Vec<_> = directory
            .find_devices(*switch_id)
            .into_iter()
            .filter(|device| !seen.contains(&device.mac))
            .map(|device| device.id)
            .collect();

        for id in absent {
            if directory.mark_offline(id) {
                summary.marked_offline += 1;
            }
        }
    }

    tracing::info!(
        "Reconciled {} switches: {} inserted, {} updated, {} marked offline",
        summary.switches,
        summary.inserted,
        summary.updated,
        summary.marked_offline
    );

    Ok(summary)
}

/// Runs [`reconcile`] against a store: load, apply, save once.
pub struct Reconciler<'a, St: DirectoryStore> {
    store: &'a St,
}

impl<'a, St: DirectoryStore> Reconciler<'a, St> {
    pub fn new(store: &'a St) -> Self {
        Self { store }
    }

    pub fn apply(
        &self,
        snapshot: &BTreeMap<String, Vec<MergedRow>>,
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let mut directory = self.store.load()?;
        let summary = reconcile(&mut directory, snapshot, now)?;
        self.store.save(&directory)?;
        Ok(summary)
    }
}
