//! In-memory SNMP agent answering get-next from static tables.
//!
//! Backs `--replay` runs of the CLI and the walker tests.

use super::oid::{parse_components, DecodeError};
use super::{BindingValue, PollingSession, SessionError, VarBinding};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Replay file layout: `{"hosts": {"<addr>": {"<oid>": <value>}}, "unreachable": [...]}`
#[derive(Debug, Default, Deserialize)]
struct ReplayFile {
    #[serde(default)]
    hosts: HashMap<String, BTreeMap<String, BindingValue>>,
    #[serde(default)]
    unreachable: Vec<String>,
}

type HostTable = BTreeMap<Vec<u32>, (String, BindingValue)>;

#[derive(Debug, Default)]
pub struct TableSession {
    hosts: HashMap<String, HostTable>,
    unreachable: HashSet<String>,
    requests: AtomicUsize,
}

impl TableSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load host tables from a JSON replay file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {:?}", path))?;
        let replay: ReplayFile =
            serde_json::from_str(&content).context("Failed to parse replay file")?;

        let mut session = Self::new();
        for (host, rows) in replay.hosts {
            for (oid, value) in rows {
                session
                    .insert(&host, &oid, value)
                    .with_context(|| format!("Invalid OID in replay table for {}", host))?;
            }
        }
        for host in replay.unreachable {
            session.mark_unreachable(&host);
        }

        tracing::debug!(
            "Loaded replay tables for {} hosts from {:?}",
            session.hosts.len(),
            path
        );
        Ok(session)
    }

    /// Add one row to a host's table
    pub fn insert(
        &mut self,
        host: &str,
        oid: &str,
        value: BindingValue,
    ) -> Result<(), DecodeError> {
        let key = parse_components(oid)?;
        self.hosts
            .entry(host.to_string())
            .or_default()
            .insert(key, (oid.trim_start_matches('.').to_string(), value));
        Ok(())
    }

    /// Builder-style variant of [`TableSession::insert`]
    pub fn with_row(mut self, host: &str, oid: &str, value: BindingValue) -> Self {
        if let Err(e) = self.insert(host, oid, value) {
            tracing::warn!("Ignoring row for {}: {}", host, e);
        }
        self
    }

    /// Make every request to `host` fail with a transport error
    pub fn mark_unreachable(&mut self, host: &str) {
        self.unreachable.insert(host.to_string());
    }

    /// Number of get-next requests served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

impl PollingSession for TableSession {
    async fn get_next(&self, target: &str, oid: &str) -> Result<Vec<VarBinding>, SessionError> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        if self.unreachable.contains(target) {
            return Err(SessionError::Transport {
                target: target.to_string(),
                message: "request timed out".to_string(),
            });
        }

        let table = self.hosts.get(target).ok_or_else(|| SessionError::Transport {
            target: target.to_string(),
            message: "no response from agent".to_string(),
        })?;

        let requested = parse_components(oid).map_err(|e| SessionError::Protocol {
            target: target.to_string(),
            status: format!("genErr ({})", e),
        })?;

        let binding = table
            .range((Bound::Excluded(requested), Bound::Unbounded))
            .next()
            .map(|(_, (next_oid, value))| VarBinding::new(next_oid.clone(), value.clone()))
            .unwrap_or_else(|| VarBinding::new(oid, BindingValue::EndOfMibView));

        Ok(vec![binding])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_get_next_uses_numeric_order() {
        let session = TableSession::new()
            .with_row("10.0.0.1", "1.3.6.1.10", BindingValue::Integer(10))
            .with_row("10.0.0.1", "1.3.6.1.9", BindingValue::Integer(9))
            .with_row("10.0.0.1", "1.3.6.1.9.1", BindingValue::Integer(91));

        let first = session.get_next("10.0.0.1", "1.3.6.1").await.unwrap();
        assert_eq!(first[0].oid, "1.3.6.1.9");

        let second = session.get_next("10.0.0.1", "1.3.6.1.9").await.unwrap();
        assert_eq!(second[0].oid, "1.3.6.1.9.1");

        let third = session.get_next("10.0.0.1", "1.3.6.1.9.1").await.unwrap();
        assert_eq!(third[0].oid, "1.3.6.1.10");

        let end = session.get_next("10.0.0.1", "1.3.6.1.10").await.unwrap();
        assert_eq!(end[0].value, BindingValue::EndOfMibView);
        assert_eq!(session.request_count(), 4);
    }

    #[tokio::test]
    async fn test_unreachable_and_unknown_hosts() {
        let mut session =
            TableSession::new().with_row("10.0.0.1", "1.3.6", BindingValue::Integer(1));
        session.mark_unreachable("10.0.0.1");

        let err = session.get_next("10.0.0.1", "1.3").await.unwrap_err();
        assert!(matches!(err, SessionError::Transport { .. }));

        let err = session.get_next("10.0.0.9", "1.3").await.unwrap_err();
        assert!(matches!(err, SessionError::Transport { .. }));
    }

    #[test]
    fn test_replay_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
  "hosts": {{
    "10.0.0.1": {{
      "1.3.6.1.2.1.17.7.1.2.2.1.2.10.170.187.204.221.238.1": {{"integer": 3}}
    }}
  }},
  "unreachable": ["10.0.0.2"]
}}"#
        )
        .unwrap();

        let session = TableSession::from_json_file(file.path()).unwrap();

        assert_eq!(session.hosts.len(), 1);
        assert!(session.unreachable.contains("10.0.0.2"));
    }

    #[test]
    fn test_replay_file_with_bad_oid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"hosts": {{"10.0.0.1": {{"1.3.x": {{"integer": 3}}}}}}}}"#).unwrap();

        assert!(TableSession::from_json_file(file.path()).is_err());
    }
}
