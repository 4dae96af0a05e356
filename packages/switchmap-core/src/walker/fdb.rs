//! Bridge forwarding table (dot1qTpFdbPort) interpretation

use super::{ForwardingRow, PollTarget, Step, TableStrategy, WalkKind};
use crate::snmp::oid::{decode_mac_index, DecodeError};
use crate::snmp::BindingValue;

/// Forwarding-table strategy.
///
/// Rows on `skip_vlan` are ignored and the first row on an excluded port
/// ends the walk.
#[derive(Debug, Clone, Default)]
pub struct ForwardingTable {
    pub skip_vlan: Option<u32>,
}

impl ForwardingTable {
    pub fn new(skip_vlan: Option<u32>) -> Self {
        Self { skip_vlan }
    }
}

impl TableStrategy for ForwardingTable {
    type Row = ForwardingRow;

    const KIND: WalkKind = WalkKind::ForwardingTable;

    fn interpret(
        &self,
        target: &PollTarget,
        index: &[u32],
        value: &BindingValue,
    ) -> Result<Step<ForwardingRow>, DecodeError> {
        let port = match value {
            BindingValue::Integer(port) => {
                u32::try_from(*port).map_err(|_| DecodeError::UnexpectedValue {
                    expected: "port number",
                    value: port.to_string(),
                })?
            }
            other => {
                return Err(DecodeError::UnexpectedValue {
                    expected: "integer port",
                    value: other.to_string(),
                });
            }
        };

        let (vlan, mac) = decode_mac_index(index)?;

        if self.skip_vlan == Some(vlan) {
            return Ok(Step::Skip);
        }

        if target.excluded_ports.contains(&port) {
            tracing::debug!("{}: reached excluded port {}", target.address, port);
            return Ok(Step::EndOfTable);
        }

        Ok(Step::Row(ForwardingRow {
            switch: target.address.clone(),
            vlan,
            mac,
            port,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::oid::encode_mac_index;
    use crate::snmp::TableSession;
    use crate::walker::{walk, FDB_PORT_OID};
    use mac_address::MacAddress;

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
    }

    fn switch_table(entries: &[(u32, u8, i64)]) -> TableSession {
        let mut session = TableSession::new();
        for (vlan, last, port) in entries {
            let oid = encode_mac_index(FDB_PORT_OID, *vlan, &mac(*last));
            session
                .insert("10.0.0.1", &oid, BindingValue::Integer(*port))
                .unwrap();
        }
        session
    }

    #[tokio::test]
    async fn test_walk_collects_rows() {
        let session = switch_table(&[(10, 1, 3), (10, 2, 4), (20, 3, 7)]);
        let target = PollTarget::new("10.0.0.1", FDB_PORT_OID);

        let rows = walk(&session, &ForwardingTable::default(), &target).await.unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            ForwardingRow {
                switch: "10.0.0.1".to_string(),
                vlan: 10,
                mac: mac(1),
                port: 3,
            }
        );
        assert_eq!(rows[2].vlan, 20);
        assert_eq!(rows[2].port, 7);
    }

    #[tokio::test]
    async fn test_walk_stops_at_first_excluded_port() {
        let session = switch_table(&[(10, 1, 3), (10, 2, 49), (10, 3, 5), (20, 4, 49)]);
        let target = PollTarget::new("10.0.0.1", FDB_PORT_OID).with_excluded_ports([49]);

        let rows = walk(&session, &ForwardingTable::default(), &target).await.unwrap();

        assert_eq!(rows.iter().map(|r| r.port).collect::<Vec<_>>(), vec![3]);
        // Nothing is requested past the excluded row
        assert_eq!(session.request_count(), 2);
    }

    #[tokio::test]
    async fn test_walk_skips_sentinel_vlan() {
        let session = switch_table(&[(1, 1, 3), (10, 2, 4), (1, 3, 5)]);
        let target = PollTarget::new("10.0.0.1", FDB_PORT_OID);

        let rows = walk(&session, &ForwardingTable::new(Some(1)), &target).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows.iter().all(|r| r.vlan != 1));
        assert_eq!(rows[0].mac, mac(2));
    }

    #[test]
    fn test_rejects_non_integer_port() {
        let target = PollTarget::new("10.0.0.1", FDB_PORT_OID);
        let err = ForwardingTable::default()
            .interpret(&target, &[10, 1, 2, 3, 4, 5, 6], &BindingValue::Octets(vec![1]))
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedValue { .. }));

        let err = ForwardingTable::default()
            .interpret(&target, &[10, 1, 2, 3, 4, 5, 6], &BindingValue::Integer(-1))
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedValue { .. }));
    }
}
