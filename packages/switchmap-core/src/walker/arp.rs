//! Address-resolution table (ipNetToMediaPhysAddress) interpretation

use super::{ArpRow, PollTarget, Step, TableStrategy, WalkKind};
use crate::snmp::oid::{decode_ip_index, mac_from_octets, DecodeError};
use crate::snmp::BindingValue;

/// Address-resolution strategy. Incomplete entries (all-zero MAC) are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressResolution;

impl TableStrategy for AddressResolution {
    type Row = ArpRow;

    const KIND: WalkKind = WalkKind::AddressResolution;

    fn interpret(
        &self,
        _target: &PollTarget,
        index: &[u32],
        value: &BindingValue,
    ) -> Result<Step<ArpRow>, DecodeError> {
        let (vlan, ip) = decode_ip_index(index)?;

        let mac = match value {
            BindingValue::Octets(bytes) => mac_from_octets(bytes)?,
            other => {
                return Err(DecodeError::UnexpectedValue {
                    expected: "physical address",
                    value: other.to_string(),
                });
            }
        };

        if mac.bytes() == [0u8; 6] {
            return Ok(Step::Skip);
        }

        Ok(Step::Row(ArpRow { vlan, mac, ip }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::oid::encode_ip_index;
    use crate::snmp::TableSession;
    use crate::walker::{walk, WalkError, ARP_PHYS_ADDRESS_OID};
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_walk_arp_table() {
        let session = TableSession::new()
            .with_row(
                "10.0.0.254",
                &encode_ip_index(ARP_PHYS_ADDRESS_OID, 10, Ipv4Addr::new(10, 0, 0, 50)),
                BindingValue::Octets(vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]),
            )
            .with_row(
                "10.0.0.254",
                &encode_ip_index(ARP_PHYS_ADDRESS_OID, 10, Ipv4Addr::new(10, 0, 0, 51)),
                BindingValue::Octets(vec![0; 6]),
            )
            .with_row(
                "10.0.0.254",
                "1.3.6.1.2.1.4.22.1.3.10.10.0.0.50",
                BindingValue::Octets(vec![10, 0, 0, 50]),
            );

        let target = PollTarget::new("10.0.0.254", ARP_PHYS_ADDRESS_OID);
        let rows = walk(&session, &AddressResolution, &target).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].vlan, 10);
        assert_eq!(rows[0].ip, Ipv4Addr::new(10, 0, 0, 50));
        assert_eq!(rows[0].mac.to_string(), "AA:BB:CC:DD:EE:01");
    }

    #[tokio::test]
    async fn test_malformed_row_fails_walk() {
        let session = TableSession::new().with_row(
            "10.0.0.254",
            "1.3.6.1.2.1.4.22.1.2.10.10.0.50",
            BindingValue::Octets(vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]),
        );

        let target = PollTarget::new("10.0.0.254", ARP_PHYS_ADDRESS_OID);
        let err = walk(&session, &AddressResolution, &target).await.unwrap_err();
        assert!(matches!(err, WalkError::Decode { .. }));
    }
}
