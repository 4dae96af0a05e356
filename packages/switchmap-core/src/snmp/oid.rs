//! OID codec for table row indexes.
//!
//! A table row is addressed as `<table root>.<index>`. For the bridge
//! forwarding table the index is `<vlan>.<6 MAC octets>`, for the
//! address-resolution table it is `<vlan>.<4 IPv4 octets>`.

use mac_address::MacAddress;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors raised while decoding OIDs and binding values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The OID does not belong to the table being walked
    #[error("OID {oid} is outside table {root}")]
    OutsideTable { oid: String, root: String },

    /// An OID component is not an unsigned integer
    #[error("OID {oid} has an invalid component '{component}'")]
    InvalidComponent { oid: String, component: String },

    /// The index has the wrong number of elements or an octet above 255
    #[error("Index {index:?} does not encode a VLAN followed by {octets} octets")]
    UnexpectedShape { index: Vec<u32>, octets: usize },

    /// The bound value has the wrong type for the table
    #[error("Expected {expected} value, got {value}")]
    UnexpectedValue { expected: &'static str, value: String },
}

/// Check whether `oid` lies strictly inside the subtree rooted at `root`.
///
/// Component-aware: `1.3.6.1.20` is not inside `1.3.6.1.2`.
pub fn is_within(oid: &str, root: &str) -> bool {
    oid.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|rest| !rest.is_empty())
}

/// Strip the `root.` prefix from `oid` and return the remaining components.
pub fn decode(oid: &str, root: &str) -> Result<Vec<u32>, DecodeError> {
    let tail = oid
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| DecodeError::OutsideTable {
            oid: oid.to_string(),
            root: root.to_string(),
        })?;

    split_components(oid, tail)
}

/// Parse a dotted OID into its numeric components. A leading dot is accepted.
pub fn parse_components(oid: &str) -> Result<Vec<u32>, DecodeError> {
    let trimmed = oid.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return Err(DecodeError::InvalidComponent {
            oid: oid.to_string(),
            component: String::new(),
        });
    }
    split_components(oid, trimmed)
}

fn split_components(oid: &str, dotted: &str) -> Result<Vec<u32>, DecodeError> {
    dotted
        .split('.')
        .map(|component| {
            component
                .parse::<u32>()
                .map_err(|_| DecodeError::InvalidComponent {
                    oid: oid.to_string(),
                    component: component.to_string(),
                })
        })
        .collect()
}

fn octets<const N: usize>(index: &[u32]) -> Result<(u32, [u8; N]), DecodeError> {
    let shape_error = || DecodeError::UnexpectedShape {
        index: index.to_vec(),
        octets: N,
    };

    let (vlan, rest) = index.split_first().ok_or_else(shape_error)?;
    if rest.len() != N {
        return Err(shape_error());
    }

    let mut out = [0u8; N];
    for (slot, value) in out.iter_mut().zip(rest) {
        *slot = u8::try_from(*value).map_err(|_| shape_error())?;
    }
    Ok((*vlan, out))
}

/// Interpret a decoded index as `(vlan, mac)`.
pub fn decode_mac_index(index: &[u32]) -> Result<(u32, MacAddress), DecodeError> {
    let (vlan, bytes) = octets::<6>(index)?;
    Ok((vlan, MacAddress::new(bytes)))
}

/// Interpret a decoded index as `(vlan, ipv4)`.
pub fn decode_ip_index(index: &[u32]) -> Result<(u32, Ipv4Addr), DecodeError> {
    let (vlan, bytes) = octets::<4>(index)?;
    Ok((vlan, Ipv4Addr::from(bytes)))
}

/// Build a MAC from a physical-address octet string.
pub fn mac_from_octets(bytes: &[u8]) -> Result<MacAddress, DecodeError> {
    let array: [u8; 6] = bytes
        .try_into()
        .map_err(|_| DecodeError::UnexpectedValue {
            expected: "6-octet physical address",
            value: format!("{} octets", bytes.len()),
        })?;
    Ok(MacAddress::new(array))
}

/// Build the row OID for a forwarding-table entry.
pub fn encode_mac_index(root: &str, vlan: u32, mac: &MacAddress) -> String {
    let mut oid = format!("{}.{}", root, vlan);
    for octet in mac.bytes() {
        oid.push_str(&format!(".{}", octet));
    }
    oid
}

/// Build the row OID for an address-resolution entry.
pub fn encode_ip_index(root: &str, vlan: u32, ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{}.{}.{}.{}.{}.{}", root, vlan, a, b, c, d)
}
