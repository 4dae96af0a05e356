//! Vendor lookup from the IEEE OUI registry

/// Manufacturer registered for the OUI of `mac` (`XX:XX:XX:XX:XX:XX`).
///
/// Locally administered addresses are never looked up: their first three
/// octets are not an assignment.
pub fn lookup_vendor(mac: &str) -> Option<String> {
    if is_locally_administered(mac) {
        tracing::debug!("OUI lookup for {}: locally administered, skipped", mac);
        return None;
    }

    match oui_data::lookup(mac) {
        Some(record) => {
            let vendor = record.organization().to_string();
            tracing::debug!("OUI lookup for {}: {}", mac, vendor);
            Some(vendor)
        }
        None => {
            tracing::debug!("OUI lookup for {}: not found", mac);
            None
        }
    }
}

/// Second-least-significant bit of the first octet
fn is_locally_administered(mac: &str) -> bool {
    mac.get(0..2)
        .and_then(|octet| u8::from_str_radix(octet, 16).ok())
        .map(|octet| octet & 0x02 != 0)
        .unwrap_or(false)
}
