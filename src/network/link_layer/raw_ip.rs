//! Raw IP and loopback framing
//!
//! Raw IP (TUN devices, DLT_RAW) carries no link-layer header; the first
//! nibble holds the IP version. BSD loopback prefixes a 4-byte address family.

use super::IpPayload;

const LOOPBACK_HEADER_LEN: usize = 4;

// AF_INET is 2 everywhere; AF_INET6 differs per BSD
const AF_INET: u32 = 2;
const AF_INET6: [u32; 4] = [10, 24, 28, 30];

/// Raw IP packet, version detected from the first nibble
pub fn payload(data: &[u8]) -> Option<IpPayload<'_>> {
    let result = IpPayload::from_version_nibble(data);
    if result.is_none() {
        log::debug!("Raw IP: unrecognised packet of {} bytes", data.len());
    }
    result
}

/// BSD loopback (DLT_NULL / DLT_LOOP)
///
/// The family field is in host byte order for DLT_NULL and network order for
/// DLT_LOOP, so both readings are accepted.
pub fn loopback_payload(data: &[u8]) -> Option<IpPayload<'_>> {
    if data.len() < LOOPBACK_HEADER_LEN {
        log::debug!("Loopback packet too small: {} bytes", data.len());
        return None;
    }

    let header = [data[0], data[1], data[2], data[3]];
    let inner = &data[LOOPBACK_HEADER_LEN..];
    let families = [u32::from_le_bytes(header), u32::from_be_bytes(header)];

    if families.contains(&AF_INET) {
        return Some(IpPayload::V4(inner));
    }
    if families.iter().any(|f| AF_INET6.contains(f)) {
        return Some(IpPayload::V6(inner));
    }

    // Unknown family; trust the IP header instead
    IpPayload::from_version_nibble(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_ipv4_and_ipv6() {
        assert!(matches!(payload(&[0x45, 0x00]), Some(IpPayload::V4(_))));
        assert!(matches!(payload(&[0x60, 0x00]), Some(IpPayload::V6(_))));
        assert!(payload(&[]).is_none());
    }

    #[test]
    fn test_loopback_host_order() {
        let data = [2, 0, 0, 0, 0x45, 0x00];
        assert_eq!(loopback_payload(&data), Some(IpPayload::V4(&[0x45, 0x00])));
    }

    #[test]
    fn test_loopback_network_order_ipv6() {
        let data = [0, 0, 0, 30, 0x60];
        assert_eq!(loopback_payload(&data), Some(IpPayload::V6(&[0x60])));
    }

    #[test]
    fn test_loopback_too_small() {
        assert!(loopback_payload(&[2, 0]).is_none());
    }
}
