//! Ethernet (IEEE 802.3) frame parsing
//!
//! 14-byte header, optionally followed by one or more 4-byte VLAN tags

use super::{IpPayload, ethertype};

const HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;

/// Extract the IP payload of an Ethernet frame
///
/// Ethernet frame format (14 bytes):
/// - Destination MAC (6 bytes)
/// - Source MAC (6 bytes)
/// - EtherType (2 bytes), or a VLAN TPID followed by TCI + inner EtherType
pub fn payload(data: &[u8]) -> Option<IpPayload<'_>> {
    if data.len() < HEADER_LEN {
        log::debug!("Ethernet frame too small: {} bytes", data.len());
        return None;
    }

    let mut offset = 12;
    let mut ether_type = u16::from_be_bytes([data[offset], data[offset + 1]]);

    while matches!(ether_type, ethertype::VLAN | ethertype::QINQ) {
        offset += VLAN_TAG_LEN;
        if data.len() < offset + 2 {
            log::debug!("Ethernet: truncated VLAN tag");
            return None;
        }
        ether_type = u16::from_be_bytes([data[offset], data[offset + 1]]);
    }

    let result = IpPayload::from_ethertype(ether_type, &data[offset + 2..]);
    if result.is_none() {
        log::trace!("Ethernet: skipping EtherType 0x{:04x}", ether_type);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ethertypes: &[u16], payload_bytes: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; 12];
        for (i, et) in ethertypes.iter().enumerate() {
            data.extend_from_slice(&et.to_be_bytes());
            if i + 1 < ethertypes.len() {
                data.extend_from_slice(&[0x00, 0x64]); // TCI, VLAN 100
            }
        }
        data.extend_from_slice(payload_bytes);
        data
    }

    #[test]
    fn test_ethernet_frame_too_small() {
        let small_frame = vec![0x00, 0x11, 0x22];
        assert!(payload(&small_frame).is_none());
    }

    #[test]
    fn test_plain_ipv4() {
        let data = frame(&[ethertype::IPV4], &[0x45, 0xAA]);
        assert_eq!(payload(&data), Some(IpPayload::V4(&[0x45, 0xAA])));
    }

    #[test]
    fn test_vlan_tagged_ipv6() {
        let data = frame(&[ethertype::VLAN, ethertype::IPV6], &[0x60, 0x01]);
        assert_eq!(payload(&data), Some(IpPayload::V6(&[0x60, 0x01])));
    }

    #[test]
    fn test_double_tagged() {
        let data = frame(
            &[ethertype::QINQ, ethertype::VLAN, ethertype::IPV4],
            &[0x45],
        );
        assert_eq!(payload(&data), Some(IpPayload::V4(&[0x45])));
    }

    #[test]
    fn test_arp_is_skipped() {
        let data = frame(&[0x0806], &[0x00, 0x01]);
        assert!(payload(&data).is_none());
    }
}
