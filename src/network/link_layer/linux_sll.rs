//! Linux "cooked" capture parsing
//!
//! Handles DLT_LINUX_SLL (113) and DLT_LINUX_SLL2 (276)
//! Used by the Linux "any" pseudo-interface

use super::IpPayload;

const SLL_HEADER_LEN: usize = 16;
const SLL2_HEADER_LEN: usize = 20;

/// Linux Cooked Capture v1 (16-byte header)
///
/// - Packet type (2 bytes)
/// - ARPHRD type (2 bytes)
/// - Link-layer address length (2 bytes)
/// - Link-layer address (8 bytes)
/// - Protocol type (2 bytes) - EtherType
pub fn sll_payload(data: &[u8]) -> Option<IpPayload<'_>> {
    if data.len() < SLL_HEADER_LEN {
        log::debug!("Linux SLL packet too small: {} bytes", data.len());
        return None;
    }

    let protocol = u16::from_be_bytes([data[14], data[15]]);
    IpPayload::from_ethertype(protocol, &data[SLL_HEADER_LEN..])
}

/// Linux Cooked Capture v2 (20-byte header)
///
/// - Protocol type (2 bytes) - EtherType
/// - Reserved (2 bytes)
/// - Interface index (4 bytes)
/// - ARPHRD type (2 bytes)
/// - Packet type (1 byte)
/// - Link-layer address length (1 byte)
/// - Link-layer address (8 bytes)
pub fn sll2_payload(data: &[u8]) -> Option<IpPayload<'_>> {
    if data.len() < SLL2_HEADER_LEN {
        log::debug!("Linux SLL2 packet too small: {} bytes", data.len());
        return None;
    }

    let protocol = u16::from_be_bytes([data[0], data[1]]);
    IpPayload::from_ethertype(protocol, &data[SLL2_HEADER_LEN..])
}
