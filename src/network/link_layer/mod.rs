//! Link layer (Layer 2) frame decoding
//!
//! Strips the data-link header and hands back the network-layer payload:
//! - Ethernet, including 802.1Q/802.1ad VLAN tags (DLT_EN10MB)
//! - Linux Cooked Capture v1 and v2 (DLT_LINUX_SLL, DLT_LINUX_SLL2)
//! - Raw IP and BSD loopback (DLT_RAW, DLT_NULL, DLT_LOOP, LINKTYPE_IPV4/6)

pub mod ethernet;
pub mod linux_sll;
pub mod raw_ip;

/// Data Link Type (DLT) constants
/// These match the values from libpcap
pub mod dlt {
    pub const NULL: i32 = 0; // BSD loopback, host byte order family
    pub const EN10MB: i32 = 1; // Ethernet
    pub const RAW: i32 = 12; // Raw IP (no link layer)
    pub const RAW_OPENBSD: i32 = 14; // Raw IP on OpenBSD
    pub const LOOP: i32 = 108; // OpenBSD loopback, network byte order family
    pub const LINUX_SLL: i32 = 113; // Linux "cooked" capture v1
    pub const LINUX_SLL2: i32 = 276; // Linux "cooked" capture v2

    // Link type values for raw IP packets
    pub const LINKTYPE_RAW: i32 = 101; // Raw IPv4/IPv6
    pub const LINKTYPE_IPV4: i32 = 228; // Raw IPv4 only
    pub const LINKTYPE_IPV6: i32 = 229; // Raw IPv6 only
}

/// EtherType values we follow
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const IPV6: u16 = 0x86dd;
    pub const VLAN: u16 = 0x8100;
    pub const QINQ: u16 = 0x88a8;
}

/// Network-layer payload extracted from a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpPayload<'a> {
    V4(&'a [u8]),
    V6(&'a [u8]),
}

impl<'a> IpPayload<'a> {
    /// Classify by EtherType
    pub fn from_ethertype(ethertype: u16, data: &'a [u8]) -> Option<Self> {
        match ethertype {
            ethertype::IPV4 => Some(IpPayload::V4(data)),
            ethertype::IPV6 => Some(IpPayload::V6(data)),
            _ => None,
        }
    }

    /// Classify by the version nibble of the first byte
    pub fn from_version_nibble(data: &'a [u8]) -> Option<Self> {
        match data.first()? >> 4 {
            4 => Some(IpPayload::V4(data)),
            6 => Some(IpPayload::V6(data)),
            _ => None,
        }
    }
}

/// Link layer type enum for identifying capture formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayerType {
    Ethernet,
    RawIP,
    Loopback,
    LinuxSLL,
    LinuxSLL2,
    Unknown,
}

impl LinkLayerType {
    /// Determine link layer type from DLT value
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            dlt::EN10MB => LinkLayerType::Ethernet,
            dlt::RAW
            | dlt::RAW_OPENBSD
            | dlt::LINKTYPE_RAW
            | dlt::LINKTYPE_IPV4
            | dlt::LINKTYPE_IPV6 => LinkLayerType::RawIP,
            dlt::NULL | dlt::LOOP => LinkLayerType::Loopback,
            dlt::LINUX_SLL => LinkLayerType::LinuxSLL,
            dlt::LINUX_SLL2 => LinkLayerType::LinuxSLL2,
            _ => LinkLayerType::Unknown,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, LinkLayerType::Unknown)
    }

    /// Strip the link-layer header from `data`
    pub fn payload<'a>(&self, data: &'a [u8]) -> Option<IpPayload<'a>> {
        match self {
            LinkLayerType::Ethernet => ethernet::payload(data),
            LinkLayerType::RawIP => raw_ip::payload(data),
            LinkLayerType::Loopback => raw_ip::loopback_payload(data),
            LinkLayerType::LinuxSLL => linux_sll::sll_payload(data),
            LinkLayerType::LinuxSLL2 => linux_sll::sll2_payload(data),
            LinkLayerType::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linktype_from_dlt() {
        assert_eq!(
            LinkLayerType::from_dlt(dlt::EN10MB),
            LinkLayerType::Ethernet
        );
        assert_eq!(LinkLayerType::from_dlt(dlt::RAW), LinkLayerType::RawIP);
        assert_eq!(
            LinkLayerType::from_dlt(dlt::LINKTYPE_IPV6),
            LinkLayerType::RawIP
        );
        assert_eq!(LinkLayerType::from_dlt(dlt::NULL), LinkLayerType::Loopback);
        assert_eq!(LinkLayerType::from_dlt(dlt::LOOP), LinkLayerType::Loopback);
        assert_eq!(
            LinkLayerType::from_dlt(dlt::LINUX_SLL),
            LinkLayerType::LinuxSLL
        );
        assert_eq!(
            LinkLayerType::from_dlt(dlt::LINUX_SLL2),
            LinkLayerType::LinuxSLL2
        );
        assert_eq!(LinkLayerType::from_dlt(999), LinkLayerType::Unknown);
        assert!(!LinkLayerType::Unknown.is_supported());
    }

    #[test]
    fn test_payload_from_version_nibble() {
        assert!(matches!(
            IpPayload::from_version_nibble(&[0x45, 0x00]),
            Some(IpPayload::V4(_))
        ));
        assert!(matches!(
            IpPayload::from_version_nibble(&[0x60, 0x00]),
            Some(IpPayload::V6(_))
        ));
        assert!(IpPayload::from_version_nibble(&[0x20]).is_none());
        assert!(IpPayload::from_version_nibble(&[]).is_none());
    }
}
