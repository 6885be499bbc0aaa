// network/parser.rs - Frame to PacketEvent decoding
use crate::network::link_layer::{IpPayload, LinkLayerType};
use crate::network::types::{PacketEvent, Protocol};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Instant;

const IP_PROTO_TCP: u8 = 6;
const IP_PROTO_UDP: u8 = 17;

/// Addresses and protocol of one decoded IP packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    pub protocol: Protocol,
    pub src_addr: SocketAddr,
    pub dst_addr: SocketAddr,
}

/// Packet parser - stateless, thread-safe
#[derive(Debug, Clone, Copy)]
pub struct PacketParser {
    link_type: LinkLayerType,
}

impl PacketParser {
    /// Parser for frames of the given pcap datalink type
    pub fn new(datalink: i32) -> Self {
        Self {
            link_type: LinkLayerType::from_dlt(datalink),
        }
    }

    pub fn link_type(&self) -> LinkLayerType {
        self.link_type
    }

    /// Decode a captured frame into a PacketEvent.
    ///
    /// `wire_len` is the original frame length, which may exceed `data.len()`
    /// when the capture truncates at the snapshot length. Returns `None` for
    /// frames that are not TCP or UDP over IP, or are malformed.
    pub fn parse(&self, data: &[u8], wire_len: u32, timestamp: Instant) -> Option<PacketEvent> {
        let header = self.parse_headers(data)?;
        Some(PacketEvent::new(
            timestamp,
            header.protocol,
            header.src_addr,
            header.dst_addr,
            u64::from(wire_len),
        ))
    }

    /// Link, network and transport headers only
    pub fn parse_headers(&self, data: &[u8]) -> Option<TransportHeader> {
        match self.link_type.payload(data)? {
            IpPayload::V4(ip_data) => parse_ipv4(ip_data),
            IpPayload::V6(ip_data) => parse_ipv6(ip_data),
        }
    }
}

fn parse_ipv4(ip_data: &[u8]) -> Option<TransportHeader> {
    if ip_data.len() < 20 {
        return None;
    }

    let version = ip_data[0] >> 4;
    if version != 4 {
        return None;
    }

    let ihl = ip_data[0] & 0x0F;
    let ip_header_len = (ihl as usize) * 4;
    if ip_header_len < 20 || ip_data.len() < ip_header_len {
        return None;
    }

    // Only the first fragment carries the transport header
    let fragment_offset = u16::from_be_bytes([ip_data[6], ip_data[7]]) & 0x1FFF;
    if fragment_offset != 0 {
        log::trace!("IPv4: skipping non-initial fragment");
        return None;
    }

    let protocol_num = ip_data[9];
    let src_ip = IpAddr::V4(Ipv4Addr::new(
        ip_data[12],
        ip_data[13],
        ip_data[14],
        ip_data[15],
    ));
    let dst_ip = IpAddr::V4(Ipv4Addr::new(
        ip_data[16],
        ip_data[17],
        ip_data[18],
        ip_data[19],
    ));

    parse_transport(protocol_num, &ip_data[ip_header_len..], src_ip, dst_ip)
}

fn parse_ipv6(ip_data: &[u8]) -> Option<TransportHeader> {
    if ip_data.len() < 40 {
        return None;
    }

    let version = ip_data[0] >> 4;
    if version != 6 {
        return None;
    }

    let src_ip = IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(&ip_data[8..24]).ok()?));
    let dst_ip = IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(&ip_data[24..40]).ok()?));

    let (next_header, offset) = skip_ipv6_extension_headers(ip_data[6], &ip_data[40..])?;
    let transport_data = ip_data[40..].get(offset..)?;

    parse_transport(next_header, transport_data, src_ip, dst_ip)
}

/// Walk the IPv6 extension header chain.
///
/// Returns the upper-layer protocol and its offset, or `None` for
/// non-initial fragments and truncated chains.
fn skip_ipv6_extension_headers(mut next_header: u8, data: &[u8]) -> Option<(u8, usize)> {
    const HOP_BY_HOP: u8 = 0;
    const ROUTING: u8 = 43;
    const FRAGMENT: u8 = 44;
    const AUTHENTICATION: u8 = 51;
    const DESTINATION_OPTIONS: u8 = 60;

    let mut offset = 0;
    loop {
        match next_header {
            HOP_BY_HOP | ROUTING | DESTINATION_OPTIONS => {
                let header = data.get(offset..offset + 2)?;
                next_header = header[0];
                offset += (header[1] as usize + 1) * 8;
            }
            FRAGMENT => {
                let header = data.get(offset..offset + 8)?;
                let fragment_offset = u16::from_be_bytes([header[2], header[3]]) >> 3;
                if fragment_offset != 0 {
                    return None;
                }
                next_header = header[0];
                offset += 8;
            }
            AUTHENTICATION => {
                let header = data.get(offset..offset + 2)?;
                next_header = header[0];
                offset += (header[1] as usize + 2) * 4;
            }
            _ => return Some((next_header, offset)),
        }
    }
}

fn parse_transport(
    protocol_num: u8,
    transport_data: &[u8],
    src_ip: IpAddr,
    dst_ip: IpAddr,
) -> Option<TransportHeader> {
    let (protocol, min_len) = match protocol_num {
        IP_PROTO_TCP => (Protocol::TCP, 20),
        IP_PROTO_UDP => (Protocol::UDP, 8),
        _ => return None,
    };

    if transport_data.len() < min_len {
        log::trace!(
            "{} header truncated: {} bytes",
            protocol,
            transport_data.len()
        );
        return None;
    }

    let src_port = u16::from_be_bytes([transport_data[0], transport_data[1]]);
    let dst_port = u16::from_be_bytes([transport_data[2], transport_data[3]]);

    Some(TransportHeader {
        protocol,
        src_addr: SocketAddr::new(src_ip, src_port),
        dst_addr: SocketAddr::new(dst_ip, dst_port),
    })
}
