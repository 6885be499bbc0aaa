//! Packet to process attribution.
//!
//! A captured packet may be seen from either side of the flow, while the OS
//! indexes sockets by their local endpoint. Attribution therefore tries the
//! flow as-is, then reversed, then whichever endpoint lives on this host,
//! before giving up and charging the packet to the unknown bucket.

use crate::network::connections::{ConnectionRecord, ConnectionSnapshot};
use crate::network::types::{Direction, FlowKey, PacketEvent, ProcessId, UNKNOWN_PROCESS_NAME};
use std::net::IpAddr;

/// Outcome of attributing one packet.
///
/// The name borrows from the snapshot so the hot path does not allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribution<'a> {
    pub process: ProcessId,
    pub name: &'a str,
    pub direction: Direction,
}

impl<'a> Attribution<'a> {
    fn from_record(record: &'a ConnectionRecord, direction: Direction) -> Self {
        Self {
            process: ProcessId::Pid(record.pid),
            name: &record.process_name,
            direction,
        }
    }

    fn unknown(direction: Direction) -> Self {
        Self {
            process: ProcessId::Unknown,
            name: UNKNOWN_PROCESS_NAME,
            direction,
        }
    }
}

/// Resolve the owning process and direction of `event`
pub fn attribute<'a>(event: &PacketEvent, snapshot: &'a ConnectionSnapshot) -> Attribution<'a> {
    let outgoing = FlowKey::new(event.protocol, event.src_addr, event.dst_addr);

    if let Some(record) = snapshot.lookup_flow(&outgoing) {
        return Attribution::from_record(record, Direction::Upload);
    }

    let incoming = outgoing.reversed();
    if let Some(record) = snapshot.lookup_flow(&incoming) {
        return Attribution::from_record(record, Direction::Download);
    }

    // Connectionless sockets and listeners only know their local endpoint.
    // A remote endpoint never matches them, whatever port it uses.
    if snapshot.is_local_ip(&event.src_addr.ip())
        && let Some(record) = snapshot.lookup_bound(event.protocol, event.src_addr)
    {
        return Attribution::from_record(record, Direction::Upload);
    }
    if receives_locally(snapshot, &event.dst_addr.ip())
        && let Some(record) = snapshot.lookup_bound(event.protocol, event.dst_addr)
    {
        return Attribution::from_record(record, Direction::Download);
    }

    let direction = if snapshot.is_local_ip(&event.src_addr.ip()) {
        Direction::Upload
    } else {
        Direction::Download
    };
    Attribution::unknown(direction)
}

/// Whether a packet sent to `ip` is delivered to sockets on this host.
///
/// Multicast and broadcast datagrams reach wildcard-bound sockets too.
fn receives_locally(snapshot: &ConnectionSnapshot, ip: &IpAddr) -> bool {
    if snapshot.is_local_ip(ip) || ip.is_multicast() {
        return true;
    }
    matches!(ip, IpAddr::V4(v4) if v4.is_broadcast())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::platform::SocketEntry;
    use crate::network::types::Protocol;
    use std::collections::HashSet;
    use std::time::Instant;

    fn snapshot() -> ConnectionSnapshot {
        let entries = vec![
            SocketEntry {
                protocol: Protocol::TCP,
                local_addr: "192.168.1.100:12345".parse().unwrap(),
                remote_addr: Some("8.8.8.8:443".parse().unwrap()),
                pid: 1234,
                process_name: "curl".to_string(),
            },
            SocketEntry {
                protocol: Protocol::UDP,
                local_addr: "0.0.0.0:5353".parse().unwrap(),
                remote_addr: None,
                pid: 55,
                process_name: "avahi".to_string(),
            },
            SocketEntry {
                protocol: Protocol::TCP,
                local_addr: "0.0.0.0:22".parse().unwrap(),
                remote_addr: None,
                pid: 1,
                process_name: "sshd".to_string(),
            },
        ];
        let mut local = HashSet::new();
        local.insert("192.168.1.100".parse().unwrap());
        ConnectionSnapshot::build(entries, &local)
    }

    fn event(protocol: Protocol, src: &str, dst: &str) -> PacketEvent {
        PacketEvent::new(
            Instant::now(),
            protocol,
            src.parse().unwrap(),
            dst.parse().unwrap(),
            100,
        )
    }

    #[test]
    fn test_outgoing_exact_match_is_upload() {
        let snap = snapshot();
        let result = attribute(
            &event(Protocol::TCP, "192.168.1.100:12345", "8.8.8.8:443"),
            &snap,
        );
        assert_eq!(result.process, ProcessId::Pid(1234));
        assert_eq!(result.name, "curl");
        assert_eq!(result.direction, Direction::Upload);
    }

    #[test]
    fn test_incoming_reversed_match_is_download() {
        let snap = snapshot();
        let result = attribute(
            &event(Protocol::TCP, "8.8.8.8:443", "192.168.1.100:12345"),
            &snap,
        );
        assert_eq!(result.process, ProcessId::Pid(1234));
        assert_eq!(result.direction, Direction::Download);
    }

    #[test]
    fn test_udp_bound_socket_both_directions() {
        let snap = snapshot();

        let out = attribute(
            &event(Protocol::UDP, "192.168.1.100:5353", "224.0.0.251:5353"),
            &snap,
        );
        assert_eq!(out.process, ProcessId::Pid(55));
        assert_eq!(out.direction, Direction::Upload);

        let inbound = attribute(
            &event(Protocol::UDP, "192.168.1.7:40000", "192.168.1.100:5353"),
            &snap,
        );
        assert_eq!(inbound.process, ProcessId::Pid(55));
        assert_eq!(inbound.direction, Direction::Download);
    }

    #[test]
    fn test_tcp_listener_fallback() {
        let snap = snapshot();
        let result = attribute(
            &event(Protocol::TCP, "10.1.1.1:50000", "192.168.1.100:22"),
            &snap,
        );
        assert_eq!(result.process, ProcessId::Pid(1));
        assert_eq!(result.direction, Direction::Download);
    }

    #[test]
    fn test_unmatched_goes_to_unknown() {
        let snap = snapshot();

        let up = attribute(
            &event(Protocol::TCP, "192.168.1.100:40000", "1.1.1.1:443"),
            &snap,
        );
        assert_eq!(up.process, ProcessId::Unknown);
        assert_eq!(up.name, UNKNOWN_PROCESS_NAME);
        assert_eq!(up.direction, Direction::Upload);

        let down = attribute(
            &event(Protocol::TCP, "1.1.1.1:443", "192.168.1.100:40000"),
            &snap,
        );
        assert_eq!(down.process, ProcessId::Unknown);
        assert_eq!(down.direction, Direction::Download);
    }

    #[test]
    fn test_protocol_must_match() {
        let snap = snapshot();
        let result = attribute(
            &event(Protocol::UDP, "192.168.1.100:12345", "8.8.8.8:443"),
            &snap,
        );
        assert_eq!(result.process, ProcessId::Unknown);
    }

    fn listener(protocol: Protocol, local: &str, pid: u32, name: &str) -> SocketEntry {
        SocketEntry {
            protocol,
            local_addr: local.parse().unwrap(),
            remote_addr: None,
            pid,
            process_name: name.to_string(),
        }
    }

    /// Local servers bound to well-known ports that remote peers also use
    fn server_snapshot() -> ConnectionSnapshot {
        let entries = vec![
            listener(Protocol::UDP, "0.0.0.0:53", 10, "dnsmasq"),
            listener(Protocol::UDP, "0.0.0.0:40000", 20, "resolver"),
            listener(Protocol::TCP, "0.0.0.0:443", 30, "nginx"),
        ];
        let mut local = HashSet::new();
        local.insert("192.168.1.100".parse().unwrap());
        ConnectionSnapshot::build(entries, &local)
    }

    #[test]
    fn test_remote_port_does_not_match_local_udp_listener() {
        let snap = server_snapshot();
        let reply = attribute(
            &event(Protocol::UDP, "8.8.8.8:53", "192.168.1.100:40000"),
            &snap,
        );
        assert_eq!(reply.process, ProcessId::Pid(20));
        assert_eq!(reply.name, "resolver");
        assert_eq!(reply.direction, Direction::Download);

        let query = attribute(
            &event(Protocol::UDP, "192.168.1.100:40000", "8.8.8.8:53"),
            &snap,
        );
        assert_eq!(query.process, ProcessId::Pid(20));
        assert_eq!(query.direction, Direction::Upload);
    }

    #[test]
    fn test_remote_port_does_not_match_local_tcp_listener() {
        let snap = server_snapshot();

        // New outgoing connection the table has not picked up yet
        let response = attribute(
            &event(Protocol::TCP, "1.1.1.1:443", "192.168.1.100:50001"),
            &snap,
        );
        assert_eq!(response.process, ProcessId::Unknown);
        assert_eq!(response.direction, Direction::Download);

        let request = attribute(
            &event(Protocol::TCP, "192.168.1.100:50001", "1.1.1.1:443"),
            &snap,
        );
        assert_eq!(request.process, ProcessId::Unknown);
        assert_eq!(request.direction, Direction::Upload);

        // A real inbound client of the local server still reaches it
        let inbound = attribute(
            &event(Protocol::TCP, "203.0.113.9:61000", "192.168.1.100:443"),
            &snap,
        );
        assert_eq!(inbound.process, ProcessId::Pid(30));
        assert_eq!(inbound.direction, Direction::Download);
    }

    #[test]
    fn test_multicast_reaches_wildcard_socket() {
        let snap = snapshot();
        let result = attribute(
            &event(Protocol::UDP, "192.168.1.7:5353", "224.0.0.251:5353"),
            &snap,
        );
        assert_eq!(result.process, ProcessId::Pid(55));
        assert_eq!(result.direction, Direction::Download);
    }

    #[test]
    fn test_loopback_is_local() {
        let snap = snapshot();
        let result = attribute(
            &event(Protocol::UDP, "127.0.0.1:41000", "127.0.0.1:5353"),
            &snap,
        );
        assert_eq!(result.process, ProcessId::Pid(55));
        assert_eq!(result.direction, Direction::Download);
    }
}
