use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(clippy::upper_case_acronyms)] // Protocol names are standardized
pub enum Protocol {
    TCP,
    UDP,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::TCP => write!(f, "TCP"),
            Protocol::UDP => write!(f, "UDP"),
        }
    }
}

/// Which way a packet travelled relative to the local host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Upload,
    Download,
}

/// Full identity of a flow, seen from the local side
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct FlowKey {
    pub protocol: Protocol,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
}

impl FlowKey {
    pub fn new(protocol: Protocol, local_addr: SocketAddr, remote_addr: SocketAddr) -> Self {
        Self {
            protocol,
            local_addr,
            remote_addr,
        }
    }

    /// The same flow with local and remote swapped
    pub fn reversed(&self) -> Self {
        Self {
            protocol: self.protocol,
            local_addr: self.remote_addr,
            remote_addr: self.local_addr,
        }
    }
}

/// Protocol plus local endpoint, without a peer
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct BoundKey {
    pub protocol: Protocol,
    pub local_addr: SocketAddr,
}

/// A decoded packet handed over by the capture thread.
///
/// `timestamp` is taken when the frame is read, so events arrive at the
/// aggregator in roughly non-decreasing timestamp order.
#[derive(Debug, Clone)]
pub struct PacketEvent {
    pub timestamp: Instant,
    pub protocol: Protocol,
    pub src_addr: SocketAddr,
    pub dst_addr: SocketAddr,
    pub len: u64,
}

impl PacketEvent {
    pub fn new(
        timestamp: Instant,
        protocol: Protocol,
        src_addr: SocketAddr,
        dst_addr: SocketAddr,
        len: u64,
    ) -> Self {
        Self {
            timestamp,
            protocol,
            src_addr,
            dst_addr,
            len,
        }
    }
}

/// Owner of a socket, or the bucket for traffic nobody could be found for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessId {
    Unknown,
    Pid(u32),
}

impl ProcessId {
    pub fn is_unknown(&self) -> bool {
        matches!(self, ProcessId::Unknown)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Unknown => write!(f, "?"),
            ProcessId::Pid(pid) => write!(f, "{}", pid),
        }
    }
}

/// Display name used for the unknown bucket
pub const UNKNOWN_PROCESS_NAME: &str = "(unknown)";
