//! Connection table: which process owns which socket.
//!
//! The table is rebuilt from the OS on a fixed interval. Each rebuild produces
//! a new immutable [`ConnectionSnapshot`] that is published through an
//! [`ArcSwap`], so readers never lock against the refresh thread and always
//! see either the old or the new snapshot in full.

use anyhow::Result;
use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::network::platform::{SocketEntry, SocketEnumerator};
use crate::network::types::{BoundKey, FlowKey, Protocol};

/// A socket and the process that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub protocol: Protocol,
    pub local_addr: SocketAddr,
    pub remote_addr: Option<SocketAddr>,
    pub pid: u32,
    pub process_name: String,
}

impl From<SocketEntry> for ConnectionRecord {
    fn from(entry: SocketEntry) -> Self {
        Self {
            protocol: entry.protocol,
            local_addr: entry.local_addr,
            remote_addr: entry.remote_addr,
            pid: entry.pid,
            process_name: entry.process_name,
        }
    }
}

/// Immutable point-in-time view of the OS socket table
#[derive(Debug, Default)]
pub struct ConnectionSnapshot {
    flows: HashMap<FlowKey, ConnectionRecord>,
    bound: HashMap<BoundKey, ConnectionRecord>,
    local_ips: HashSet<IpAddr>,
}

impl ConnectionSnapshot {
    /// Build a snapshot from enumerated sockets.
    ///
    /// Duplicate keys resolve to the last entry seen.
    pub fn build(
        sockets: impl IntoIterator<Item = SocketEntry>,
        extra_local_ips: &HashSet<IpAddr>,
    ) -> Self {
        let mut flows = HashMap::new();
        let mut bound = HashMap::new();
        let mut local_ips = extra_local_ips.clone();

        for entry in sockets {
            let record = ConnectionRecord::from(entry);

            if !record.local_addr.ip().is_unspecified() {
                local_ips.insert(record.local_addr.ip());
            }

            let bound_key = BoundKey {
                protocol: record.protocol,
                local_addr: record.local_addr,
            };

            match record.remote_addr {
                Some(remote) if !remote.ip().is_unspecified() => {
                    let key = FlowKey::new(record.protocol, record.local_addr, remote);
                    // Connected UDP sockets still receive on their local port
                    if record.protocol == Protocol::UDP {
                        bound.insert(bound_key, record.clone());
                    }
                    flows.insert(key, record);
                }
                _ => {
                    bound.insert(bound_key, record);
                }
            }
        }

        Self {
            flows,
            bound,
            local_ips,
        }
    }

    /// Look up a flow: exact key first, then the local endpoint for UDP
    pub fn lookup(&self, key: &FlowKey) -> Option<&ConnectionRecord> {
        self.flows.get(key).or_else(|| match key.protocol {
            Protocol::UDP => self.lookup_bound(key.protocol, key.local_addr),
            Protocol::TCP => None,
        })
    }

    /// Exact flow match only
    pub fn lookup_flow(&self, key: &FlowKey) -> Option<&ConnectionRecord> {
        self.flows.get(key)
    }

    /// Match on protocol and local endpoint, falling back to a socket bound
    /// to the unspecified address on the same port.
    ///
    /// IPv4 endpoints also match a dual-stack `[::]` socket.
    pub fn lookup_bound(&self, protocol: Protocol, local_addr: SocketAddr) -> Option<&ConnectionRecord> {
        let get = |ip: IpAddr| {
            self.bound.get(&BoundKey {
                protocol,
                local_addr: SocketAddr::new(ip, local_addr.port()),
            })
        };

        if let Some(record) = get(local_addr.ip()) {
            return Some(record);
        }

        match local_addr.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => get(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
                .or_else(|| get(IpAddr::V6(Ipv6Addr::UNSPECIFIED))),
            IpAddr::V4(_) => get(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
            IpAddr::V6(ip) if !ip.is_unspecified() => get(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
            IpAddr::V6(_) => None,
        }
    }

    /// Whether an IP belongs to this host (loopback always does)
    pub fn is_local_ip(&self, ip: &IpAddr) -> bool {
        ip.is_loopback() || self.local_ips.contains(ip)
    }

    /// Number of distinct lookup keys
    pub fn len(&self) -> usize {
        self.flows.len() + self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty() && self.bound.is_empty()
    }
}

/// Refresh bookkeeping exposed to the display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub refreshes: u64,
    pub failures: u64,
    pub records: usize,
}

pub struct ConnectionTable {
    current: ArcSwap<ConnectionSnapshot>,
    enumerator: Box<dyn SocketEnumerator>,
    local_ips: HashSet<IpAddr>,
    refreshes: AtomicU64,
    failures: AtomicU64,
}

impl ConnectionTable {
    /// Create a table with an empty snapshot.
    ///
    /// `local_ips` are interface addresses known up front; addresses of
    /// enumerated sockets are added on every refresh.
    pub fn new(enumerator: Box<dyn SocketEnumerator>, local_ips: HashSet<IpAddr>) -> Self {
        let initial = ConnectionSnapshot::build(Vec::new(), &local_ips);
        Self {
            current: ArcSwap::from_pointee(initial),
            enumerator,
            local_ips,
            refreshes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Query the OS and publish a new snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub fn refresh(&self) -> Result<()> {
        let started = Instant::now();
        match self.enumerator.enumerate() {
            Ok(sockets) => {
                let snapshot = ConnectionSnapshot::build(sockets, &self.local_ips);
                let records = snapshot.len();
                self.current.store(Arc::new(snapshot));
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Connection table refreshed via {}: {} keys in {:?}",
                    self.enumerator.name(),
                    records,
                    started.elapsed()
                );
                Ok(())
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Connection table refresh via {} failed ({} failures so far): {}",
                    self.enumerator.name(),
                    failures,
                    e
                );
                Err(e)
            }
        }
    }

    /// Current snapshot; holding it keeps it alive across later refreshes
    pub fn snapshot(&self) -> Arc<ConnectionSnapshot> {
        self.current.load_full()
    }

    pub fn lookup(&self, key: &FlowKey) -> Option<ConnectionRecord> {
        self.current.load().lookup(key).cloned()
    }

    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            refreshes: self.refreshes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            records: self.current.load().len(),
        }
    }

    pub fn detection_method(&self) -> &str {
        self.enumerator.name()
    }

    /// Refresh every `interval` until `shutdown` is disconnected
    pub fn spawn_refresh_loop(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: Receiver<()>,
    ) -> Result<JoinHandle<()>> {
        let table = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("connection-refresh".to_string())
            .spawn(move || {
                info!("Connection refresh thread started ({:?} interval)", interval);
                loop {
                    match shutdown.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            // Failure is already counted and logged
                            let _ = table.refresh();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Connection refresh thread stopping");
            })?;
        Ok(handle)
    }
}
