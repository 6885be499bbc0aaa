// network/capture.rs - Packet capture setup and the capture thread
use anyhow::{Context, Result, anyhow};
use crossbeam::channel::{Receiver, TryRecvError};
use pcap::{Active, Capture, Device, Error as PcapError};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::network::parser::PacketParser;
use crate::stats::aggregator::EventSender;

/// Packet capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Network interface name (None for default)
    pub interface: Option<String>,
    /// Snapshot length; headers are all we need
    pub snaplen: i32,
    /// Buffer size for packet capture
    pub buffer_size: i32,
    /// Read timeout in milliseconds, bounds how long shutdown waits
    pub timeout_ms: i32,
    /// BPF filter string
    pub filter: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            snaplen: 256,
            buffer_size: 8_000_000,
            timeout_ms: 150,
            filter: None,
        }
    }
}

/// Counters kept by the capture thread
#[derive(Debug, Default)]
pub struct CaptureCounters {
    pub received: AtomicU64,
    pub enqueued: AtomicU64,
    /// Frames that were not TCP/UDP over IP, or were malformed
    pub undecodable: AtomicU64,
}

impl CaptureCounters {
    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            received: self.received.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            undecodable: self.undecodable.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CaptureCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub received: u64,
    pub enqueued: u64,
    pub undecodable: u64,
}

/// An opened capture, ready to be moved into the capture thread
pub struct CaptureHandle {
    capture: Capture<Active>,
    pub device_name: String,
    pub datalink: i32,
    /// Addresses assigned to the capture device
    pub local_ips: HashSet<IpAddr>,
}

/// Open the capture described by `config`.
///
/// Fails when the interface does not exist or the process lacks the
/// privilege to capture.
pub fn setup_packet_capture(config: &CaptureConfig) -> Result<CaptureHandle> {
    let device = find_capture_device(&config.interface)?;
    let device_name = device.name.clone();
    let local_ips: HashSet<IpAddr> = device.addresses.iter().map(|a| a.addr).collect();

    log::info!(
        "Setting up capture on device: {} ({})",
        device.name,
        device.desc.as_deref().unwrap_or("no description")
    );

    // Non-promiscuous: we only account traffic of this host
    let mut capture = Capture::from_device(device)?
        .promisc(false)
        .snaplen(config.snaplen)
        .buffer_size(config.buffer_size)
        .timeout(config.timeout_ms)
        .immediate_mode(true)
        .open()
        .with_context(|| {
            format!(
                "Failed to open capture on '{}'. Packet capture needs root or CAP_NET_RAW (Linux) / access to /dev/bpf (macOS)",
                device_name
            )
        })?;

    if let Some(filter) = &config.filter {
        log::info!("Applying BPF filter: {}", filter);
        capture
            .filter(filter, true)
            .with_context(|| format!("Invalid BPF filter '{}'", filter))?;
    }

    let datalink = capture.get_datalink().0;
    let parser = PacketParser::new(datalink);
    if !parser.link_type().is_supported() {
        return Err(anyhow!(
            "Unsupported datalink type {} on interface '{}'",
            datalink,
            device_name
        ));
    }
    log::info!(
        "Capture ready on {} (datalink {}, {:?})",
        device_name,
        datalink,
        parser.link_type()
    );

    Ok(CaptureHandle {
        capture,
        device_name,
        datalink,
        local_ips,
    })
}

/// Addresses of every interface libpcap reports
pub fn local_addresses() -> HashSet<IpAddr> {
    match Device::list() {
        Ok(devices) => devices
            .iter()
            .flat_map(|d| d.addresses.iter().map(|a| a.addr))
            .collect(),
        Err(e) => {
            log::warn!("Failed to list network devices: {}", e);
            HashSet::new()
        }
    }
}

/// Find a capture device by name or return the default
fn find_capture_device(interface_name: &Option<String>) -> Result<Device> {
    match interface_name {
        Some(name) => {
            log::info!("Looking for interface: {}", name);

            let devices = Device::list().map_err(|e| {
                anyhow!(
                    "Failed to list network devices: {}. This may indicate insufficient privileges.",
                    e
                )
            })?;

            if let Some(device) = devices.iter().find(|d| d.name == *name) {
                return Ok(device.clone());
            }

            let name_lower = name.to_lowercase();
            if let Some(device) = devices.iter().find(|d| d.name.to_lowercase() == name_lower) {
                return Ok(device.clone());
            }

            let available: Vec<String> = devices.iter().map(|d| d.name.clone()).collect();
            Err(anyhow!(
                "Interface '{}' not found. Available interfaces: {}",
                name,
                available.join(", ")
            ))
        }
        None => {
            log::info!("No interface specified, using default");
            match Device::lookup()? {
                Some(device) => {
                    log::info!("Found default device: {}", device.name);
                    Ok(device)
                }
                None => Err(anyhow!(
                    "No default capture device found. Use -i to specify an interface."
                )),
            }
        }
    }
}

/// Read packets until `shutdown` is signalled, feeding them to `sender`
pub fn spawn_capture_thread(
    handle: CaptureHandle,
    sender: EventSender,
    counters: Arc<CaptureCounters>,
    shutdown: Receiver<()>,
) -> Result<JoinHandle<()>> {
    let thread = thread::Builder::new()
        .name("capture".to_string())
        .spawn(move || {
            let CaptureHandle {
                mut capture,
                device_name,
                datalink,
                ..
            } = handle;
            let parser = PacketParser::new(datalink);
            log::info!("Capture thread started on {}", device_name);

            loop {
                match shutdown.try_recv() {
                    Err(TryRecvError::Empty) => {}
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                }

                match capture.next_packet() {
                    Ok(packet) => {
                        counters.received.fetch_add(1, Ordering::Relaxed);
                        match parser.parse(packet.data, packet.header.len, Instant::now()) {
                            Some(event) => {
                                if sender.try_enqueue(event) {
                                    counters.enqueued.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                            None => {
                                counters.undecodable.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                    Err(PcapError::TimeoutExpired) => continue,
                    Err(e) => {
                        log::error!("Capture error on {}: {}", device_name, e);
                        break;
                    }
                }
            }

            if let Ok(stats) = capture.stats() {
                log::info!(
                    "Capture thread stopping: {} received by pcap, {} dropped by kernel",
                    stats.received,
                    stats.dropped
                );
            }
        })?;
    Ok(thread)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();
        assert!(config.snaplen >= 128, "Snaplen must cover IPv6 + TCP headers");
        assert!(config.filter.is_none());
        assert!(config.timeout_ms > 0);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = CaptureCounters::default();
        counters.received.fetch_add(3, Ordering::Relaxed);
        counters.undecodable.fetch_add(1, Ordering::Relaxed);
        assert_eq!(
            counters.snapshot(),
            CaptureStats {
                received: 3,
                enqueued: 0,
                undecodable: 1,
            }
        );
    }
}
