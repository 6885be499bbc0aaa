// network/platform/mod.rs - Platform-specific socket enumeration
//
// Each platform provides a SocketEnumerator that lists open TCP/UDP sockets
// together with the process that owns them. The connection table calls it on
// every refresh tick.

use crate::network::types::Protocol;
use anyhow::Result;
use std::net::SocketAddr;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
pub use linux::ProcfsEnumerator;
#[cfg(target_os = "macos")]
pub use macos::LsofEnumerator;

/// One open socket as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEntry {
    pub protocol: Protocol,
    pub local_addr: SocketAddr,
    /// None for listening or unconnected sockets
    pub remote_addr: Option<SocketAddr>,
    pub pid: u32,
    pub process_name: String,
}

/// Trait for platform-specific socket enumeration
pub trait SocketEnumerator: Send + Sync {
    /// List every open socket with its owning process
    fn enumerate(&self) -> Result<Vec<SocketEntry>>;

    /// Get the detection method name for display purposes
    fn name(&self) -> &str;
}

/// Create the socket enumerator for the current platform
pub fn create_socket_enumerator() -> Result<Box<dyn SocketEnumerator>> {
    #[cfg(target_os = "linux")]
    {
        log::info!("Using Linux socket enumeration (procfs)");
        Ok(Box::new(ProcfsEnumerator::new()))
    }
    #[cfg(target_os = "macos")]
    {
        log::info!("Using macOS socket enumeration (lsof)");
        Ok(Box::new(LsofEnumerator::new()))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Err(anyhow::anyhow!(
            "Socket enumeration is not supported on this platform"
        ))
    }
}
