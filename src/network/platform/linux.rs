// network/platform/linux.rs - Linux procfs-based socket enumeration

use super::{SocketEnumerator, SocketEntry};
use crate::network::types::Protocol;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

/// Map of socket inode to (PID, process name)
type InodeProcessMap = HashMap<u64, (u32, String)>;

/// Socket tables under /proc/net and the protocol each one holds
const NET_TABLES: [(&str, Protocol); 4] = [
    ("net/tcp", Protocol::TCP),
    ("net/tcp6", Protocol::TCP),
    ("net/udp", Protocol::UDP),
    ("net/udp6", Protocol::UDP),
];

pub struct ProcfsEnumerator {
    proc_root: PathBuf,
}

impl ProcfsEnumerator {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Build inode -> (pid, process_name) mapping by walking /proc/<pid>/fd
    fn build_inode_map(&self) -> Result<InodeProcessMap> {
        let mut inode_map = HashMap::new();

        let entries = fs::read_dir(&self.proc_root)
            .with_context(|| format!("Failed to read {}", self.proc_root.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();

            if let Some(pid_str) = path.file_name().and_then(|s| s.to_str())
                && let Ok(pid) = pid_str.parse::<u32>()
            {
                if pid == 0 {
                    continue;
                }

                let process_name = fs::read_to_string(path.join("comm"))
                    .unwrap_or_else(|_| "unknown".to_string())
                    .trim()
                    .to_string();

                // Processes owned by other users are unreadable without privileges
                let Ok(fd_entries) = fs::read_dir(path.join("fd")) else {
                    continue;
                };
                for fd_entry in fd_entries.flatten() {
                    if let Ok(link) = fs::read_link(fd_entry.path())
                        && let Some(link_str) = link.to_str()
                        && let Some(inode) = extract_socket_inode(link_str)
                    {
                        inode_map.insert(inode, (pid, process_name.clone()));
                    }
                }
            }
        }

        Ok(inode_map)
    }

    fn read_net_table(
        &self,
        relative: &str,
        protocol: Protocol,
        inode_map: &InodeProcessMap,
        result: &mut Vec<SocketEntry>,
    ) {
        let path = self.proc_root.join(relative);
        match fs::read_to_string(&path) {
            Ok(content) => parse_net_table(&content, protocol, inode_map, result),
            // tcp6/udp6 are missing when IPv6 is disabled
            Err(e) => log::debug!("Skipping {}: {}", path.display(), e),
        }
    }
}

impl Default for ProcfsEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketEnumerator for ProcfsEnumerator {
    fn enumerate(&self) -> Result<Vec<SocketEntry>> {
        let inode_map = self.build_inode_map()?;
        let mut sockets = Vec::new();

        for (relative, protocol) in NET_TABLES {
            self.read_net_table(relative, protocol, &inode_map, &mut sockets);
        }

        log::debug!(
            "procfs: {} sockets mapped from {} socket inodes",
            sockets.len(),
            inode_map.len()
        );
        Ok(sockets)
    }

    fn name(&self) -> &str {
        "procfs"
    }
}

/// Parse the contents of a /proc/net/{tcp,udp}[6] file
fn parse_net_table(
    content: &str,
    protocol: Protocol,
    inode_map: &InodeProcessMap,
    result: &mut Vec<SocketEntry>,
) {
    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        let Some(local_addr) = parse_hex_address(parts[1]) else {
            continue;
        };
        let Some(remote_addr) = parse_hex_address(parts[2]) else {
            continue;
        };

        if let Ok(inode) = parts[9].parse::<u64>()
            && let Some((pid, name)) = inode_map.get(&inode)
        {
            let remote_addr = (!remote_addr.ip().is_unspecified() || remote_addr.port() != 0)
                .then_some(remote_addr);
            result.push(SocketEntry {
                protocol,
                local_addr,
                remote_addr,
                pid: *pid,
                process_name: name.clone(),
            });
        }
    }
}

fn parse_hex_address(hex_addr: &str) -> Option<SocketAddr> {
    let (ip_hex, port_hex) = hex_addr.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    if ip_hex.len() == 8 {
        // IPv4
        let ip_bytes = u32::from_str_radix(ip_hex, 16).ok()?;
        let ip = Ipv4Addr::from(ip_bytes.to_le_bytes());
        Some(SocketAddr::new(IpAddr::V4(ip), port))
    } else if ip_hex.len() == 32 {
        // IPv6, stored as four little-endian 32-bit words
        let mut bytes = [0u8; 16];
        for i in 0..4 {
            let chunk = &ip_hex[i * 8..(i + 1) * 8];
            let value = u32::from_str_radix(chunk, 16).ok()?;
            bytes[i * 4..(i + 1) * 4].copy_from_slice(&value.to_le_bytes());
        }
        // IPv4-mapped addresses (::ffff:a.b.c.d) are reported as IPv4 on the wire
        let ip = IpAddr::V6(Ipv6Addr::from(bytes)).to_canonical();
        Some(SocketAddr::new(ip, port))
    } else {
        None
    }
}

fn extract_socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_TABLE: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 11111 1 0000000000000000 100 0 0 10 0
   1: 6401A8C0:3039 08080808:01BB 01 00000000:00000000 00:00000000 00000000  1000        0 22222 1 0000000000000000 20 4 30 10 -1
   2: 6401A8C0:303A 08080808:01BB 01 00000000:00000000 00:00000000 00000000  1000        0 99999 1 0000000000000000 20 4 30 10 -1
";

    #[test]
    fn test_parse_hex_address_ipv4() {
        let addr = parse_hex_address("0100007F:1F90").unwrap();
        assert_eq!(addr, "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn test_parse_hex_address_ipv6() {
        let addr = parse_hex_address("00000000000000000000000001000000:0035").unwrap();
        assert_eq!(addr, "[::1]:53".parse().unwrap());
    }

    #[test]
    fn test_parse_hex_address_ipv4_mapped() {
        // ::ffff:192.168.1.100
        let addr = parse_hex_address("0000000000000000FFFF00006401A8C0:0050").unwrap();
        assert_eq!(addr, "192.168.1.100:80".parse().unwrap());
    }

    #[test]
    fn test_parse_hex_address_invalid() {
        assert!(parse_hex_address("garbage").is_none());
        assert!(parse_hex_address("0100007F").is_none());
        assert!(parse_hex_address("01007F:1F90").is_none());
    }

    #[test]
    fn test_extract_socket_inode() {
        assert_eq!(extract_socket_inode("socket:[12345]"), Some(12345));
        assert_eq!(extract_socket_inode("pipe:[12345]"), None);
        assert_eq!(extract_socket_inode("/dev/null"), None);
    }

    #[test]
    fn test_parse_net_table_maps_inodes_to_processes() {
        let mut inode_map = HashMap::new();
        inode_map.insert(11111, (10, "server".to_string()));
        inode_map.insert(22222, (20, "curl".to_string()));

        let mut sockets = Vec::new();
        parse_net_table(TCP_TABLE, Protocol::TCP, &inode_map, &mut sockets);

        // Inode 99999 belongs to nobody we can see
        assert_eq!(sockets.len(), 2);

        let listener = &sockets[0];
        assert_eq!(listener.pid, 10);
        assert_eq!(listener.local_addr, "127.0.0.1:8080".parse().unwrap());
        assert!(listener.remote_addr.is_none(), "Listener has no peer");

        let client = &sockets[1];
        assert_eq!(client.pid, 20);
        assert_eq!(client.process_name, "curl");
        assert_eq!(client.local_addr, "192.168.1.100:12345".parse().unwrap());
        assert_eq!(client.remote_addr, Some("8.8.8.8:443".parse().unwrap()));
    }

    #[test]
    fn test_missing_proc_root_is_an_error() {
        let enumerator = ProcfsEnumerator::with_root("/nonexistent/xnettop-proc");
        assert!(enumerator.enumerate().is_err());
    }
}
