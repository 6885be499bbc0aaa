// network/platform/macos.rs - macOS socket enumeration via lsof

use super::{SocketEnumerator, SocketEntry};
use crate::network::types::Protocol;
use anyhow::{Context, Result, anyhow};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::process::Command;

pub struct LsofEnumerator;

impl LsofEnumerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LsofEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketEnumerator for LsofEnumerator {
    fn enumerate(&self) -> Result<Vec<SocketEntry>> {
        let output = Command::new("lsof")
            .args(["-i", "-n", "-P", "+c", "0"])
            .output()
            .context("Failed to run lsof")?;

        // lsof exits with 1 when nothing matched, which is not an error for us
        if !output.status.success() && !output.stdout.is_empty() {
            return Err(anyhow!("lsof exited with {}", output.status));
        }

        Ok(parse_lsof_output(&String::from_utf8_lossy(&output.stdout)))
    }

    fn name(&self) -> &str {
        "lsof"
    }
}

/// Parse `lsof -i -n -P` output.
///
/// Columns: COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME [(STATE)]
fn parse_lsof_output(stdout: &str) -> Vec<SocketEntry> {
    let mut sockets = Vec::new();

    for line in stdout.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 9 {
            continue;
        }

        let Ok(pid) = fields[1].parse::<u32>() else {
            continue;
        };
        let protocol = match fields[7] {
            "TCP" => Protocol::TCP,
            "UDP" => Protocol::UDP,
            _ => continue,
        };
        let is_ipv6 = fields[4] == "IPv6";

        if let Some((local_addr, remote_addr)) = parse_lsof_name(fields[8], is_ipv6) {
            sockets.push(SocketEntry {
                protocol,
                local_addr,
                remote_addr,
                pid,
                process_name: unescape_command(fields[0]),
            });
        }
    }

    sockets
}

/// Decode the `\xNN` escapes lsof uses for spaces and other unprintable
/// bytes in the COMMAND column
fn unescape_command(command: &str) -> String {
    let raw = command.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'\\'
            && raw.get(i + 1) == Some(&b'x')
            && let Some(hex) = command.get(i + 2..i + 4)
            && let Ok(byte) = u8::from_str_radix(hex, 16)
        {
            bytes.push(byte);
            i += 4;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

/// Parse the NAME column, e.g. `192.168.1.1:443->10.0.0.1:12345` or `*:5353`
fn parse_lsof_name(name: &str, is_ipv6: bool) -> Option<(SocketAddr, Option<SocketAddr>)> {
    match name.split_once("->") {
        Some((local, remote)) => Some((
            parse_lsof_endpoint(local, is_ipv6)?,
            Some(parse_lsof_endpoint(remote, is_ipv6)?),
        )),
        None => Some((parse_lsof_endpoint(name, is_ipv6)?, None)),
    }
}

fn parse_lsof_endpoint(endpoint: &str, is_ipv6: bool) -> Option<SocketAddr> {
    let (host, port) = endpoint.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;

    let ip = if host == "*" {
        if is_ipv6 {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    } else {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        // Drop the zone of link-local addresses (fe80::1%en0)
        let host = host.split('%').next()?;
        host.parse().ok()?
    };

    Some(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LSOF_OUTPUT: &str = "COMMAND   PID USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME
curl      123 user    5u  IPv4 0x1234567890abcdef      0t0  TCP 192.168.1.100:12345->8.8.8.8:443 (ESTABLISHED)
mDNSResp  456 root    7u  IPv6 0x1234567890abcdf0      0t0  UDP *:5353
sshd      789 root    3u  IPv6 0x1234567890abcdf1      0t0  TCP [fe80::1%en0]:22->[fe80::2]:50000 (ESTABLISHED)
";

    #[test]
    fn test_parse_lsof_output() {
        let sockets = parse_lsof_output(LSOF_OUTPUT);
        assert_eq!(sockets.len(), 3);

        assert_eq!(sockets[0].pid, 123);
        assert_eq!(sockets[0].protocol, Protocol::TCP);
        assert_eq!(sockets[0].remote_addr, Some("8.8.8.8:443".parse().unwrap()));

        assert_eq!(sockets[1].protocol, Protocol::UDP);
        assert_eq!(sockets[1].local_addr, "[::]:5353".parse().unwrap());
        assert!(sockets[1].remote_addr.is_none());

        assert_eq!(sockets[2].local_addr, "[fe80::1]:22".parse().unwrap());
    }

    #[test]
    fn test_escaped_command_names() {
        let output = "COMMAND   PID USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME
Google\\x20Chrome\\x20Helper 321 user   21u  IPv4 0x1234567890abcdef      0t0  TCP 192.168.1.100:50000->1.1.1.1:443 (ESTABLISHED)
";
        let sockets = parse_lsof_output(output);
        assert_eq!(sockets.len(), 1);
        assert_eq!(sockets[0].process_name, "Google Chrome Helper");
        assert_eq!(sockets[0].pid, 321);

        assert_eq!(unescape_command("plain"), "plain");
        assert_eq!(unescape_command("trailing\\x2"), "trailing\\x2");
        assert_eq!(unescape_command("bad\\xZZ"), "bad\\xZZ");
    }

    #[test]
    fn test_parse_lsof_endpoint_rejects_garbage() {
        assert!(parse_lsof_endpoint("no-port", false).is_none());
        assert!(parse_lsof_endpoint("1.2.3.4:http", false).is_none());
    }
}
