//! Local network addresses
//!
//! Lists the IPv4 addresses a phone on the same LAN can use to reach the
//! relay, and builds the source URL it should connect to.

use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};

/// Body of `GET /api/local-ip`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAddresses {
    pub addresses: Vec<String>,
    /// Source URL on the first address; `None` without a LAN address
    pub websocket_url: Option<String>,
}

impl LocalAddresses {
    pub fn new(addresses: &[Ipv4Addr], port: u16) -> Self {
        Self {
            addresses: addresses.iter().map(Ipv4Addr::to_string).collect(),
            websocket_url: addresses.first().map(|addr| source_url(*addr, port)),
        }
    }

    /// Enumerate the host's interfaces
    pub fn discover(port: u16) -> Self {
        Self::new(&lan_ipv4_addresses(), port)
    }
}

/// URL a phone uses to push frames
pub fn source_url(addr: Ipv4Addr, port: u16) -> String {
    format!("ws://{}:{}?type=phone", addr, port)
}

/// Non-loopback IPv4 addresses of every interface, in interface order
pub fn lan_ipv4_addresses() -> Vec<Ipv4Addr> {
    match local_ip_address::list_afinet_netifas() {
        Ok(ifaces) => select_lan_ipv4(ifaces),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to list network interfaces");
            Vec::new()
        }
    }
}

fn select_lan_ipv4(ifaces: impl IntoIterator<Item = (String, IpAddr)>) -> Vec<Ipv4Addr> {
    let mut out: Vec<Ipv4Addr> = Vec::new();
    for (_name, ip) in ifaces {
        if let IpAddr::V4(v4) = ip {
            if !v4.is_loopback() && !v4.is_unspecified() && !out.contains(&v4) {
                out.push(v4);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_select_skips_loopback_and_ipv6() {
        let ifaces = vec![
            ("lo".to_string(), IpAddr::V4(Ipv4Addr::LOCALHOST)),
            ("eth0".to_string(), IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1))),
            ("eth0".to_string(), IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))),
            ("wlan0".to_string(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))),
            ("br0".to_string(), IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))),
        ];
        assert_eq!(
            select_lan_ipv4(ifaces),
            vec![Ipv4Addr::new(192, 168, 1, 20), Ipv4Addr::new(10, 0, 0, 7)]
        );
    }

    #[test]
    fn test_response_shape() {
        let body = LocalAddresses::new(&[Ipv4Addr::new(192, 168, 1, 20)], 5010);
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["addresses"][0], "192.168.1.20");
        assert_eq!(value["websocketUrl"], "ws://192.168.1.20:5010?type=phone");

        let empty = serde_json::to_value(LocalAddresses::new(&[], 5010)).unwrap();
        assert_eq!(empty["addresses"].as_array().unwrap().len(), 0);
        assert!(empty["websocketUrl"].is_null());
    }
}
