//! Device addresses and the /24 subnets scanned during discovery

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use thiserror::Error;

/// A host (name or numeric) plus port where a WiCAN endpoint may live
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    host: String,
    port: u16,
}

/// Address parsing failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid IPv4 address: {0}")]
    InvalidIpv4(String),
    #[error("invalid subnet `{0}` (expected e.g. 192.168.1 or 192.168.1.0/24)")]
    InvalidSubnet(String),
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Full URL of `path` on this address; port 80 is left implicit
    pub fn endpoint_url(&self, path: &str) -> String {
        let host = self.url_host();
        if self.port == 80 {
            format!("http://{}{}", host, path)
        } else {
            format!("http://{}:{}{}", host, self.port, path)
        }
    }

    /// Parse operator input: `a.b.c.d` or `a.b.c.d:port`
    pub fn parse_ipv4(input: &str, default_port: u16) -> Result<Self, AddressError> {
        let input = input.trim();

        if let Ok(socket) = input.parse::<SocketAddrV4>() {
            if socket.port() == 0 {
                return Err(AddressError::InvalidIpv4(input.to_string()));
            }
            return Ok(Self::new(socket.ip().to_string(), socket.port()));
        }

        input
            .parse::<Ipv4Addr>()
            .map(|ip| Self::new(ip.to_string(), default_port))
            .map_err(|_| AddressError::InvalidIpv4(input.to_string()))
    }

    fn url_host(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{}]", v6),
            _ => self.host.clone(),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(socket: SocketAddr) -> Self {
        Self::new(socket.ip().to_string(), socket.port())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.url_host(), self.port)
    }
}

/// A /24 IPv4 network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet([u8; 3]);

impl Subnet {
    pub fn containing(ip: Ipv4Addr) -> Self {
        let [a, b, c, _] = ip.octets();
        Self([a, b, c])
    }

    /// Host addresses .1 through .254, ascending
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let [a, b, c] = self.0;
        (1..=254u8).map(move |d| Ipv4Addr::new(a, b, c, d))
    }

    pub fn candidates(&self, port: u16) -> Vec<Address> {
        self.hosts()
            .map(|ip| Address::new(ip.to_string(), port))
            .collect()
    }
}

impl FromStr for Subnet {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidSubnet(s.to_string());
        let trimmed = s.trim();
        let body = trimmed.strip_suffix("/24").unwrap_or(trimmed);

        let mut parts: Vec<&str> = body.split('.').collect();
        if parts.len() == 4 {
            if parts[3] != "0" {
                return Err(invalid());
            }
            parts.pop();
        }
        if parts.len() != 3 {
            return Err(invalid());
        }

        let mut octets = [0u8; 3];
        for (slot, part) in octets.iter_mut().zip(parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{}.{}.{}.0/24", a, b, c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            Address::new("192.168.8.102", 80).endpoint_url("/autopid_data"),
            "http://192.168.8.102/autopid_data"
        );
        assert_eq!(
            Address::new("127.0.0.1", 8080).endpoint_url("/autopid_data"),
            "http://127.0.0.1:8080/autopid_data"
        );
        assert_eq!(
            Address::new("::1", 8080).endpoint_url("/x"),
            "http://[::1]:8080/x"
        );
    }

    #[test]
    fn test_parse_manual_input() {
        assert_eq!(
            Address::parse_ipv4(" 192.168.1.50 ", 80).unwrap(),
            Address::new("192.168.1.50", 80)
        );
        assert_eq!(
            Address::parse_ipv4("10.0.0.7:8080", 80).unwrap(),
            Address::new("10.0.0.7", 8080)
        );
        for bad in ["192.168.1", "256.1.1.1", "wican.local", "1.2.3.4:0", "a.b.c.d"] {
            assert!(Address::parse_ipv4(bad, 80).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_subnet_parsing() {
        let expected = Subnet([192, 168, 1]);
        assert_eq!("192.168.1".parse::<Subnet>().unwrap(), expected);
        assert_eq!("192.168.1.0/24".parse::<Subnet>().unwrap(), expected);
        assert_eq!("192.168.1.0".parse::<Subnet>().unwrap(), expected);
        assert!("192.168.1.7".parse::<Subnet>().is_err());
        assert!("192.168".parse::<Subnet>().is_err());
        assert!("192.168.300".parse::<Subnet>().is_err());
        assert_eq!(expected.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn test_subnet_hosts() {
        let subnet = Subnet::containing(Ipv4Addr::new(10, 0, 0, 42));
        let hosts: Vec<_> = subnet.hosts().collect();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(hosts[253], Ipv4Addr::new(10, 0, 0, 254));
    }
}
