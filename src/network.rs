//! Network prefixes
//!
//! A [`Network`] is an address plus a prefix length, normalized so that the
//! host bits beyond the prefix are zero. Parsing accepts CIDR notation and
//! bare addresses (host routes).

use crate::error::InsertError;
use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A normalized IP prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Network {
    addr: IpAddr,
    prefix_len: u8,
}

impl Network {
    /// Create a network, zeroing host bits
    ///
    /// Fails if `prefix_len` exceeds the address width (32 or 128).
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, InsertError> {
        let max = width_of(addr);
        if prefix_len > max {
            return Err(InsertError::InvalidPrefixLength { prefix_len, max });
        }
        let net = IpNet::new(addr, prefix_len).map_err(|_| InsertError::InvalidPrefixLength {
            prefix_len,
            max,
        })?;
        Ok(Self {
            addr: net.trunc().addr(),
            prefix_len,
        })
    }

    /// Host route covering exactly one address
    pub fn host(addr: IpAddr) -> Self {
        Self {
            addr,
            prefix_len: width_of(addr),
        }
    }

    /// Build from a known-normalized constant
    pub(crate) const fn from_parts(addr: IpAddr, prefix_len: u8) -> Self {
        Self { addr, prefix_len }
    }

    /// Network address (host bits zero)
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length in bits
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Address width of this network's family
    pub fn bit_width(&self) -> u8 {
        width_of(self.addr)
    }

    /// True for IPv4 networks
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// Address as an integer, right-aligned (IPv4 uses the low 32 bits)
    pub fn bits(&self) -> u128 {
        addr_bits(self.addr)
    }

    /// Whether `ip` (same family) lies inside this network
    pub fn contains(&self, ip: IpAddr) -> bool {
        if ip.is_ipv4() != self.addr.is_ipv4() {
            return false;
        }
        let shift = (self.bit_width() - self.prefix_len) as u32;
        if shift >= 128 {
            return true;
        }
        (addr_bits(ip) >> shift) == (self.bits() >> shift)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for Network {
    type Err = InsertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((addr_str, prefix_str)) => {
                let addr = addr_str
                    .parse::<IpAddr>()
                    .map_err(|_| InsertError::InvalidNetwork(s.to_string()))?;
                let prefix_len = prefix_str
                    .parse::<u8>()
                    .map_err(|_| InsertError::InvalidNetwork(s.to_string()))?;
                Network::new(addr, prefix_len)
            }
            None => s
                .parse::<IpAddr>()
                .map(Network::host)
                .map_err(|_| InsertError::InvalidNetwork(s.to_string())),
        }
    }
}

fn width_of(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

pub(crate) fn addr_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr_normalizes_host_bits() {
        let net: Network = "10.1.2.3/8".parse().unwrap();
        assert_eq!(net.addr(), "10.0.0.0".parse::<IpAddr>().unwrap());
        assert_eq!(net.prefix_len(), 8);
        assert_eq!(net.to_string(), "10.0.0.0/8");

        let net: Network = "2001:db8:ffff::1/32".parse().unwrap();
        assert_eq!(net.to_string(), "2001:db8::/32");
    }

    #[test]
    fn test_parse_bare_address_is_host_route() {
        let net: Network = "192.0.2.1".parse().unwrap();
        assert_eq!(net.prefix_len(), 32);
        let net: Network = "::1".parse().unwrap();
        assert_eq!(net.prefix_len(), 128);
    }

    #[test]
    fn test_invalid_prefix_length() {
        assert_eq!(
            "10.0.0.0/33".parse::<Network>(),
            Err(InsertError::InvalidPrefixLength {
                prefix_len: 33,
                max: 32
            })
        );
        assert!(matches!(
            "::/129".parse::<Network>(),
            Err(InsertError::InvalidPrefixLength { .. })
        ));
        assert!(matches!(
            "not-an-ip/8".parse::<Network>(),
            Err(InsertError::InvalidNetwork(_))
        ));
        assert!(matches!(
            "10.0.0.0/abc".parse::<Network>(),
            Err(InsertError::InvalidNetwork(_))
        ));
    }

    #[test]
    fn test_contains() {
        let net: Network = "10.0.0.0/8".parse().unwrap();
        assert!(net.contains("10.255.0.1".parse().unwrap()));
        assert!(!net.contains("11.0.0.0".parse().unwrap()));
        assert!(!net.contains("::a00:1".parse().unwrap()));

        let default: Network = "0.0.0.0/0".parse().unwrap();
        assert!(default.contains("255.255.255.255".parse().unwrap()));

        let all_v6: Network = "::/0".parse().unwrap();
        assert!(all_v6.contains("ffff::1".parse().unwrap()));
    }
}
