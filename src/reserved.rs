//! Special-purpose address ranges
//!
//! Networks from the IANA special-purpose registries. When a build excludes
//! reserved networks these ranges are pinned in the trie so nothing can be
//! stored inside them and lookups inside them find nothing.

use crate::network::Network;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// (address, prefix length) pairs for IPv4
const IPV4_RESERVED: &[([u8; 4], u8)] = &[
    ([0, 0, 0, 0], 8),
    ([10, 0, 0, 0], 8),
    ([100, 64, 0, 0], 10),
    ([127, 0, 0, 0], 8),
    ([169, 254, 0, 0], 16),
    ([172, 16, 0, 0], 12),
    ([192, 0, 0, 0], 29),
    ([192, 0, 2, 0], 24),
    ([192, 88, 99, 0], 24),
    ([192, 168, 0, 0], 16),
    ([198, 18, 0, 0], 15),
    ([198, 51, 100, 0], 24),
    ([203, 0, 113, 0], 24),
    ([224, 0, 0, 0], 4),
    ([240, 0, 0, 0], 4),
    ([255, 255, 255, 255], 32),
];

/// (segments, prefix length) pairs for IPv6
const IPV6_RESERVED: &[([u16; 8], u8)] = &[
    ([0x0100, 0, 0, 0, 0, 0, 0, 0], 64),
    ([0x2001, 0, 0, 0, 0, 0, 0, 0], 23),
    ([0x2001, 0x0db8, 0, 0, 0, 0, 0, 0], 32),
    ([0xfc00, 0, 0, 0, 0, 0, 0, 0], 7),
    ([0xfe80, 0, 0, 0, 0, 0, 0, 0], 10),
    ([0xff00, 0, 0, 0, 0, 0, 0, 0], 8),
];

/// Reserved IPv4 networks
pub fn ipv4_networks() -> impl Iterator<Item = Network> {
    IPV4_RESERVED
        .iter()
        .map(|&(octets, len)| Network::from_parts(IpAddr::V4(Ipv4Addr::from(octets)), len))
}

/// Reserved IPv6 networks (IPv4 ranges not included)
pub fn ipv6_networks() -> impl Iterator<Item = Network> {
    IPV6_RESERVED
        .iter()
        .map(|&(segments, len)| Network::from_parts(IpAddr::V6(Ipv6Addr::from(segments)), len))
}

/// Whether `ip` falls in any reserved range of its family
pub fn is_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(_) => ipv4_networks().any(|net| net.contains(ip)),
        IpAddr::V6(_) => ipv6_networks().any(|net| net.contains(ip)),
    }
}
