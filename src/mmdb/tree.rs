//! MMDB Search Tree Traversal
//!
//! Each node holds two records (left for bit 0, right for bit 1). A record
//! value below `node_count` is another node, equal to `node_count` means
//! "not found", and anything larger points into the data section.

use super::format::MmdbHeader;
use super::types::{IpVersion, MmdbError, RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use std::net::IpAddr;

/// Result of an IP lookup
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    /// Offset into the data section (relative to data section start)
    pub data_offset: u32,
    /// Prefix length of the matched network, in the queried address family
    pub prefix_len: u8,
}

/// Search tree for IP address lookups
pub struct SearchTree<'a> {
    data: &'a [u8],
    header: &'a MmdbHeader,
}

impl<'a> SearchTree<'a> {
    /// Create a new search tree
    pub fn new(data: &'a [u8], header: &'a MmdbHeader) -> Self {
        Self { data, header }
    }

    /// Look up an IP address
    ///
    /// IPv4 addresses in an IPv6 tree are looked up under `::/96`, the way
    /// libmaxminddb does; the reported prefix length is then the IPv4 one.
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<LookupResult>, MmdbError> {
        match (ip, self.header.ip_version) {
            (IpAddr::V4(v4), IpVersion::V4) => self.walk(u32::from(v4) as u128, 32, 0),
            (IpAddr::V4(v4), IpVersion::V6) => self.walk(u32::from(v4) as u128, 128, 96),
            (IpAddr::V6(v6), IpVersion::V6) => self.walk(u128::from(v6), 128, 0),
            (IpAddr::V6(v6), IpVersion::V4) => Err(MmdbError::InvalidIpAddress(format!(
                "Cannot look up IPv6 address {} in an IPv4 database",
                v6
            ))),
        }
    }

    /// Follow `bit_count` bits of `bits` (most significant first)
    fn walk(
        &self,
        bits: u128,
        bit_count: u8,
        prefix_bias: u8,
    ) -> Result<Option<LookupResult>, MmdbError> {
        let node_count = self.header.node_count;
        let mut node = 0u32;

        for depth in 0..bit_count {
            let bit = ((bits >> (bit_count - 1 - depth)) & 1) as u8;
            let record = self.read_record(node as usize, bit)?;

            if record == node_count {
                return Ok(None);
            } else if record < node_count {
                node = record;
            } else {
                let data_offset = self.calculate_data_offset(record)?;
                return Ok(Some(LookupResult {
                    data_offset,
                    prefix_len: (depth + 1).saturating_sub(prefix_bias),
                }));
            }
        }

        Ok(None)
    }

    /// Read a record from a node (`side` 0 = left, 1 = right)
    fn read_record(&self, node: usize, side: u8) -> Result<u32, MmdbError> {
        if node as u32 >= self.header.node_count {
            return Err(MmdbError::InvalidFormat(format!(
                "Node index {} exceeds node count {}",
                node, self.header.node_count
            )));
        }

        let node_bytes = self.header.record_size.node_bytes();
        let node_offset = node * node_bytes;
        if node_offset + node_bytes > self.header.tree_size || node_offset + node_bytes > self.data.len() {
            return Err(MmdbError::InvalidFormat(format!(
                "Node offset {} exceeds tree size {}",
                node_offset, self.header.tree_size
            )));
        }
        let bytes = &self.data[node_offset..node_offset + node_bytes];

        let be = |b: &[u8]| b.iter().fold(0u32, |acc, &x| (acc << 8) | x as u32);

        Ok(match (self.header.record_size, side) {
            (RecordSize::Bits24, 0) => be(&bytes[0..3]),
            (RecordSize::Bits24, _) => be(&bytes[3..6]),
            // Layout: [left low 24][left high 4 | right high 4][right low 24]
            (RecordSize::Bits28, 0) => (((bytes[3] >> 4) as u32) << 24) | be(&bytes[0..3]),
            (RecordSize::Bits28, _) => (((bytes[3] & 0x0F) as u32) << 24) | be(&bytes[4..7]),
            (RecordSize::Bits32, 0) => be(&bytes[0..4]),
            (RecordSize::Bits32, _) => be(&bytes[4..8]),
        })
    }

    /// data_offset = (record_value - node_count) - 16
    fn calculate_data_offset(&self, record: u32) -> Result<u32, MmdbError> {
        record
            .checked_sub(self.header.node_count)
            .and_then(|v| v.checked_sub(DATA_SECTION_SEPARATOR_SIZE as u32))
            .ok_or_else(|| {
                MmdbError::InvalidFormat(format!(
                    "Record {} is not a valid data pointer (node_count = {})",
                    record, self.header.node_count
                ))
            })
    }
}
