//! MMDB-specific Type Definitions
//!
//! Types shared by the writer (record size selection, IP version) and the
//! verification reader.

use std::fmt;

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Zero bytes between the search tree and the data section
pub const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// MMDB-specific error types
#[derive(Debug, Clone)]
pub enum MmdbError {
    /// Invalid file format
    InvalidFormat(String),
    /// Metadata not found
    MetadataNotFound,
    /// Invalid metadata structure
    InvalidMetadata(String),
    /// Data decoding error
    DecodeError(String),
    /// IO error
    IoError(String),
    /// Address family not present in this database
    InvalidIpAddress(String),
}

impl fmt::Display for MmdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmdbError::InvalidFormat(msg) => write!(f, "Invalid MMDB format: {}", msg),
            MmdbError::MetadataNotFound => write!(f, "MMDB metadata marker not found"),
            MmdbError::InvalidMetadata(msg) => write!(f, "Invalid metadata: {}", msg),
            MmdbError::DecodeError(msg) => write!(f, "Data decode error: {}", msg),
            MmdbError::IoError(msg) => write!(f, "IO error: {}", msg),
            MmdbError::InvalidIpAddress(msg) => write!(f, "Invalid IP address: {}", msg),
        }
    }
}

impl std::error::Error for MmdbError {}

impl From<std::io::Error> for MmdbError {
    fn from(err: std::io::Error) -> Self {
        MmdbError::IoError(err.to_string())
    }
}

/// IP version of a trie or database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    /// IPv4 only (32-bit tree)
    V4,
    /// IPv6 (128-bit tree, IPv4 under `::/96`)
    V6,
}

impl IpVersion {
    /// Depth of the tree in bits
    pub fn bit_width(self) -> u8 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }

    /// Value stored in the `ip_version` metadata field
    pub fn number(self) -> u16 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }

    /// Parse the `ip_version` metadata field (or a CLI protocol number)
    pub fn from_number(n: u64) -> Option<Self> {
        match n {
            4 => Some(IpVersion::V4),
            6 => Some(IpVersion::V6),
            _ => None,
        }
    }
}

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// All sizes, narrowest first
    pub const ALL: [RecordSize; 3] = [RecordSize::Bits24, RecordSize::Bits28, RecordSize::Bits32];

    /// Get the size of a node (2 records) in bytes
    pub fn node_bytes(self) -> usize {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Largest value a record of this size can hold
    pub fn max_value(self) -> u64 {
        (1u64 << (self as u32)) - 1
    }

    /// Narrowest record size able to hold `value`
    pub fn smallest_for(value: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|size| value <= size.max_value())
    }

    /// Create from bit size
    pub fn from_bits(bits: u16) -> Result<Self, MmdbError> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(MmdbError::InvalidFormat(format!(
                "Invalid record size: {} bits",
                bits
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smallest_record_size() {
        assert_eq!(RecordSize::smallest_for(0), Some(RecordSize::Bits24));
        assert_eq!(RecordSize::smallest_for(0xFF_FFFF), Some(RecordSize::Bits24));
        assert_eq!(RecordSize::smallest_for(0x100_0000), Some(RecordSize::Bits28));
        assert_eq!(RecordSize::smallest_for(0x1000_0000), Some(RecordSize::Bits32));
        assert_eq!(RecordSize::smallest_for(u32::MAX as u64), Some(RecordSize::Bits32));
        assert_eq!(RecordSize::smallest_for(u32::MAX as u64 + 1), None);
    }

    #[test]
    fn test_from_bits() {
        assert_eq!(RecordSize::from_bits(28).unwrap(), RecordSize::Bits28);
        assert!(RecordSize::from_bits(30).is_err());
    }
}
