//! MMDB Binary Format Parsing
//!
//! Locates the metadata block by scanning backward from end-of-file for the
//! marker, then extracts the few fields needed to walk the search tree.

use super::types::{
    IpVersion, MmdbError, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER,
};
use crate::data_section::{DataDecoder, DataValue};
use std::collections::BTreeMap;

/// Window at the end of the file that must contain the marker
const METADATA_SEARCH_SIZE: usize = 128 * 1024;

/// Minimal header information for IP lookups
#[derive(Debug, Clone, Copy)]
pub struct MmdbHeader {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32)
    pub record_size: RecordSize,
    /// IP version (4 or 6)
    pub ip_version: IpVersion,
    /// Size of the search tree in bytes
    pub tree_size: usize,
    /// Offset of the metadata marker
    pub metadata_start: usize,
}

impl MmdbHeader {
    /// Parse the metadata of an MMDB file
    pub fn from_file(data: &[u8]) -> Result<Self, MmdbError> {
        let marker_offset = find_metadata_marker(data)?;
        let metadata = decode_metadata(data, marker_offset)?;

        let map = match metadata {
            DataValue::Map(ref map) => map,
            _ => {
                return Err(MmdbError::InvalidMetadata(
                    "Metadata is not a map".to_string(),
                ))
            }
        };

        let node_count = extract_uint(map, "node_count")?;
        let record_size_bits = extract_uint(map, "record_size")?;
        let ip_version_num = extract_uint(map, "ip_version")?;

        let node_count = u32::try_from(node_count).map_err(|_| {
            MmdbError::InvalidMetadata(format!("node_count {} out of range", node_count))
        })?;
        let record_size = RecordSize::from_bits(record_size_bits as u16)?;
        let ip_version = IpVersion::from_number(ip_version_num).ok_or_else(|| {
            MmdbError::InvalidMetadata(format!("Invalid IP version: {}", ip_version_num))
        })?;

        let tree_size = node_count as usize * record_size.node_bytes();
        if tree_size + DATA_SECTION_SEPARATOR_SIZE > marker_offset {
            return Err(MmdbError::InvalidFormat(format!(
                "Search tree of {} bytes does not fit before metadata at {}",
                tree_size, marker_offset
            )));
        }

        Ok(MmdbHeader {
            node_count,
            record_size,
            ip_version,
            tree_size,
            metadata_start: marker_offset,
        })
    }

    /// Byte range of the data section
    pub fn data_section<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.tree_size + DATA_SECTION_SEPARATOR_SIZE..self.metadata_start]
    }
}

/// Decode the full metadata map following the marker at `marker_offset`
pub fn decode_metadata(data: &[u8], marker_offset: usize) -> Result<DataValue, MmdbError> {
    let metadata_bytes = &data[marker_offset + METADATA_MARKER.len()..];
    DataDecoder::new(metadata_bytes)
        .decode(0)
        .map_err(|e| MmdbError::InvalidMetadata(format!("Failed to decode metadata: {}", e)))
}

/// Find the metadata marker
///
/// The marker appears in the last 128KB of the file; when several are present
/// the last one wins.
pub fn find_metadata_marker(data: &[u8]) -> Result<usize, MmdbError> {
    let search_start = data.len().saturating_sub(METADATA_SEARCH_SIZE);
    memchr::memmem::rfind(&data[search_start..], METADATA_MARKER)
        .map(|pos| search_start + pos)
        .ok_or(MmdbError::MetadataNotFound)
}

fn extract_uint(map: &BTreeMap<String, DataValue>, key: &str) -> Result<u64, MmdbError> {
    match map.get(key) {
        Some(value) => value.as_u64().ok_or_else(|| {
            MmdbError::InvalidMetadata(format!("Field '{}' is not an unsigned integer", key))
        }),
        None => Err(MmdbError::InvalidMetadata(format!(
            "Required field '{}' not found",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::Trie;

    fn sample_database() -> Vec<u8> {
        let mut trie = Trie::new(IpVersion::V4, false, true);
        let record: DataValue = vec![("country", "NZ")].into_iter().collect();
        trie.insert("203.0.113.0/24".parse().unwrap(), record).unwrap();
        trie.to_bytes().unwrap()
    }

    #[test]
    fn test_find_metadata_marker() {
        let data = sample_database();
        let offset = find_metadata_marker(&data).unwrap();
        assert!(offset > 0, "Marker should not be at start of file");
        assert_eq!(&data[offset..offset + METADATA_MARKER.len()], METADATA_MARKER);
    }

    #[test]
    fn test_parse_header() {
        let data = sample_database();
        let header = MmdbHeader::from_file(&data).unwrap();
        assert_eq!(header.ip_version, IpVersion::V4);
        assert_eq!(header.record_size, RecordSize::Bits24);
        assert!(header.node_count > 0);
        assert_eq!(
            header.tree_size,
            header.node_count as usize * header.record_size.node_bytes()
        );
        assert!(!header.data_section(&data).is_empty());
    }

    #[test]
    fn test_metadata_not_found() {
        let result = find_metadata_marker(b"not a valid mmdb file");
        assert!(matches!(result, Err(MmdbError::MetadataNotFound)));
    }

    #[test]
    fn test_last_marker_wins() {
        let mut data = Vec::new();
        data.extend_from_slice(METADATA_MARKER);
        data.extend_from_slice(b"padding");
        data.extend_from_slice(METADATA_MARKER);
        assert_eq!(find_metadata_marker(&data).unwrap(), METADATA_MARKER.len() + 7);
    }
}
