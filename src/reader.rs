//! Database reader
//!
//! A small reader for the files this crate writes. It is used to check
//! builds and by the `inspect` command; it is not a full query client.

use crate::data_section::{DataDecoder, DataValue};
use crate::mmdb::format::{decode_metadata, MmdbHeader};
use crate::mmdb::{LookupResult, MmdbError, SearchTree};
use memmap2::Mmap;
use std::fs::File;
use std::net::IpAddr;
use std::path::Path;

/// Storage for database data - either owned or memory-mapped
enum Storage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v.as_slice(),
            Storage::Mmap(m) => &m[..],
        }
    }
}

/// Reader over a serialized database
///
/// # Example
/// ```
/// use geoforge::{IpVersion, Reader, Trie};
///
/// let mut trie = Trie::new(IpVersion::V4, false, true);
/// let record: geoforge::DataValue = vec![("country", "NZ")].into_iter().collect();
/// trie.insert("203.0.113.0/24".parse()?, record.clone())?;
///
/// let reader = Reader::from_bytes(trie.to_bytes()?)?;
/// let (found, _prefix_len) = reader.lookup("203.0.113.9".parse()?)?.unwrap();
/// assert_eq!(found, record);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Reader {
    data: Storage,
    header: MmdbHeader,
}

impl Reader {
    /// Open a database file using memory mapping
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MmdbError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            MmdbError::IoError(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
            MmdbError::IoError(format!("Failed to mmap {}: {}", path.display(), e))
        })?;

        Self::from_storage(Storage::Mmap(mmap))
    }

    /// Create a reader from raw bytes
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, MmdbError> {
        Self::from_storage(Storage::Owned(data))
    }

    fn from_storage(data: Storage) -> Result<Self, MmdbError> {
        let header = MmdbHeader::from_file(data.as_slice())?;
        Ok(Self { data, header })
    }

    /// Parsed header fields
    pub fn header(&self) -> &MmdbHeader {
        &self.header
    }

    /// Raw file contents
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Full metadata map
    pub fn metadata(&self) -> Result<DataValue, MmdbError> {
        decode_metadata(self.data.as_slice(), self.header.metadata_start)
    }

    /// Find the data offset and prefix length for `ip`
    pub fn lookup_offset(&self, ip: IpAddr) -> Result<Option<LookupResult>, MmdbError> {
        SearchTree::new(self.data.as_slice(), &self.header).lookup(ip)
    }

    /// Look up `ip`, returning its record and the matched prefix length
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<(DataValue, u8)>, MmdbError> {
        match self.lookup_offset(ip)? {
            Some(result) => {
                let data = self.decode(result.data_offset)?;
                Ok(Some((data, result.prefix_len)))
            }
            None => Ok(None),
        }
    }

    /// Decode the value at a data-section offset
    pub fn decode(&self, offset: u32) -> Result<DataValue, MmdbError> {
        let section = self.header.data_section(self.data.as_slice());
        DataDecoder::new(section)
            .decode(offset)
            .map_err(|e| MmdbError::DecodeError(format!("offset {}: {}", offset, e)))
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("header", &self.header)
            .field("size", &self.data.as_slice().len())
            .finish()
    }
}
