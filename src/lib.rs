//! Geoforge - IP Geolocation Database Builder
//!
//! Geoforge accumulates network prefix to record associations in a binary
//! trie and writes them out as a MaxMind DB (MMDB v2.0) file that standard
//! MMDB readers can query with longest-prefix matching.
//!
//! # Quick Start
//!
//! ```rust
//! use geoforge::{DataValue, IpVersion, Reader, Trie};
//!
//! // IPv6 tree with IPv4 aliasing, reserved networks allowed
//! let mut trie = Trie::new(IpVersion::V6, true, true);
//!
//! let oceania: DataValue = vec![("continent", "OC")].into_iter().collect();
//! let australia: DataValue = vec![("country", "AU")].into_iter().collect();
//! trie.insert("1.0.0.0/8".parse()?, oceania)?;
//! trie.insert("1.1.0.0/16".parse()?, australia.clone())?;
//!
//! let bytes = trie.to_bytes()?;
//!
//! let reader = Reader::from_bytes(bytes)?;
//! let (record, _) = reader.lookup("::ffff:1.1.1.1".parse()?)?.unwrap();
//! assert_eq!(record, australia);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  Database File Format                │
//! ├──────────────────────────────────────┤
//! │  1. Search Tree (binary trie)        │
//! │  2. 16 zero bytes                    │
//! │  3. Data Section (deduplicated)      │
//! │  4. "\xAB\xCD\xEFMaxMind.com"         │
//! │  5. Metadata map                     │
//! └──────────────────────────────────────┘
//! ```
//!
//! Building is a batch job: many [`Trie::insert`] calls from a single owner,
//! then one [`Trie::serialize`]. The [`ingest`] module decodes JSON-lines
//! dumps on worker threads and funnels the records to that owner.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Data section encoding/decoding
pub mod data_section;
/// Error types for building and reading databases
pub mod error;
pub mod file_reader;
pub mod ingest;
/// MMDB format types and lookup support
pub mod mmdb;
pub mod network;
pub mod reader;
pub mod reserved;
pub mod serializer;
pub mod trie;

// Re-exports for Rust consumers

/// Data value type for database records
pub use crate::data_section::DataValue;

pub use crate::error::{IngestError, InsertError, SerializeError};
pub use crate::ingest::{IngestStats, MalformedPolicy};
pub use crate::mmdb::{IpVersion, MmdbError, RecordSize};
pub use crate::network::Network;
pub use crate::reader::Reader;
pub use crate::serializer::SerializeStats;
pub use crate::trie::{Trie, TrieOptions};

// Version information
/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
