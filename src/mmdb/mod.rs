//! MaxMind DB (MMDB) format support
//!
//! The writer emits MMDB v2.0 files; this module holds the shared format
//! types and the small reader used to verify them.
//!
//! ## Architecture
//!
//! - **types**: record sizes, IP version, marker constants
//! - **format**: metadata marker search and header extraction
//! - **tree**: search tree traversal for IP lookups
//!
//! Data decoding reuses `crate::data_section::DataDecoder`.

pub mod format;
pub mod tree;
pub mod types;

pub use format::{find_metadata_marker, MmdbHeader};
pub use tree::{LookupResult, SearchTree};
pub use types::{IpVersion, MmdbError, RecordSize, METADATA_MARKER};
