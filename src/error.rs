/// Error types for the geoforge library
use crate::mmdb::types::RecordSize;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors returned by a single trie insertion
///
/// An insertion error never leaves the trie in a partially modified state
/// visible to other networks; callers decide whether to skip or abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertError {
    /// Prefix length is out of range for the address family
    InvalidPrefixLength {
        /// Requested prefix length
        prefix_len: u8,
        /// Bit width of the address family
        max: u8,
    },

    /// Network text could not be parsed as an address or CIDR block
    InvalidNetwork(String),

    /// Address family does not fit the trie (IPv6 into an IPv4 trie)
    AddressFamily(String),

    /// Records must be maps
    NotAMap,

    /// Network is, or lies inside, a reserved range excluded from this build
    ReservedNetwork(String),

    /// Network is, or lies inside, a range aliased to the IPv4 subtree
    AliasedNetwork(String),
}

impl fmt::Display for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::InvalidPrefixLength { prefix_len, max } => {
                write!(f, "Invalid prefix length: /{} exceeds maximum /{}", prefix_len, max)
            }
            InsertError::InvalidNetwork(msg) => write!(f, "Invalid network: {}", msg),
            InsertError::AddressFamily(msg) => write!(f, "Address family mismatch: {}", msg),
            InsertError::NotAMap => write!(f, "Record must be a map"),
            InsertError::ReservedNetwork(net) => {
                write!(f, "Cannot insert into reserved network {}", net)
            }
            InsertError::AliasedNetwork(net) => {
                write!(f, "Cannot insert into aliased network {}", net)
            }
        }
    }
}

impl std::error::Error for InsertError {}

/// Errors raised while writing the finished database
#[derive(Debug)]
pub enum SerializeError {
    /// The tree plus data section does not fit the record size
    CapacityOverflow {
        /// Largest record value the layout needs
        required: u64,
        /// Record size that was too small (the widest one when auto-selecting)
        record_size: RecordSize,
    },

    /// A string, byte array, map or array has more elements than a
    /// data-section control byte can express
    ValueTooLarge {
        /// Byte length or entry count of the value
        size: usize,
        /// Largest encodable size
        max: usize,
    },

    /// Writing to the destination failed
    Io(io::Error),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializeError::CapacityOverflow {
                required,
                record_size,
            } => write!(
                f,
                "Capacity overflow: record value {} does not fit {}-bit records",
                required, *record_size as u16
            ),
            SerializeError::ValueTooLarge { size, max } => write!(
                f,
                "Value too large: size {} exceeds the encodable maximum of {}",
                size, max
            ),
            SerializeError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for SerializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SerializeError {
    fn from(err: io::Error) -> Self {
        SerializeError::Io(err)
    }
}

/// Errors raised by the ingestion layer
#[derive(Debug)]
pub enum IngestError {
    /// Reading an input failed
    Io(io::Error),

    /// A line was not a valid JSON record
    Json {
        /// 1-based line number within the input
        line: u64,
        /// Decoder message
        message: String,
    },

    /// The record's network was rejected
    Network {
        /// 1-based line number within the input
        line: u64,
        /// Underlying insertion error
        source: InsertError,
    },

    /// An error tied to a specific input file
    Input {
        /// Input path
        path: PathBuf,
        /// What went wrong while reading it
        source: Box<IngestError>,
    },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Io(e) => write!(f, "I/O error: {}", e),
            IngestError::Json { line, message } => {
                write!(f, "Malformed record on line {}: {}", line, message)
            }
            IngestError::Network { line, source } => write!(f, "Line {}: {}", line, source),
            IngestError::Input { path, source } => write!(f, "{}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Io(e) => Some(e),
            IngestError::Network { source, .. } => Some(source),
            IngestError::Input { source, .. } => Some(source.as_ref()),
            IngestError::Json { .. } => None,
        }
    }
}

impl From<io::Error> for IngestError {
    fn from(err: io::Error) -> Self {
        IngestError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_error_display() {
        let err = InsertError::InvalidPrefixLength {
            prefix_len: 33,
            max: 32,
        };
        assert_eq!(err.to_string(), "Invalid prefix length: /33 exceeds maximum /32");

        let err = InsertError::ReservedNetwork("10.0.0.0/8".to_string());
        assert!(err.to_string().contains("10.0.0.0/8"));
    }

    #[test]
    fn test_serialize_error_from_io() {
        let err: SerializeError = io::Error::new(io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, SerializeError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_ingest_error_names_input() {
        let err = IngestError::Input {
            path: PathBuf::from("part-000.json.gz"),
            source: Box::new(IngestError::Json {
                line: 7,
                message: "expected value".to_string(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "part-000.json.gz: Malformed record on line 7: expected value"
        );
    }
}
