//! Data section encoding and decoding
//!
//! Records attached to networks are stored in the MMDB data section format:
//! every value starts with a control byte holding a 3-bit type and a 5-bit
//! size, followed by the payload. Types above 7 use an extended control
//! sequence (type bits zero, then a byte holding `type - 7`).
//!
//! # Supported Types
//!
//! - **String**: UTF-8 text, length-prefixed
//! - **Double** / **Float**: IEEE 754, big-endian
//! - **Bytes**: raw byte arrays
//! - **Uint16** / **Uint32** / **Uint64** / **Uint128**: unsigned integers,
//!   written with leading zero bytes stripped
//! - **Int32**: signed integer
//! - **Map**: string keys, written in sorted key order
//! - **Array**: ordered values
//! - **Bool**: value carried in the size field
//!
//! Pointers are never written by the encoder but are followed by the decoder,
//! so databases produced by other writers decode as well.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::error::SerializeError;
use crate::mmdb::types::RecordSize;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

const TYPE_POINTER: u8 = 1;
const TYPE_STRING: u8 = 2;
const TYPE_DOUBLE: u8 = 3;
const TYPE_BYTES: u8 = 4;
const TYPE_UINT16: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_MAP: u8 = 7;
const TYPE_INT32: u8 = 8;
const TYPE_UINT64: u8 = 9;
const TYPE_UINT128: u8 = 10;
const TYPE_ARRAY: u8 = 11;
const TYPE_BOOL: u8 = 14;
const TYPE_FLOAT: u8 = 15;

/// Nesting limit while decoding (maps, arrays and pointers)
const MAX_DECODE_DEPTH: usize = 512;

/// A value stored in the data section
///
/// Records are `DataValue::Map`s; any shape of nested maps and arrays is
/// allowed. Equality is structural, and because maps are `BTreeMap`s two maps
/// with the same entries compare (and encode) identically regardless of the
/// order they were filled in.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map (string keys only)
    Map(BTreeMap<String, DataValue>),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// Empty map, the usual starting point for a record
    pub fn new_map() -> Self {
        DataValue::Map(BTreeMap::new())
    }

    /// Borrow the entries if this is a map
    pub fn as_map(&self) -> Option<&BTreeMap<String, DataValue>> {
        match self {
            DataValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a key if this is a map
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Borrow the text if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Widen any unsigned integer variant to u64
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataValue::Uint16(n) => Some(*n as u64),
            DataValue::Uint32(n) => Some(*n as u64),
            DataValue::Uint64(n) => Some(*n),
            DataValue::Uint128(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Convert a JSON value
    ///
    /// Non-negative integers become `Uint32` (or `Uint64` when they do not
    /// fit), negative integers `Int32` (or `Double`), other numbers `Double`.
    /// JSON has no MMDB counterpart for `null`: it yields `None`, and null
    /// members of objects are dropped.
    pub fn from_json(json: &serde_json::Value) -> Option<DataValue> {
        match json {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(DataValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Some(match u32::try_from(u) {
                        Ok(small) => DataValue::Uint32(small),
                        Err(_) => DataValue::Uint64(u),
                    })
                } else if let Some(i) = n.as_i64() {
                    Some(match i32::try_from(i) {
                        Ok(small) => DataValue::Int32(small),
                        Err(_) => DataValue::Double(i as f64),
                    })
                } else {
                    n.as_f64().map(DataValue::Double)
                }
            }
            serde_json::Value::String(s) => Some(DataValue::String(s.clone())),
            serde_json::Value::Array(items) => Some(DataValue::Array(
                items.iter().filter_map(DataValue::from_json).collect(),
            )),
            serde_json::Value::Object(obj) => Some(DataValue::Map(
                obj.iter()
                    .filter_map(|(k, v)| DataValue::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    /// Convert to JSON for display
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            DataValue::String(s) => json!(s),
            DataValue::Double(d) => json!(d),
            DataValue::Bytes(b) => json!(b),
            DataValue::Uint16(u) => json!(u),
            DataValue::Uint32(u) => json!(u),
            DataValue::Uint64(u) => json!(u),
            DataValue::Uint128(u) => json!(u.to_string()),
            DataValue::Int32(i) => json!(i),
            DataValue::Bool(b) => json!(b),
            DataValue::Float(f) => json!(f),
            DataValue::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            DataValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(DataValue::to_json).collect())
            }
        }
    }
}

impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        DataValue::String(s.to_string())
    }
}

impl From<String> for DataValue {
    fn from(s: String) -> Self {
        DataValue::String(s)
    }
}

impl From<bool> for DataValue {
    fn from(b: bool) -> Self {
        DataValue::Bool(b)
    }
}

impl From<f32> for DataValue {
    fn from(f: f32) -> Self {
        DataValue::Float(f)
    }
}

impl From<f64> for DataValue {
    fn from(d: f64) -> Self {
        DataValue::Double(d)
    }
}

impl From<u16> for DataValue {
    fn from(n: u16) -> Self {
        DataValue::Uint16(n)
    }
}

impl From<u32> for DataValue {
    fn from(n: u32) -> Self {
        DataValue::Uint32(n)
    }
}

impl From<u64> for DataValue {
    fn from(n: u64) -> Self {
        DataValue::Uint64(n)
    }
}

impl From<i32> for DataValue {
    fn from(n: i32) -> Self {
        DataValue::Int32(n)
    }
}

impl From<Vec<DataValue>> for DataValue {
    fn from(items: Vec<DataValue>) -> Self {
        DataValue::Array(items)
    }
}

impl From<BTreeMap<String, DataValue>> for DataValue {
    fn from(map: BTreeMap<String, DataValue>) -> Self {
        DataValue::Map(map)
    }
}

impl<K: Into<String>, V: Into<DataValue>> FromIterator<(K, V)> for DataValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        DataValue::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Largest payload size or entry count a control byte can express
pub const MAX_VALUE_SIZE: usize = 29 + 256 + 65_536 + 0xFF_FFFF;

/// Data section encoder
///
/// Builds a data section by encoding values and tracking offsets.
/// Identical encodings are interned: the second and later occurrences return
/// the offset of the first copy and write nothing.
pub struct DataEncoder {
    /// Encoded data buffer
    buffer: Vec<u8>,
    /// Map from serialized value to offset (for deduplication)
    dedup_map: FxHashMap<Vec<u8>, u32>,
}

impl DataEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            dedup_map: FxHashMap::default(),
        }
    }

    /// Encode a value and return its offset
    ///
    /// If an identical value was previously encoded, returns the existing
    /// offset. Fails when the section would outgrow 32-bit offsets.
    pub fn encode(&mut self, value: &DataValue) -> Result<u32, SerializeError> {
        let mut temp = Vec::new();
        Self::encode_to_buffer(value, &mut temp)?;

        if let Some(&offset) = self.dedup_map.get(&temp) {
            return Ok(offset);
        }

        let offset = u32::try_from(self.buffer.len()).map_err(|_| {
            SerializeError::CapacityOverflow {
                required: self.buffer.len() as u64,
                record_size: RecordSize::Bits32,
            }
        })?;
        self.buffer.extend_from_slice(&temp);
        self.dedup_map.insert(temp, offset);
        Ok(offset)
    }

    /// Encode a single value without interning (used for metadata)
    pub fn encode_standalone(value: &DataValue) -> Result<Vec<u8>, SerializeError> {
        let mut buffer = Vec::new();
        Self::encode_to_buffer(value, &mut buffer)?;
        Ok(buffer)
    }

    /// Get the final encoded data section
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get current buffer size
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Number of distinct values stored
    pub fn unique_count(&self) -> usize {
        self.dedup_map.len()
    }

    fn encode_to_buffer(value: &DataValue, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        match value {
            DataValue::String(s) => Self::encode_string(s, buffer)?,
            DataValue::Double(d) => {
                Self::write_control(TYPE_DOUBLE, 8, buffer)?;
                buffer.extend_from_slice(&d.to_be_bytes());
            }
            DataValue::Bytes(b) => {
                Self::write_control(TYPE_BYTES, b.len(), buffer)?;
                buffer.extend_from_slice(b);
            }
            DataValue::Uint16(n) => Self::encode_uint(TYPE_UINT16, &n.to_be_bytes(), buffer)?,
            DataValue::Uint32(n) => Self::encode_uint(TYPE_UINT32, &n.to_be_bytes(), buffer)?,
            DataValue::Map(m) => {
                Self::write_control(TYPE_MAP, m.len(), buffer)?;
                // BTreeMap iterates in key order, which keeps output canonical
                for (key, value) in m {
                    Self::encode_string(key, buffer)?;
                    Self::encode_to_buffer(value, buffer)?;
                }
            }
            DataValue::Int32(n) => {
                if *n >= 0 {
                    Self::encode_uint(TYPE_INT32, &n.to_be_bytes(), buffer)?;
                } else {
                    // Negative values need all four bytes for the sign
                    Self::write_control(TYPE_INT32, 4, buffer)?;
                    buffer.extend_from_slice(&n.to_be_bytes());
                }
            }
            DataValue::Uint64(n) => Self::encode_uint(TYPE_UINT64, &n.to_be_bytes(), buffer)?,
            DataValue::Uint128(n) => Self::encode_uint(TYPE_UINT128, &n.to_be_bytes(), buffer)?,
            DataValue::Array(a) => {
                Self::write_control(TYPE_ARRAY, a.len(), buffer)?;
                for value in a {
                    Self::encode_to_buffer(value, buffer)?;
                }
            }
            DataValue::Bool(b) => Self::write_control(TYPE_BOOL, *b as usize, buffer)?,
            DataValue::Float(f) => {
                Self::write_control(TYPE_FLOAT, 4, buffer)?;
                buffer.extend_from_slice(&f.to_be_bytes());
            }
        }
        Ok(())
    }

    fn encode_string(s: &str, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        let bytes = s.as_bytes();
        Self::write_control(TYPE_STRING, bytes.len(), buffer)?;
        buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Unsigned payloads drop their leading zero bytes
    fn encode_uint(type_id: u8, be_bytes: &[u8], buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        let skip = be_bytes.iter().take_while(|&&b| b == 0).count();
        let significant = &be_bytes[skip..];
        Self::write_control(type_id, significant.len(), buffer)?;
        buffer.extend_from_slice(significant);
        Ok(())
    }

    /// Write the control byte, the extended type byte and any size bytes
    ///
    /// Sizes above [`MAX_VALUE_SIZE`] have no encoding.
    fn write_control(type_id: u8, size: usize, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        if size > MAX_VALUE_SIZE {
            return Err(SerializeError::ValueTooLarge {
                size,
                max: MAX_VALUE_SIZE,
            });
        }
        let type_bits = if type_id <= 7 { type_id << 5 } else { 0 };

        let mut extra = [0u8; 3];
        let (size_bits, extra_len) = if size < 29 {
            (size as u8, 0)
        } else if size < 29 + 256 {
            extra[0] = (size - 29) as u8;
            (29, 1)
        } else if size < 29 + 256 + 65536 {
            let adjusted = (size - 29 - 256) as u16;
            extra[..2].copy_from_slice(&adjusted.to_be_bytes());
            (30, 2)
        } else {
            let adjusted = (size - 29 - 256 - 65536) as u32;
            extra.copy_from_slice(&adjusted.to_be_bytes()[1..]);
            (31, 3)
        };

        buffer.push(type_bits | size_bits);
        if type_id > 7 {
            buffer.push(type_id - 7);
        }
        buffer.extend_from_slice(&extra[..extra_len]);
        Ok(())
    }
}

impl Default for DataEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Data section decoder
///
/// Decodes values from an encoded data section. Pointers are resolved
/// relative to the start of `buffer`.
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder for a data section
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Decode a value at the given offset
    pub fn decode(&self, offset: u32) -> Result<DataValue, &'static str> {
        let mut cursor = offset as usize;
        self.decode_at(&mut cursor, 0)
    }

    fn decode_at(&self, cursor: &mut usize, depth: usize) -> Result<DataValue, &'static str> {
        if depth > MAX_DECODE_DEPTH {
            return Err("Data nested too deeply");
        }

        let ctrl = self.read_byte(cursor)?;
        let mut type_id = ctrl >> 5;

        if type_id == TYPE_POINTER {
            let target = self.decode_pointer(cursor, ctrl)?;
            let mut pointed = target as usize;
            return self.decode_at(&mut pointed, depth + 1);
        }

        if type_id == 0 {
            let ext = self.read_byte(cursor)?;
            type_id = ext.checked_add(7).ok_or("Invalid extended type")?;
            if type_id <= 7 {
                return Err("Invalid extended type");
            }
        }

        let size = self.decode_size(cursor, ctrl & 0x1F)?;

        match type_id {
            TYPE_STRING => {
                let bytes = self.take(cursor, size)?;
                let s = std::str::from_utf8(bytes).map_err(|_| "Invalid UTF-8")?;
                Ok(DataValue::String(s.to_string()))
            }
            TYPE_DOUBLE => {
                if size != 8 {
                    return Err("Invalid double size");
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(self.take(cursor, 8)?);
                Ok(DataValue::Double(f64::from_be_bytes(bytes)))
            }
            TYPE_BYTES => Ok(DataValue::Bytes(self.take(cursor, size)?.to_vec())),
            TYPE_UINT16 => Ok(DataValue::Uint16(self.read_uint(cursor, size, 2)? as u16)),
            TYPE_UINT32 => Ok(DataValue::Uint32(self.read_uint(cursor, size, 4)? as u32)),
            TYPE_MAP => {
                let mut map = BTreeMap::new();
                for _ in 0..size {
                    let key = match self.decode_at(cursor, depth + 1)? {
                        DataValue::String(s) => s,
                        _ => return Err("Map key must be string"),
                    };
                    let value = self.decode_at(cursor, depth + 1)?;
                    map.insert(key, value);
                }
                Ok(DataValue::Map(map))
            }
            TYPE_INT32 => {
                let raw = self.read_uint(cursor, size, 4)? as u32;
                Ok(DataValue::Int32(raw as i32))
            }
            TYPE_UINT64 => Ok(DataValue::Uint64(self.read_uint(cursor, size, 8)? as u64)),
            TYPE_UINT128 => Ok(DataValue::Uint128(self.read_uint(cursor, size, 16)?)),
            TYPE_ARRAY => {
                let mut array = Vec::with_capacity(size.min(1024));
                for _ in 0..size {
                    array.push(self.decode_at(cursor, depth + 1)?);
                }
                Ok(DataValue::Array(array))
            }
            TYPE_BOOL => match size {
                0 => Ok(DataValue::Bool(false)),
                1 => Ok(DataValue::Bool(true)),
                _ => Err("Invalid bool size"),
            },
            TYPE_FLOAT => {
                if size != 4 {
                    return Err("Invalid float size");
                }
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(self.take(cursor, 4)?);
                Ok(DataValue::Float(f32::from_be_bytes(bytes)))
            }
            _ => Err("Unknown data type"),
        }
    }

    /// Pointer layout: `001SSVVV` followed by `SS + 1` bytes
    fn decode_pointer(&self, cursor: &mut usize, ctrl: u8) -> Result<u32, &'static str> {
        let size = (ctrl >> 3) & 0x3;
        let high = (ctrl & 0x7) as u32;
        let bytes = self.take(cursor, size as usize + 1)?;
        let value = bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);

        Ok(match size {
            0 => (high << 8) | value,
            1 => ((high << 16) | value) + 2048,
            2 => ((high << 24) | value) + 526_336,
            _ => value,
        })
    }

    fn decode_size(&self, cursor: &mut usize, size_bits: u8) -> Result<usize, &'static str> {
        match size_bits {
            0..=28 => Ok(size_bits as usize),
            29 => Ok(29 + self.read_byte(cursor)? as usize),
            30 => {
                let b = self.take(cursor, 2)?;
                Ok(29 + 256 + (((b[0] as usize) << 8) | b[1] as usize))
            }
            _ => {
                let b = self.take(cursor, 3)?;
                Ok(29 + 256 + 65536
                    + (((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize))
            }
        }
    }

    fn read_uint(&self, cursor: &mut usize, size: usize, max: usize) -> Result<u128, &'static str> {
        if size > max {
            return Err("Integer wider than its type");
        }
        let bytes = self.take(cursor, size)?;
        Ok(bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    fn read_byte(&self, cursor: &mut usize) -> Result<u8, &'static str> {
        let byte = *self.buffer.get(*cursor).ok_or("Cursor out of bounds")?;
        *cursor += 1;
        Ok(byte)
    }

    fn take(&self, cursor: &mut usize, len: usize) -> Result<&'a [u8], &'static str> {
        let end = cursor.checked_add(len).ok_or("Data out of bounds")?;
        let bytes = self.buffer.get(*cursor..end).ok_or("Data out of bounds")?;
        *cursor = end;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &DataValue) -> DataValue {
        let mut encoder = DataEncoder::new();
        let offset = encoder.encode(value).unwrap();
        let bytes = encoder.into_bytes();
        DataDecoder::new(&bytes).decode(offset).unwrap()
    }

    #[test]
    fn test_encode_decode_all_types() {
        let values = vec![
            DataValue::String("hello".to_string()),
            DataValue::Uint16(12345),
            DataValue::Uint32(0xDEADBEEF),
            DataValue::Uint64(0x123456789ABCDEF0),
            DataValue::Uint128(0x0123456789ABCDEF0123456789ABCDEF),
            DataValue::Int32(-42),
            DataValue::Int32(7),
            DataValue::Double(3.14159265359),
            DataValue::Float(2.71828),
            DataValue::Bool(true),
            DataValue::Bool(false),
            DataValue::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF]),
            DataValue::Uint32(0),
        ];

        let mut encoder = DataEncoder::new();
        let offsets: Vec<u32> = values.iter().map(|v| encoder.encode(v).unwrap()).collect();
        let bytes = encoder.into_bytes();
        let decoder = DataDecoder::new(&bytes);

        for (offset, expected) in offsets.iter().zip(values.iter()) {
            assert_eq!(&decoder.decode(*offset).unwrap(), expected);
        }
    }

    #[test]
    fn test_wire_layout() {
        // uint16 300: type 5, two significant bytes
        assert_eq!(
            DataEncoder::encode_standalone(&DataValue::Uint16(300)).unwrap(),
            vec![0xA2, 0x01, 0x2C]
        );
        // uint32 zero has no payload
        assert_eq!(
            DataEncoder::encode_standalone(&DataValue::Uint32(0)).unwrap(),
            vec![0xC0]
        );
        // uint64 5: extended type 9 -> 0x02
        assert_eq!(
            DataEncoder::encode_standalone(&DataValue::Uint64(5)).unwrap(),
            vec![0x01, 0x02, 0x05]
        );
        // bool: extended type 14 -> 0x07, value in size bits
        assert_eq!(
            DataEncoder::encode_standalone(&DataValue::Bool(true)).unwrap(),
            vec![0x01, 0x07]
        );
        // float: extended type 15 -> 0x08
        let float = DataEncoder::encode_standalone(&DataValue::Float(1.0)).unwrap();
        assert_eq!(&float[..2], &[0x04, 0x08]);
        assert_eq!(&float[2..], &1.0f32.to_be_bytes());
        // array of one string
        assert_eq!(
            DataEncoder::encode_standalone(&DataValue::Array(vec!["a".into()])).unwrap(),
            vec![0x01, 0x04, 0x41, b'a']
        );
    }

    #[test]
    fn test_map_key_order_is_canonical() {
        let a: DataValue = vec![("zeta", 1u32), ("alpha", 2u32)].into_iter().collect();
        let b: DataValue = vec![("alpha", 2u32), ("zeta", 1u32)].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(
            DataEncoder::encode_standalone(&a).unwrap(),
            DataEncoder::encode_standalone(&b).unwrap()
        );

        let bytes = DataEncoder::encode_standalone(&a).unwrap();
        // Map with two entries, first key is "alpha"
        assert_eq!(bytes[0], 0xE2);
        assert_eq!(&bytes[1..7], &[0x45, b'a', b'l', b'p', b'h', b'a']);
    }

    #[test]
    fn test_encode_decode_nested_record() {
        let mut location = BTreeMap::new();
        location.insert("latitude".to_string(), DataValue::Float(47.6));
        location.insert("longitude".to_string(), DataValue::Float(-122.3));
        location.insert("time_zone".to_string(), "America/Los_Angeles".into());

        let mut record = BTreeMap::new();
        record.insert("location".to_string(), DataValue::Map(location));
        record.insert(
            "tags".to_string(),
            DataValue::Array(vec!["residential".into(), DataValue::Uint16(3)]),
        );
        let value = DataValue::Map(record);

        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_deduplication() {
        let mut encoder = DataEncoder::new();

        let value: DataValue = vec![("country", "US")].into_iter().collect();
        let offset1 = encoder.encode(&value).unwrap();
        let size_after_first = encoder.size();
        let offset2 = encoder.encode(&value.clone()).unwrap();

        assert_eq!(offset1, offset2);
        assert_eq!(encoder.size(), size_after_first);
        assert_eq!(encoder.unique_count(), 1);

        let other: DataValue = vec![("country", "CA")].into_iter().collect();
        let offset3 = encoder.encode(&other).unwrap();
        assert_ne!(offset1, offset3);
        assert_eq!(encoder.unique_count(), 2);
    }

    #[test]
    fn test_large_strings() {
        let short = "x".repeat(28);
        let medium = "x".repeat(100);
        let long = "x".repeat(1000);
        let huge = "x".repeat(70_000);

        for s in [short, medium, long, huge] {
            let value = DataValue::String(s);
            assert_eq!(round_trip(&value), value);
        }
    }

    #[test]
    fn test_largest_encodable_size() {
        let value = DataValue::String("x".repeat(MAX_VALUE_SIZE));
        let bytes = DataEncoder::encode_standalone(&value).unwrap();
        assert_eq!(&bytes[..4], &[0x40 | 31, 0xFF, 0xFF, 0xFF]);
        assert_eq!(bytes.len(), 4 + MAX_VALUE_SIZE);
        assert_eq!(DataDecoder::new(&bytes).decode(0).unwrap(), value);
    }

    #[test]
    fn test_oversized_values_rejected() {
        let mut encoder = DataEncoder::new();
        encoder.encode(&DataValue::from("kept")).unwrap();
        let before = encoder.size();

        let string = DataValue::String("x".repeat(MAX_VALUE_SIZE + 1));
        assert!(matches!(
            encoder.encode(&string),
            Err(SerializeError::ValueTooLarge { size, max })
                if size == MAX_VALUE_SIZE + 1 && max == MAX_VALUE_SIZE
        ));

        let bytes = DataValue::Bytes(vec![0; MAX_VALUE_SIZE + 1]);
        assert!(matches!(
            encoder.encode(&bytes),
            Err(SerializeError::ValueTooLarge { .. })
        ));

        // Nested too deep to see from the outside
        let nested: DataValue = vec![("blob", string)].into_iter().collect();
        assert!(matches!(
            DataEncoder::encode_standalone(&nested),
            Err(SerializeError::ValueTooLarge { .. })
        ));

        // Failed encodes leave nothing behind
        assert_eq!(encoder.size(), before);
        assert_eq!(encoder.unique_count(), 1);
    }

    #[test]
    fn test_decode_pointers() {
        // offset 0: "hi"; then pointers of each size back to offset 0
        let mut data = vec![0x42, b'h', b'i'];
        let ptr_small = data.len() as u32;
        data.extend_from_slice(&[0x20, 0x00]);
        let decoder = DataDecoder::new(&data);
        assert_eq!(decoder.decode(ptr_small).unwrap(), DataValue::from("hi"));

        // 32-bit pointer form
        let mut data = vec![0x42, b'h', b'i'];
        let ptr_wide = data.len() as u32;
        data.extend_from_slice(&[0x38, 0x00, 0x00, 0x00, 0x00]);
        let decoder = DataDecoder::new(&data);
        assert_eq!(decoder.decode(ptr_wide).unwrap(), DataValue::from("hi"));
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = DataEncoder::encode_standalone(&DataValue::from("truncate me")).unwrap();
        let decoder = DataDecoder::new(&bytes[..4]);
        assert!(decoder.decode(0).is_err());
        assert!(DataDecoder::new(&[]).decode(0).is_err());
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({
            "name": "Europe",
            "count": 3,
            "big": 5_000_000_000u64,
            "neg": -4,
            "ratio": 0.5,
            "gone": null,
            "list": [1, "two", true]
        });

        let value = DataValue::from_json(&json).unwrap();
        assert_eq!(value.get("name"), Some(&DataValue::from("Europe")));
        assert_eq!(value.get("count"), Some(&DataValue::Uint32(3)));
        assert_eq!(value.get("big"), Some(&DataValue::Uint64(5_000_000_000)));
        assert_eq!(value.get("neg"), Some(&DataValue::Int32(-4)));
        assert_eq!(value.get("ratio"), Some(&DataValue::Double(0.5)));
        assert!(value.get("gone").is_none());
        assert_eq!(value.to_json()["list"], serde_json::json!([1, "two", true]));
    }
}
