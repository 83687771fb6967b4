//! Binary Serializer
//!
//! Turns a [`Trie`] into an MMDB v2.0 file:
//!
//! ```text
//! [search tree][16 zero bytes][data section]["\xAB\xCD\xEFMaxMind.com"][metadata map]
//! ```
//!
//! Records are interned in depth-first, left-first order so the same insert
//! sequence always yields the same bytes. Serialization does not consume the
//! trie.

use crate::data_section::{DataEncoder, DataValue};
use crate::error::SerializeError;
use crate::mmdb::types::{RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
use crate::trie::{NodePointer, RecordId, Trie, ROOT};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Summary of a finished serialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeStats {
    /// Nodes written after collapsing
    pub node_count: u32,
    /// Record size chosen
    pub record_size: RecordSize,
    /// Bytes in the data section
    pub data_section_size: usize,
    /// Distinct records stored
    pub unique_records: usize,
    /// Bytes written, metadata included
    pub total_size: u64,
}

/// A child slot after resolving aliases, reserved ranges and collapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    Data(u32),
    Node(u32),
}

/// Search tree ready to be written
struct Layout {
    /// Kept nodes in output order, children in arena ids
    nodes: Vec<(Slot, Slot)>,
    /// Arena id -> output node number
    numbers: Vec<Option<u32>>,
    data: DataEncoder,
}

impl Trie {
    /// Write the database to `sink`, returning the number of bytes written
    pub fn serialize<W: Write>(&self, sink: W) -> Result<u64, SerializeError> {
        self.serialize_with_stats(sink).map(|stats| stats.total_size)
    }

    /// Serialize into memory
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        let mut bytes = Vec::new();
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Write the database to `path`
    ///
    /// Output goes to a temporary file in the same directory which is renamed
    /// over `path` only once everything has been written.
    pub fn serialize_to_path(&self, path: impl AsRef<Path>) -> Result<SerializeStats, SerializeError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        let stats = {
            let mut writer = BufWriter::new(temp.as_file_mut());
            let stats = self.serialize_with_stats(&mut writer)?;
            writer.flush()?;
            stats
        };
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| SerializeError::Io(e.error))?;
        Ok(stats)
    }

    /// Write the database to `sink` and report what was written
    pub fn serialize_with_stats<W: Write>(&self, mut sink: W) -> Result<SerializeStats, SerializeError> {
        let layout = Layout::build(self)?;

        let node_count = layout.nodes.len() as u32;
        let data_len = layout.data.size();
        let required = node_count as u64 + DATA_SECTION_SEPARATOR_SIZE as u64 + data_len as u64;
        let record_size = choose_record_size(self.options().record_size, required)?;
        log::debug!(
            "Search tree: {} nodes, data section: {} bytes, record size: {} bits",
            node_count,
            data_len,
            record_size as u16
        );

        let tree = layout.write_tree(record_size);
        let unique_records = layout.data.unique_count();
        let data = layout.data.into_bytes();

        let prefix_len = (tree.len() + DATA_SECTION_SEPARATOR_SIZE + data.len() + METADATA_MARKER.len()) as u64;
        let metadata = self.encode_metadata(node_count, record_size, prefix_len)?;
        let total_size = prefix_len + metadata.len() as u64;

        sink.write_all(&tree)?;
        sink.write_all(&[0u8; DATA_SECTION_SEPARATOR_SIZE])?;
        sink.write_all(&data)?;
        sink.write_all(METADATA_MARKER)?;
        sink.write_all(&metadata)?;
        sink.flush()?;

        Ok(SerializeStats {
            node_count,
            record_size,
            data_section_size: data.len(),
            unique_records,
            total_size,
        })
    }

    /// Encode the metadata map
    ///
    /// `file_size` counts the metadata itself, so its encoded width is found
    /// by iterating until the total stops changing.
    fn encode_metadata(
        &self,
        node_count: u32,
        record_size: RecordSize,
        prefix_len: u64,
    ) -> Result<Vec<u8>, SerializeError> {
        let options = self.options();
        let build_epoch = options.build_epoch.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });

        let mut metadata = BTreeMap::new();
        metadata.insert("binary_format_major_version".to_string(), DataValue::Uint16(2));
        metadata.insert("binary_format_minor_version".to_string(), DataValue::Uint16(0));
        metadata.insert("build_epoch".to_string(), DataValue::Uint64(build_epoch));
        metadata.insert(
            "database_type".to_string(),
            DataValue::String(options.database_type.clone()),
        );
        metadata.insert(
            "description".to_string(),
            DataValue::Map(
                options
                    .description
                    .iter()
                    .map(|(lang, text)| (lang.clone(), DataValue::String(text.clone())))
                    .collect(),
            ),
        );
        metadata.insert(
            "languages".to_string(),
            DataValue::Array(
                options
                    .languages
                    .iter()
                    .map(|lang| DataValue::String(lang.clone()))
                    .collect(),
            ),
        );
        metadata.insert(
            "ip_version".to_string(),
            DataValue::Uint16(self.ip_version().number()),
        );
        metadata.insert("node_count".to_string(), DataValue::Uint32(node_count));
        metadata.insert(
            "record_size".to_string(),
            DataValue::Uint16(record_size as u16),
        );
        metadata.insert("ipv4_aliasing".to_string(), DataValue::Bool(self.ipv4_aliasing()));

        let mut file_size = prefix_len;
        loop {
            metadata.insert("file_size".to_string(), DataValue::Uint64(file_size));
            let encoded = DataEncoder::encode_standalone(&DataValue::Map(metadata.clone()))?;
            let total = prefix_len + encoded.len() as u64;
            if total == file_size {
                return Ok(encoded);
            }
            // The uint width only grows, so this settles within a few rounds
            file_size = total;
        }
    }
}

impl Layout {
    fn build(trie: &Trie) -> Result<Self, SerializeError> {
        let mut data = DataEncoder::new();
        let mut offsets: FxHashMap<RecordId, u32> = FxHashMap::default();
        intern(trie, ROOT, &mut data, &mut offsets)?;

        let mut children: Vec<Option<(Slot, Slot)>> = vec![None; trie.nodes.len()];
        let root = &trie.nodes[ROOT as usize];
        let left = resolve(trie, root.left, &offsets, &mut children);
        let right = resolve(trie, root.right, &offsets, &mut children);
        children[ROOT as usize] = Some((left, right));

        let mut order = Vec::new();
        let mut numbers = vec![None; trie.nodes.len()];
        number_preorder(ROOT, &children, &mut numbers, &mut order);

        let nodes = order
            .into_iter()
            .filter_map(|id| children[id as usize])
            .collect();

        Ok(Self {
            nodes,
            numbers,
            data,
        })
    }

    /// Encode the node array
    fn write_tree(&self, record_size: RecordSize) -> Vec<u8> {
        let node_count = self.nodes.len() as u32;
        let node_bytes = record_size.node_bytes();
        let mut tree = vec![0u8; self.nodes.len() * node_bytes];

        for (i, &(left, right)) in self.nodes.iter().enumerate() {
            let left = self.record_value(left, node_count);
            let right = self.record_value(right, node_count);
            let out = &mut tree[i * node_bytes..(i + 1) * node_bytes];
            match record_size {
                RecordSize::Bits24 => write_24bit_node(out, left, right),
                RecordSize::Bits28 => write_28bit_node(out, left, right),
                RecordSize::Bits32 => write_32bit_node(out, left, right),
            }
        }

        tree
    }

    /// Record value for a slot; capacity was checked before writing
    fn record_value(&self, slot: Slot, node_count: u32) -> u32 {
        match slot {
            Slot::Empty => node_count,
            Slot::Node(id) => self.numbers[id as usize].unwrap_or(node_count),
            Slot::Data(offset) => node_count + DATA_SECTION_SEPARATOR_SIZE as u32 + offset,
        }
    }
}

/// Encode every reachable record, depth-first and left before right
///
/// Records that were fully replaced are never reached and never written.
fn intern(
    trie: &Trie,
    node_id: u32,
    data: &mut DataEncoder,
    offsets: &mut FxHashMap<RecordId, u32>,
) -> Result<(), SerializeError> {
    let node = trie.nodes[node_id as usize];
    for pointer in [node.left, node.right] {
        match pointer {
            NodePointer::Node(child) => intern(trie, child, data, offsets)?,
            NodePointer::Data(record_id, _) => {
                if !offsets.contains_key(&record_id) {
                    let offset = data.encode(&trie.records[record_id as usize])?;
                    offsets.insert(record_id, offset);
                }
            }
            NodePointer::Empty | NodePointer::Reserved | NodePointer::Alias(_) => {}
        }
    }
    Ok(())
}

/// Resolve a slot, collapsing nodes whose children are the same terminal
fn resolve(
    trie: &Trie,
    pointer: NodePointer,
    offsets: &FxHashMap<RecordId, u32>,
    children: &mut [Option<(Slot, Slot)>],
) -> Slot {
    match pointer {
        NodePointer::Empty | NodePointer::Reserved => Slot::Empty,
        NodePointer::Data(record_id, _) => offsets
            .get(&record_id)
            .map_or(Slot::Empty, |&offset| Slot::Data(offset)),
        NodePointer::Alias(target) => Slot::Node(target),
        NodePointer::Node(id) => {
            let node = trie.nodes[id as usize];
            let left = resolve(trie, node.left, offsets, children);
            let right = resolve(trie, node.right, offsets, children);
            let pinned = trie.ipv4_root == Some(id);
            if !pinned && left == right && !matches!(left, Slot::Node(_)) {
                left
            } else {
                children[id as usize] = Some((left, right));
                Slot::Node(id)
            }
        }
    }
}

/// Assign output numbers in pre-order; aliased subtrees are numbered once
fn number_preorder(
    id: u32,
    children: &[Option<(Slot, Slot)>],
    numbers: &mut [Option<u32>],
    order: &mut Vec<u32>,
) {
    if numbers[id as usize].is_some() {
        return;
    }
    let Some((left, right)) = children[id as usize] else {
        return;
    };
    numbers[id as usize] = Some(order.len() as u32);
    order.push(id);
    for slot in [left, right] {
        if let Slot::Node(child) = slot {
            number_preorder(child, children, numbers, order);
        }
    }
}

/// Narrowest record size holding `required`, or the forced one if it fits
fn choose_record_size(forced: Option<RecordSize>, required: u64) -> Result<RecordSize, SerializeError> {
    match forced {
        Some(size) if required <= size.max_value() => Ok(size),
        Some(size) => Err(SerializeError::CapacityOverflow {
            required,
            record_size: size,
        }),
        None => RecordSize::smallest_for(required).ok_or(SerializeError::CapacityOverflow {
            required,
            record_size: RecordSize::Bits32,
        }),
    }
}

/// 24-bit node (6 bytes)
fn write_24bit_node(out: &mut [u8], left: u32, right: u32) {
    out[0..3].copy_from_slice(&left.to_be_bytes()[1..]);
    out[3..6].copy_from_slice(&right.to_be_bytes()[1..]);
}

/// 28-bit node (7 bytes)
///
/// Layout: [left low 24 bits][left high 4 | right high 4][right low 24 bits]
fn write_28bit_node(out: &mut [u8], left: u32, right: u32) {
    out[0..3].copy_from_slice(&left.to_be_bytes()[1..]);
    let left_high = ((left >> 24) & 0x0F) as u8;
    let right_high = ((right >> 24) & 0x0F) as u8;
    out[3] = (left_high << 4) | right_high;
    out[4..7].copy_from_slice(&right.to_be_bytes()[1..]);
}

/// 32-bit node (8 bytes)
fn write_32bit_node(out: &mut [u8], left: u32, right: u32) {
    out[0..4].copy_from_slice(&left.to_be_bytes());
    out[4..8].copy_from_slice(&right.to_be_bytes());
}
