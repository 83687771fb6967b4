//! Prefix Trie
//!
//! Binary trie over address bits with arena allocation. Each node has two
//! slots (bit 0 and bit 1). A slot is empty, points at another node, or holds
//! a record together with the prefix length it was inserted with. Tracking the
//! prefix length lets overlapping inserts resolve to the most specific
//! network regardless of insertion order.
//!
//! IPv4 networks in an IPv6 trie live under `::/96`. With aliasing enabled,
//! `::ffff:0:0/96` and `2002::/16` are pinned as aliases of that subtree.

use crate::data_section::DataValue;
use crate::error::InsertError;
use crate::mmdb::types::{IpVersion, RecordSize};
use crate::network::{addr_bits, Network};
use crate::reserved;
use std::collections::BTreeMap;
use std::net::IpAddr;

pub(crate) const ROOT: u32 = 0;

/// Index into the trie's record arena
pub(crate) type RecordId = u32;

/// Ranges aliased to the IPv4 subtree: `::ffff:0:0/96` and `2002::/16`
const IPV4_ALIASES: [(u128, u8); 2] = [(0xffff << 32, 96), (0x2002 << 112, 16)];

/// Contents of one child slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodePointer {
    /// No record (not found)
    Empty,
    /// Another node in the arena
    Node(u32),
    /// Record and the prefix length of the network that stored it
    Data(RecordId, u8),
    /// Reserved range excluded from this build
    Reserved,
    /// Alias of the pinned IPv4 subtree root
    Alias(u32),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Node {
    pub(crate) left: NodePointer,
    pub(crate) right: NodePointer,
}

impl Node {
    const EMPTY: Node = Node {
        left: NodePointer::Empty,
        right: NodePointer::Empty,
    };

    pub(crate) fn child(&self, bit: u8) -> NodePointer {
        if bit == 0 {
            self.left
        } else {
            self.right
        }
    }

    fn set_child(&mut self, bit: u8, pointer: NodePointer) {
        if bit == 0 {
            self.left = pointer;
        } else {
            self.right = pointer;
        }
    }
}

/// Build configuration
///
/// # Example
/// ```
/// use geoforge::{IpVersion, TrieOptions};
///
/// let options = TrieOptions::new(IpVersion::V6)
///     .with_ipv4_aliasing(true)
///     .with_database_type("City")
///     .with_description("en", "Example geolocation database")
///     .with_build_epoch(1_700_000_000);
/// assert!(options.ipv4_aliasing);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TrieOptions {
    /// Address family of the tree
    pub ip_version: IpVersion,
    /// Alias `::ffff:0:0/96` and `2002::/16` to the IPv4 subtree (IPv6 only)
    pub ipv4_aliasing: bool,
    /// Allow records inside special-purpose ranges
    pub include_reserved_networks: bool,
    /// `database_type` metadata field
    pub database_type: String,
    /// `description` metadata field (language -> text)
    pub description: BTreeMap<String, String>,
    /// `languages` metadata field
    pub languages: Vec<String>,
    /// Force a record size instead of picking the narrowest that fits
    pub record_size: Option<RecordSize>,
    /// Fixed `build_epoch` (seconds) for reproducible output
    pub build_epoch: Option<u64>,
}

impl Default for TrieOptions {
    fn default() -> Self {
        Self {
            ip_version: IpVersion::V6,
            ipv4_aliasing: false,
            include_reserved_networks: true,
            database_type: "City".to_string(),
            description: BTreeMap::new(),
            languages: Vec::new(),
            record_size: None,
            build_epoch: None,
        }
    }
}

impl TrieOptions {
    /// Defaults for the given address family
    pub fn new(ip_version: IpVersion) -> Self {
        Self {
            ip_version,
            ..Self::default()
        }
    }

    /// Enable or disable IPv4 aliasing
    pub fn with_ipv4_aliasing(mut self, enabled: bool) -> Self {
        self.ipv4_aliasing = enabled;
        self
    }

    /// Allow or forbid records inside reserved ranges
    pub fn with_reserved_networks(mut self, include: bool) -> Self {
        self.include_reserved_networks = include;
        self
    }

    /// Set the database type name
    pub fn with_database_type(mut self, db_type: impl Into<String>) -> Self {
        self.database_type = db_type.into();
        self
    }

    /// Add a description in a specific language
    ///
    /// Can be called multiple times for different languages.
    pub fn with_description(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.description.insert(language.into(), text.into());
        self
    }

    /// Set the languages the records carry names in
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Force a record size
    pub fn with_record_size(mut self, record_size: RecordSize) -> Self {
        self.record_size = Some(record_size);
        self
    }

    /// Pin the build timestamp
    pub fn with_build_epoch(mut self, epoch: u64) -> Self {
        self.build_epoch = Some(epoch);
        self
    }

    /// Aliasing only applies to IPv6 trees
    pub(crate) fn aliasing_active(&self) -> bool {
        self.ipv4_aliasing && self.ip_version == IpVersion::V6
    }
}

/// Where an insert left its record
enum Placement {
    /// The record needs a new arena slot
    New,
    /// The network already held this record id in its only slot
    Replaces(RecordId),
}

/// Prefix trie accumulating network to record associations
pub struct Trie {
    options: TrieOptions,
    pub(crate) nodes: Vec<Node>,
    pub(crate) records: Vec<DataValue>,
    /// Pinned `::/96` node when aliasing is active
    pub(crate) ipv4_root: Option<u32>,
    inserted: usize,
}

impl Trie {
    /// Create a trie
    ///
    /// `ipv4_aliasing` is ignored for IPv4 tries.
    pub fn new(ip_version: IpVersion, ipv4_aliasing: bool, include_reserved_networks: bool) -> Self {
        Self::with_options(
            TrieOptions::new(ip_version)
                .with_ipv4_aliasing(ipv4_aliasing)
                .with_reserved_networks(include_reserved_networks),
        )
    }

    /// Create a trie from full options
    pub fn with_options(options: TrieOptions) -> Self {
        let mut trie = Self {
            options,
            nodes: vec![Node::EMPTY],
            records: Vec::new(),
            ipv4_root: None,
            inserted: 0,
        };

        if trie.options.aliasing_active() {
            let ipv4_root = trie.descend_creating(0, 96);
            trie.ipv4_root = ipv4_root;
            if let Some(root) = ipv4_root {
                for (key, prefix_len) in IPV4_ALIASES {
                    trie.pin(key, prefix_len, NodePointer::Alias(root));
                }
            }
        }

        if !trie.options.include_reserved_networks {
            let ipv6 = trie.options.ip_version == IpVersion::V6;
            let networks: Vec<Network> = reserved::ipv4_networks()
                .chain(reserved::ipv6_networks().filter(|_| ipv6))
                .collect();
            for network in networks {
                if let Ok((key, prefix_len)) = trie.key_for(&network) {
                    trie.pin(key, prefix_len, NodePointer::Reserved);
                }
            }
        }

        trie
    }

    /// Build options
    pub fn options(&self) -> &TrieOptions {
        &self.options
    }

    /// Address family
    pub fn ip_version(&self) -> IpVersion {
        self.options.ip_version
    }

    /// Whether IPv4 aliases are in effect
    pub fn ipv4_aliasing(&self) -> bool {
        self.options.aliasing_active()
    }

    /// Nodes allocated in the arena (before collapsing)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of successful inserts
    ///
    /// Re-inserting a network stored as a single slot reuses its record
    /// storage. A record overridden after more specific networks split its
    /// range stays in memory until serialization, which drops it.
    pub fn len(&self) -> usize {
        self.inserted
    }

    /// True when nothing has been inserted
    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    /// Associate `record` with every address in `network`
    ///
    /// More specific networks win over less specific ones no matter which
    /// was inserted first; re-inserting the same network replaces its record.
    /// A failed insert leaves every lookup unchanged.
    pub fn insert(&mut self, network: Network, record: DataValue) -> Result<(), InsertError> {
        if !matches!(record, DataValue::Map(_)) {
            return Err(InsertError::NotAMap);
        }
        let (key, prefix_len) = self.key_for(&network)?;
        let record_id = self.records.len() as RecordId;

        match self.insert_key(key, prefix_len, record_id, &network)? {
            Placement::New => self.records.push(record),
            Placement::Replaces(existing_id) => self.records[existing_id as usize] = record,
        }
        self.inserted += 1;
        Ok(())
    }

    /// Longest prefix match over the in-memory trie
    ///
    /// Returns the record and the prefix length of the network it was
    /// inserted with, in the queried address family. Matches reached through
    /// an alias report the alias prefix plus the IPv4 prefix.
    pub fn lookup(&self, ip: IpAddr) -> Option<(&DataValue, u8)> {
        let (key, width, bias) = match (ip, self.options.ip_version) {
            (IpAddr::V4(_), IpVersion::V4) => (addr_bits(ip) << 96, 32, 0),
            (IpAddr::V4(_), IpVersion::V6) => (addr_bits(ip), 128, 96),
            (IpAddr::V6(_), IpVersion::V6) => (addr_bits(ip), 128, 0),
            (IpAddr::V6(_), IpVersion::V4) => return None,
        };

        let mut node_id = ROOT;
        let mut alias_depth = None;
        for depth in 0..width {
            match self.nodes[node_id as usize].child(bit_at(key, depth)) {
                NodePointer::Empty | NodePointer::Reserved => return None,
                NodePointer::Node(id) => node_id = id,
                NodePointer::Alias(id) => {
                    alias_depth = Some(depth + 1);
                    node_id = id;
                }
                NodePointer::Data(record_id, prefix_len) => {
                    let prefix_len = match alias_depth {
                        Some(at) => at + prefix_len.saturating_sub(96),
                        None => prefix_len.saturating_sub(bias),
                    };
                    return self
                        .records
                        .get(record_id as usize)
                        .map(|record| (record, prefix_len));
                }
            }
        }
        None
    }

    /// Left-aligned key bits and prefix length of `network` in this trie
    fn key_for(&self, network: &Network) -> Result<(u128, u8), InsertError> {
        match (network.is_ipv4(), self.options.ip_version) {
            (true, IpVersion::V4) => Ok((network.bits() << 96, network.prefix_len())),
            (true, IpVersion::V6) => Ok((network.bits(), 96 + network.prefix_len())),
            (false, IpVersion::V6) => Ok((network.bits(), network.prefix_len())),
            (false, IpVersion::V4) => Err(InsertError::AddressFamily(format!(
                "cannot insert IPv6 network {} into an IPv4 trie",
                network
            ))),
        }
    }

    fn insert_key(
        &mut self,
        key: u128,
        prefix_len: u8,
        record_id: RecordId,
        network: &Network,
    ) -> Result<Placement, InsertError> {
        if prefix_len == 0 {
            self.backfill(ROOT, record_id, 0);
            return Ok(Placement::New);
        }

        let mut node_id = ROOT;
        for depth in 0..prefix_len {
            let bit = bit_at(key, depth);
            let child = self.nodes[node_id as usize].child(bit);

            if depth + 1 == prefix_len {
                match child {
                    NodePointer::Empty => {
                        self.set_child(node_id, bit, NodePointer::Data(record_id, prefix_len));
                    }
                    // A slot at its own depth was never split or backfilled,
                    // so nothing else refers to its record
                    NodePointer::Data(existing_id, existing_len) if existing_len == prefix_len => {
                        return Ok(Placement::Replaces(existing_id));
                    }
                    NodePointer::Data(_, existing_len) => {
                        if prefix_len >= existing_len {
                            self.set_child(node_id, bit, NodePointer::Data(record_id, prefix_len));
                        }
                    }
                    NodePointer::Node(child_id) => {
                        // More specific networks already live below this slot
                        self.backfill(child_id, record_id, prefix_len);
                    }
                    NodePointer::Reserved => {
                        return Err(InsertError::ReservedNetwork(network.to_string()))
                    }
                    NodePointer::Alias(_) => {
                        return Err(InsertError::AliasedNetwork(network.to_string()))
                    }
                }
                return Ok(Placement::New);
            }

            node_id = match child {
                NodePointer::Empty => {
                    let new_id = self.allocate_node();
                    self.set_child(node_id, bit, NodePointer::Node(new_id));
                    new_id
                }
                NodePointer::Node(child_id) => child_id,
                NodePointer::Data(existing_id, existing_len) => {
                    // Split the less specific record so it keeps covering
                    // both halves below this point
                    let new_id = self.allocate_node();
                    let inherited = NodePointer::Data(existing_id, existing_len);
                    self.nodes[new_id as usize] = Node {
                        left: inherited,
                        right: inherited,
                    };
                    self.set_child(node_id, bit, NodePointer::Node(new_id));
                    new_id
                }
                NodePointer::Reserved => {
                    return Err(InsertError::ReservedNetwork(network.to_string()))
                }
                NodePointer::Alias(_) => {
                    return Err(InsertError::AliasedNetwork(network.to_string()))
                }
            };
        }

        Ok(Placement::New)
    }

    /// Give a less specific record to every slot below `node_id` that is
    /// empty or holds a record of equal or shorter prefix
    ///
    /// Reserved and aliased slots are left alone.
    fn backfill(&mut self, node_id: u32, record_id: RecordId, prefix_len: u8) {
        for bit in 0..2u8 {
            match self.nodes[node_id as usize].child(bit) {
                NodePointer::Empty => {
                    self.set_child(node_id, bit, NodePointer::Data(record_id, prefix_len));
                }
                NodePointer::Data(_, existing_len) if existing_len <= prefix_len => {
                    self.set_child(node_id, bit, NodePointer::Data(record_id, prefix_len));
                }
                NodePointer::Node(child_id) => self.backfill(child_id, record_id, prefix_len),
                NodePointer::Data(..) | NodePointer::Reserved | NodePointer::Alias(_) => {}
            }
        }
    }

    /// Walk `depth` bits of `key`, creating nodes as needed
    ///
    /// Returns `None` if the path runs into a pinned slot.
    fn descend_creating(&mut self, key: u128, depth: u8) -> Option<u32> {
        let mut node_id = ROOT;
        for d in 0..depth {
            let bit = bit_at(key, d);
            node_id = match self.nodes[node_id as usize].child(bit) {
                NodePointer::Node(child_id) => child_id,
                NodePointer::Empty => {
                    let new_id = self.allocate_node();
                    self.set_child(node_id, bit, NodePointer::Node(new_id));
                    new_id
                }
                _ => return None,
            };
        }
        Some(node_id)
    }

    /// Pin a slot (alias or reserved) at `prefix_len`
    fn pin(&mut self, key: u128, prefix_len: u8, pointer: NodePointer) {
        if prefix_len == 0 {
            return;
        }
        if let Some(parent) = self.descend_creating(key, prefix_len - 1) {
            self.set_child(parent, bit_at(key, prefix_len - 1), pointer);
        }
    }

    fn allocate_node(&mut self) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::EMPTY);
        id
    }

    fn set_child(&mut self, node_id: u32, bit: u8, pointer: NodePointer) {
        self.nodes[node_id as usize].set_child(bit, pointer);
    }
}

/// Bit `depth` of a left-aligned 128-bit key
#[inline]
pub(crate) fn bit_at(key: u128, depth: u8) -> u8 {
    ((key >> (127 - depth as u32)) & 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(name: &str) -> DataValue {
        vec![("name", name)].into_iter().collect()
    }

    fn name_at<'a>(trie: &'a Trie, ip: &str) -> Option<&'a str> {
        trie.lookup(ip.parse().unwrap())
            .and_then(|(r, _)| r.get("name"))
            .and_then(|v| v.as_str())
    }

    fn net(s: &str) -> Network {
        s.parse().unwrap()
    }

    #[test]
    fn test_new_trie_has_root() {
        let trie = Trie::new(IpVersion::V4, false, true);
        assert_eq!(trie.node_count(), 1);
        assert!(trie.is_empty());
        assert_eq!(trie.ip_version(), IpVersion::V4);
    }

    #[test]
    fn test_bit_at() {
        let key = 0xC0A80101u128 << 96;
        assert_eq!(bit_at(key, 0), 1);
        assert_eq!(bit_at(key, 1), 1);
        assert_eq!(bit_at(key, 2), 0);
        assert_eq!(bit_at(key, 31), 1);
        assert_eq!(bit_at(1, 127), 1);
    }

    #[test]
    fn test_insert_and_lookup_ipv4() {
        let mut trie = Trie::new(IpVersion::V4, false, true);
        trie.insert(net("192.168.0.0/16"), record("home")).unwrap();

        let (found, prefix_len) = trie.lookup("192.168.44.1".parse().unwrap()).unwrap();
        assert_eq!(found.get("name").and_then(|v| v.as_str()), Some("home"));
        assert_eq!(prefix_len, 16);
        assert_eq!(name_at(&trie, "192.169.0.1"), None);
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_more_specific_wins_either_order() {
        for broad_first in [true, false] {
            let mut trie = Trie::new(IpVersion::V4, false, true);
            let inserts = [("10.0.0.0/8", "A"), ("10.1.0.0/16", "B")];
            let ordered: Vec<_> = if broad_first {
                inserts.to_vec()
            } else {
                inserts.iter().rev().copied().collect()
            };
            for (network, name) in ordered {
                trie.insert(net(network), record(name)).unwrap();
            }

            assert_eq!(name_at(&trie, "10.1.2.3"), Some("B"));
            assert_eq!(name_at(&trie, "10.2.0.0"), Some("A"));
            assert_eq!(name_at(&trie, "10.0.0.1"), Some("A"));
            assert_eq!(name_at(&trie, "11.0.0.0"), None);
        }
    }

    #[test]
    fn test_broad_after_narrow_keeps_narrow() {
        let mut trie = Trie::new(IpVersion::V4, false, true);
        trie.insert(net("10.1.2.0/24"), record("narrow")).unwrap();
        trie.insert(net("10.1.2.128/25"), record("narrower")).unwrap();
        trie.insert(net("10.0.0.0/8"), record("broad")).unwrap();

        assert_eq!(name_at(&trie, "10.1.2.1"), Some("narrow"));
        assert_eq!(name_at(&trie, "10.1.2.200"), Some("narrower"));
        assert_eq!(name_at(&trie, "10.200.0.0"), Some("broad"));
    }

    #[test]
    fn test_duplicate_prefix_last_write_wins() {
        let mut trie = Trie::new(IpVersion::V4, false, true);
        trie.insert(net("10.0.0.0/8"), record("first")).unwrap();
        trie.insert(net("10.0.0.0/8"), record("second")).unwrap();
        assert_eq!(name_at(&trie, "10.9.9.9"), Some("second"));

        // Same again with a more specific network already below
        trie.insert(net("10.5.0.0/16"), record("inner")).unwrap();
        trie.insert(net("10.0.0.0/8"), record("third")).unwrap();
        assert_eq!(name_at(&trie, "10.9.9.9"), Some("third"));
        assert_eq!(name_at(&trie, "10.5.0.1"), Some("inner"));
    }

    #[test]
    fn test_reinserting_network_reuses_record_storage() {
        let mut trie = Trie::new(IpVersion::V6, true, true);
        for i in 0..1000 {
            trie.insert(net("198.51.100.0/24"), record(&format!("v{}", i))).unwrap();
            trie.insert(net("2001:db8::/32"), record(&format!("w{}", i))).unwrap();
        }
        assert_eq!(trie.len(), 2000);
        assert_eq!(trie.records.len(), 2);
        assert_eq!(name_at(&trie, "198.51.100.7"), Some("v999"));
        assert_eq!(name_at(&trie, "::ffff:198.51.100.7"), Some("v999"));
        assert_eq!(name_at(&trie, "2001:db8::1"), Some("w999"));
    }

    #[test]
    fn test_reinserting_split_network_keeps_shared_records() {
        let mut trie = Trie::new(IpVersion::V4, false, true);
        trie.insert(net("10.0.0.0/8"), record("outer")).unwrap();
        trie.insert(net("10.5.0.0/16"), record("inner")).unwrap();
        trie.insert(net("10.5.0.0/16"), record("inner2")).unwrap();
        // The /8 record was copied into the split path; it must stay intact
        assert_eq!(name_at(&trie, "10.4.0.1"), Some("outer"));
        assert_eq!(name_at(&trie, "10.5.0.1"), Some("inner2"));
        assert_eq!(trie.records.len(), 2);

        trie.insert(net("10.0.0.0/8"), record("outer2")).unwrap();
        assert_eq!(name_at(&trie, "10.4.0.1"), Some("outer2"));
        assert_eq!(name_at(&trie, "10.5.0.1"), Some("inner2"));
    }

    #[test]
    fn test_default_and_host_routes() {
        let mut trie = Trie::new(IpVersion::V4, false, true);
        trie.insert(net("0.0.0.0/0"), record("default")).unwrap();
        trie.insert(net("8.8.8.8/32"), record("host")).unwrap();

        assert_eq!(name_at(&trie, "8.8.8.8"), Some("host"));
        assert_eq!(name_at(&trie, "8.8.8.9"), Some("default"));
        assert_eq!(name_at(&trie, "255.255.255.255"), Some("default"));

        let mut trie = Trie::new(IpVersion::V6, false, true);
        trie.insert(net("::/0"), record("default6")).unwrap();
        trie.insert(net("2001:db8::1/128"), record("host6")).unwrap();
        assert_eq!(name_at(&trie, "2001:db8::1"), Some("host6"));
        assert_eq!(name_at(&trie, "2001:db8::2"), Some("default6"));
        assert_eq!(
            trie.lookup("2001:db8::1".parse().unwrap()).map(|(_, len)| len),
            Some(128)
        );
    }

    #[test]
    fn test_ipv4_in_ipv6_trie() {
        let mut trie = Trie::new(IpVersion::V6, false, true);
        trie.insert(net("1.2.3.0/24"), record("v4")).unwrap();

        let (_, prefix_len) = trie.lookup("1.2.3.4".parse().unwrap()).unwrap();
        assert_eq!(prefix_len, 24);
        assert_eq!(name_at(&trie, "::1.2.3.4"), Some("v4"));
        // No aliasing: the mapped form is a different address
        assert_eq!(name_at(&trie, "::ffff:1.2.3.4"), None);
    }

    #[test]
    fn test_address_family_mismatch() {
        let mut trie = Trie::new(IpVersion::V4, false, true);
        let err = trie.insert(net("2001:db8::/32"), record("x")).unwrap_err();
        assert!(matches!(err, InsertError::AddressFamily(_)));
        assert!(trie.is_empty());
        assert_eq!(name_at(&trie, "::1"), None);
    }

    #[test]
    fn test_record_must_be_map() {
        let mut trie = Trie::new(IpVersion::V4, false, true);
        assert_eq!(
            trie.insert(net("1.0.0.0/8"), DataValue::from("flat")),
            Err(InsertError::NotAMap)
        );
    }

    #[test]
    fn test_ipv4_aliasing() {
        let mut trie = Trie::new(IpVersion::V6, true, true);
        assert!(trie.ipv4_aliasing());
        trie.insert(net("192.0.2.0/24"), record("doc")).unwrap();

        assert_eq!(name_at(&trie, "192.0.2.1"), Some("doc"));
        assert_eq!(name_at(&trie, "::ffff:192.0.2.1"), Some("doc"));
        assert_eq!(name_at(&trie, "::192.0.2.1"), Some("doc"));
        // 6to4 embeds the IPv4 address in bits 16..48
        assert_eq!(name_at(&trie, "2002:c000:0201::"), Some("doc"));
        assert_eq!(
            trie.lookup("2002:c000:0201::".parse().unwrap()).map(|(_, len)| len),
            Some(40)
        );
    }

    #[test]
    fn test_insert_into_alias_rejected() {
        let mut trie = Trie::new(IpVersion::V6, true, true);
        let err = trie
            .insert(net("::ffff:1.2.3.0/120"), record("x"))
            .unwrap_err();
        assert!(matches!(err, InsertError::AliasedNetwork(_)));
        let err = trie.insert(net("2002::/16"), record("x")).unwrap_err();
        assert!(matches!(err, InsertError::AliasedNetwork(_)));
        assert!(trie.is_empty());
    }

    #[test]
    fn test_containing_network_skips_alias() {
        let mut trie = Trie::new(IpVersion::V6, true, true);
        trie.insert(net("2000::/3"), record("global")).unwrap();
        assert_eq!(name_at(&trie, "2400::1"), Some("global"));
        // 2002::/16 still resolves through the IPv4 subtree, which is empty
        assert_eq!(name_at(&trie, "2002:0101:0101::"), None);
    }

    #[test]
    fn test_aliasing_ignored_for_ipv4_trie() {
        let trie = Trie::new(IpVersion::V4, true, true);
        assert!(!trie.ipv4_aliasing());
        assert!(trie.ipv4_root.is_none());
    }

    #[test]
    fn test_reserved_networks_excluded() {
        let mut trie = Trie::new(IpVersion::V4, false, false);
        let err = trie.insert(net("10.1.0.0/16"), record("x")).unwrap_err();
        assert!(matches!(err, InsertError::ReservedNetwork(_)));
        let err = trie.insert(net("192.168.0.0/16"), record("x")).unwrap_err();
        assert!(matches!(err, InsertError::ReservedNetwork(_)));

        // A containing network skips the reserved ranges
        trie.insert(net("0.0.0.0/0"), record("world")).unwrap();
        assert_eq!(name_at(&trie, "8.8.8.8"), Some("world"));
        assert_eq!(name_at(&trie, "10.0.0.1"), None);
        assert_eq!(name_at(&trie, "255.255.255.255"), None);
    }

    #[test]
    fn test_reserved_networks_ipv6() {
        let mut trie = Trie::new(IpVersion::V6, true, false);
        let err = trie.insert(net("fe80::/64"), record("x")).unwrap_err();
        assert!(matches!(err, InsertError::ReservedNetwork(_)));
        let err = trie.insert(net("127.0.0.0/8"), record("x")).unwrap_err();
        assert!(matches!(err, InsertError::ReservedNetwork(_)));
        trie.insert(net("2a00::/12"), record("eu")).unwrap();
        assert_eq!(name_at(&trie, "2a00:1450::1"), Some("eu"));
    }

    #[test]
    fn test_options_builder() {
        let options = TrieOptions::new(IpVersion::V4)
            .with_database_type("Test")
            .with_description("en", "desc")
            .with_languages(["en", "de"])
            .with_record_size(RecordSize::Bits32)
            .with_build_epoch(42);
        let trie = Trie::with_options(options.clone());
        assert_eq!(trie.options(), &options);
        assert_eq!(trie.options().languages, vec!["en", "de"]);
    }

    /// Brute force longest prefix match: longest prefix wins, ties go to the
    /// most recent insert
    fn model_lookup(inserts: &[(u32, u8)], ip: u32) -> Option<(usize, u8)> {
        let mut best: Option<(usize, u8)> = None;
        for (i, &(addr, len)) in inserts.iter().enumerate() {
            let shift = 32 - len as u32;
            let covers = shift == 32 || (addr >> shift) == (ip >> shift);
            if covers && best.map_or(true, |(_, best_len)| len >= best_len) {
                best = Some((i, len));
            }
        }
        best
    }

    proptest! {
        #[test]
        fn prop_matches_brute_force(
            inserts in prop::collection::vec((any::<u32>(), 0u8..=32), 1..24),
            probes in prop::collection::vec(any::<u32>(), 1..32),
        ) {
            let mut trie = Trie::new(IpVersion::V4, false, true);
            let mut normalized = Vec::new();
            for (i, &(addr, len)) in inserts.iter().enumerate() {
                let network = Network::new(IpAddr::V4(addr.into()), len).unwrap();
                let record: DataValue = vec![("id", DataValue::Uint32(i as u32))].into_iter().collect();
                trie.insert(network, record).unwrap();
                normalized.push((addr_bits(network.addr()) as u32, len));
            }

            // Probe the inserted network addresses as well as random ones
            let candidates = probes.iter().copied().chain(normalized.iter().map(|&(a, _)| a));
            for ip in candidates {
                let expected = model_lookup(&normalized, ip);
                let actual = trie
                    .lookup(IpAddr::V4(ip.into()))
                    .map(|(r, len)| (r.get("id").and_then(|v| v.as_u64()).unwrap() as usize, len));
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
