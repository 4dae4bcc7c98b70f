//! Decoded value tree.
//!
//! Aggregates keep their members in decode order. Leaves keep the raw bytes exactly as
//! they appeared in the source; interpreting them is left to the caller, with a few
//! helpers for the common integer, string and enumeration cases.

use crate::catalog::{BaseType, Enumerator, SymbolId};
use bytes::Bytes;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// What a leaf's bytes represent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// Storage of a base type (or a run of base-type array elements)
    Base(BaseType),
    /// Storage of an enumeration symbol
    Enum(SymbolId),
    /// Field whose type symbol is missing from the catalog; no bytes were consumed
    UnknownType(SymbolId),
}

/// Bit position of a bit-field member within its storage unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRange {
    /// First bit
    pub offset: u32,
    /// Width in bits
    pub size: u32,
}

/// Raw storage of a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    kind: LeafKind,
    bytes: Bytes,
    little_endian: Option<bool>,
    bits: Option<BitRange>,
}

impl Leaf {
    /// Creates a leaf over the given bytes
    pub fn new(kind: LeafKind, bytes: Bytes) -> Self {
        Self {
            kind,
            bytes,
            little_endian: None,
            bits: None,
        }
    }

    /// Creates the placeholder for a field with an unresolved type
    pub fn unknown(type_id: SymbolId) -> Self {
        Self::new(LeafKind::UnknownType(type_id), Bytes::new())
    }

    /// Sets the byte order recorded for the field
    pub fn with_endianness(mut self, little_endian: Option<bool>) -> Self {
        self.little_endian = little_endian;
        self
    }

    /// Sets the bit range of a bit-field member
    pub fn with_bits(mut self, bits: Option<BitRange>) -> Self {
        self.bits = bits;
        self
    }

    /// Returns the leaf kind
    pub fn kind(&self) -> LeafKind {
        self.kind
    }

    /// Returns the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the raw bytes as a shared buffer
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Returns the bit range for bit-field members
    pub fn bits(&self) -> Option<BitRange> {
        self.bits
    }

    /// Returns true if the field's type was missing from the catalog
    pub fn is_unknown(&self) -> bool {
        matches!(self.kind, LeafKind::UnknownType(_))
    }

    /// Byte order used for numeric reads; little-endian unless the catalog says otherwise
    pub fn is_little_endian(&self) -> bool {
        self.little_endian.unwrap_or(true)
    }

    /// Reads the storage as an unsigned integer.
    ///
    /// Returns `None` for empty storage or storage wider than 8 bytes. For bit-field
    /// members only the member's bits are returned.
    pub fn to_unsigned(&self) -> Option<u64> {
        if self.bytes.is_empty() || self.bytes.len() > 8 {
            return None;
        }

        let mut raw = [0u8; 8];
        let value = if self.is_little_endian() {
            raw[..self.bytes.len()].copy_from_slice(&self.bytes);
            u64::from_le_bytes(raw)
        } else {
            raw[8 - self.bytes.len()..].copy_from_slice(&self.bytes);
            u64::from_be_bytes(raw)
        };

        match self.bits {
            Some(bits) if bits.size < 64 => {
                Some(value.checked_shr(bits.offset).unwrap_or(0) & ((1u64 << bits.size) - 1))
            }
            _ => Some(value),
        }
    }

    /// Reads the storage as a sign-extended integer
    pub fn to_signed(&self) -> Option<i64> {
        let value = self.to_unsigned()?;
        let width = match self.bits {
            Some(bits) => bits.size.min(64),
            None => self.bytes.len() as u32 * 8,
        };
        if width == 0 || width >= 64 {
            return Some(value as i64);
        }
        let shift = 64 - width;
        Some(((value << shift) as i64) >> shift)
    }

    /// Returns the storage up to the first NUL byte.
    ///
    /// String and character storage is fixed-width in the catalog, so the terminator is
    /// only applied here. Returns `None` if the bytes are not UTF-8.
    pub fn as_c_str(&self) -> Option<&str> {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.bytes.len());
        std::str::from_utf8(&self.bytes[..end]).ok()
    }

    /// Maps enumeration storage to its label.
    ///
    /// Values are compared after truncating both sides to the storage width, so negative
    /// enumerators match their two's complement storage.
    pub fn enum_label<'a>(&self, enumerators: &'a [Enumerator]) -> Option<&'a str> {
        let LeafKind::Enum(symbol) = self.kind else {
            return None;
        };
        let stored = self.to_unsigned()?;
        let width = self.bytes.len() as u32 * 8;
        let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };

        enumerators
            .iter()
            .filter(|e| e.symbol == symbol)
            .find(|e| (e.value as u64) & mask == stored)
            .map(|e| e.name.as_str())
    }
}

impl Serialize for Leaf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_unknown() {
            serializer.serialize_none()
        } else {
            serializer.serialize_bytes(&self.bytes)
        }
    }
}

/// Decoded structure: the type name and its members in decode order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    type_name: String,
    members: Vec<(String, DecodedValue)>,
}

impl Aggregate {
    /// Creates an empty aggregate
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            members: Vec::new(),
        }
    }

    /// Appends a member
    pub fn push(&mut self, name: impl Into<String>, value: DecodedValue) {
        self.members.push((name.into(), value));
    }

    /// Returns the type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the members in decode order
    pub fn members(&self) -> &[(String, DecodedValue)] {
        &self.members
    }

    /// Looks up a member by name
    pub fn get(&self, name: &str) -> Option<&DecodedValue> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, value)| value)
    }

    /// Returns the member names in decode order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(name, _)| name.as_str())
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if nothing was decoded
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

struct Members<'a>(&'a [(String, DecodedValue)]);

impl Serialize for Members<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for Aggregate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.type_name, &Members(&self.members))?;
        map.end()
    }
}

/// A node of the decoded tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    /// Raw field storage
    Leaf(Leaf),
    /// Nested structure
    Aggregate(Aggregate),
    /// Per-element values of an enum or aggregate array
    Sequence(Vec<DecodedValue>),
}

impl DecodedValue {
    /// Returns the leaf, if this is one
    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            DecodedValue::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Returns the aggregate, if this is one
    pub fn as_aggregate(&self) -> Option<&Aggregate> {
        match self {
            DecodedValue::Aggregate(aggregate) => Some(aggregate),
            _ => None,
        }
    }

    /// Returns the element values, if this is a sequence
    pub fn as_sequence(&self) -> Option<&[DecodedValue]> {
        match self {
            DecodedValue::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

impl From<Leaf> for DecodedValue {
    fn from(leaf: Leaf) -> Self {
        DecodedValue::Leaf(leaf)
    }
}

impl From<Aggregate> for DecodedValue {
    fn from(aggregate: Aggregate) -> Self {
        DecodedValue::Aggregate(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn leaf(kind: LeafKind, bytes: &'static [u8]) -> Leaf {
        Leaf::new(kind, Bytes::from_static(bytes))
    }

    #[test]
    fn test_integer_reads_follow_endianness() {
        let le = leaf(LeafKind::Base(BaseType::UnsignedInteger), &[0x34, 0x12]);
        assert_eq!(le.to_unsigned(), Some(0x1234));

        let be = le.clone().with_endianness(Some(false));
        assert_eq!(be.to_unsigned(), Some(0x3412));

        let negative = leaf(LeafKind::Base(BaseType::SignedInteger), &[0xFE, 0xFF]);
        assert_eq!(negative.to_signed(), Some(-2));

        let wide = leaf(LeafKind::Base(BaseType::UnsignedInteger), &[0; 12]);
        assert_eq!(wide.to_unsigned(), None);
    }

    #[test]
    fn test_bitfield_extraction() {
        // 0b1011_0100: bits 2..5 hold 0b101
        let flags = leaf(LeafKind::Base(BaseType::UnsignedInteger), &[0xB4]).with_bits(Some(
            BitRange { offset: 2, size: 3 },
        ));
        assert_eq!(flags.to_unsigned(), Some(0b101));
        assert_eq!(flags.to_signed(), Some(-3));
    }

    #[test]
    fn test_c_str_stops_at_nul() {
        let name = leaf(LeafKind::Base(BaseType::String), b"GNC\0\0\0\0\0");
        assert_eq!(name.as_c_str(), Some("GNC"));

        let full = leaf(LeafKind::Base(BaseType::SignedInteger), b"ABCD");
        assert_eq!(full.as_c_str(), Some("ABCD"));
    }

    #[test]
    fn test_enum_label() {
        let table = vec![
            Enumerator {
                symbol: 5,
                value: -1,
                name: "FAULT".into(),
            },
            Enumerator {
                symbol: 5,
                value: 2,
                name: "SAFE".into(),
            },
        ];
        let safe = leaf(LeafKind::Enum(5), &[2, 0, 0, 0]);
        let fault = leaf(LeafKind::Enum(5), &[0xFF, 0xFF, 0xFF, 0xFF]);
        let other = leaf(LeafKind::Enum(6), &[2, 0, 0, 0]);
        assert_eq!(safe.enum_label(&table), Some("SAFE"));
        assert_eq!(fault.enum_label(&table), Some("FAULT"));
        assert_eq!(other.enum_label(&table), None);
    }

    #[test]
    fn test_aggregate_serializes_under_type_name() {
        let mut inner = Aggregate::new("Point");
        inner.push("x", leaf(LeafKind::Base(BaseType::SignedInteger), &[1, 0]).into());
        let mut outer = Aggregate::new("Outer");
        outer.push("p", inner.into());
        outer.push("missing", Leaf::unknown(42).into());
        outer.push(
            "modes",
            DecodedValue::Sequence(vec![leaf(LeafKind::Enum(3), &[1]).into()]),
        );

        let json = serde_json::to_string(&outer).unwrap();
        assert_eq!(
            json,
            r#"{"Outer":{"p":{"Point":{"x":[1,0]}},"missing":null,"modes":[[1]]}}"#
        );
    }

    #[test]
    fn test_aggregate_lookup() {
        let mut agg = Aggregate::new("Point");
        agg.push("x", Leaf::unknown(1).into());
        agg.push("y", Leaf::unknown(1).into());
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.names().collect::<Vec<_>>(), vec!["x", "y"]);
        assert!(agg.get("y").is_some());
        assert!(agg.get("z").is_none());
    }
}
