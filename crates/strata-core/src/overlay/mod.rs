//! Overlay decoding of raw variable storage.
//!
//! Given a root type symbol and the bytes of a variable, [`OverlayDecoder`] walks the
//! symbol's fields and slices the bytes into a named tree that mirrors the type.
//!
//! ## Algorithm Overview
//!
//! 1. Fetch the root's fields and order them by byte offset, ties by field id
//! 2. Start a cursor at the requested offset
//! 3. For each field, classify its type once (base, enum, aggregate, unknown) and copy
//!    the field's storage at the cursor, recursing into nested aggregates
//! 4. Every field decode returns the advanced cursor; the caller adopts it before the
//!    next sibling, so nested spans are always accounted for
//!
//! Array marker fields consume nothing. Fields whose type is missing from the catalog
//! become [`LeafKind::UnknownType`] leaves and consume nothing. An array whose elements
//! stop advancing the cursor ends after that element. Short data and cyclic
//! type graphs abort the current subtree with an error that carries everything decoded
//! up to that point.

mod value;

use crate::catalog::{BaseType, Field, FieldKind, Symbol, SymbolId, TypeCatalog, TypeKind};
use crate::error::Error;
use bytes::Bytes;
use std::collections::HashMap;
use tracing::{debug, trace};

pub use value::{Aggregate, BitRange, DecodedValue, Leaf, LeafKind};

/// Configuration for the decoder
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Maximum aggregate nesting depth (0 = unlimited)
    pub max_depth: usize,
    /// Let adjacent bit-field members share one storage unit (off: every member
    /// consumes its type's full byte size)
    pub share_bitfield_storage: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_depth: 0,
            share_bitfield_storage: false,
        }
    }
}

impl DecoderConfig {
    /// Creates a new decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets whether adjacent bit-fields share storage
    pub fn share_bitfield_storage(mut self, share: bool) -> Self {
        self.share_bitfield_storage = share;
        self
    }
}

/// A successfully decoded variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// The decoded tree of the root symbol
    pub value: Aggregate,
    /// Cursor position after the last consumed byte
    pub cursor: usize,
}

/// A decode that stopped early
///
/// `partial` holds whatever was decoded before the failure, with the failing subtree
/// included as far as it got.
#[derive(thiserror::Error, Debug)]
#[error("{error}")]
pub struct DecodeFailure {
    /// Why decoding stopped
    #[source]
    pub error: Error,
    /// Tree decoded up to the failure
    pub partial: Option<DecodedValue>,
}

impl DecodeFailure {
    fn new(error: Error) -> Self {
        Self {
            error,
            partial: None,
        }
    }

    fn with_partial(mut self, partial: DecodedValue) -> Self {
        self.partial = Some(partial);
        self
    }
}

impl From<Error> for DecodeFailure {
    fn from(error: Error) -> Self {
        Self::new(error)
    }
}

/// Storage unit of the last bit-field member, reused by the next member at the same offset
#[derive(Debug, Clone, Copy)]
struct BitUnit {
    byte_offset: u64,
    start: usize,
    width: usize,
}

/// Decodes raw variable storage against a [`TypeCatalog`]
///
/// Type classification is cached per symbol for the decoder's lifetime, so one decoder
/// should be reused across variables of the same catalog.
pub struct OverlayDecoder<'c, C: TypeCatalog + ?Sized> {
    catalog: &'c C,
    config: DecoderConfig,
    kinds: HashMap<SymbolId, TypeKind>,
}

impl<'c, C: TypeCatalog + ?Sized> OverlayDecoder<'c, C> {
    /// Creates a decoder with default configuration
    pub fn new(catalog: &'c C) -> Self {
        Self::with_config(catalog, DecoderConfig::default())
    }

    /// Creates a decoder with custom configuration
    pub fn with_config(catalog: &'c C, config: DecoderConfig) -> Self {
        Self {
            catalog,
            config,
            kinds: HashMap::new(),
        }
    }

    /// Returns the catalog this decoder reads from
    pub fn catalog(&self) -> &'c C {
        self.catalog
    }

    /// Decodes `data` as an instance of `root`, starting at `start_offset`
    pub fn decode(
        &mut self,
        root: &Symbol,
        data: &Bytes,
        start_offset: usize,
    ) -> Result<Decoded, DecodeFailure> {
        let mut path = Vec::new();
        let (value, cursor) = self.decode_aggregate(root, data, start_offset, &mut path)?;
        Ok(Decoded { value, cursor })
    }

    /// Decodes `data` as the declared type of the named variable
    pub fn decode_variable(
        &mut self,
        name: &str,
        data: &Bytes,
        start_offset: usize,
    ) -> Result<Decoded, DecodeFailure> {
        let type_id = self.catalog.variable_type(name)?;
        let root = self.catalog.resolve_symbol(type_id)?;
        self.decode(&root, data, start_offset)
    }

    /// Classifies a type symbol, consulting the cache first
    pub fn type_kind(&mut self, id: SymbolId) -> TypeKind {
        let catalog = self.catalog;
        *self
            .kinds
            .entry(id)
            .or_insert_with(|| catalog.type_kind(id))
    }

    fn decode_aggregate(
        &mut self,
        symbol: &Symbol,
        data: &Bytes,
        start: usize,
        path: &mut Vec<SymbolId>,
    ) -> Result<(Aggregate, usize), DecodeFailure> {
        if path.contains(&symbol.id) {
            let mut chain = path.clone();
            chain.push(symbol.id);
            debug!("Cycle detected at {} (#{})", symbol.name, symbol.id);
            return Err(Error::cyclic_type(symbol.id, chain).into());
        }
        if self.config.max_depth > 0 && path.len() >= self.config.max_depth {
            return Err(Error::depth_exceeded(symbol.id, self.config.max_depth).into());
        }

        path.push(symbol.id);
        let result = self.decode_fields(symbol, data, start, path);
        path.pop();
        result
    }

    fn decode_fields(
        &mut self,
        symbol: &Symbol,
        data: &Bytes,
        start: usize,
        path: &mut Vec<SymbolId>,
    ) -> Result<(Aggregate, usize), DecodeFailure> {
        let mut fields = self.catalog.fields_of(symbol.id);
        fields.sort_by_key(|f| (f.byte_offset, f.id));

        let byte_order = symbol
            .elf
            .and_then(|elf| self.catalog.elf_little_endian(elf));
        for field in fields.iter_mut() {
            field.little_endian = field.little_endian.or(byte_order);
        }

        trace!(
            "Decoding {} ({} fields) at offset {}",
            symbol.name,
            fields.len(),
            start
        );

        let mut out = Aggregate::new(symbol.name.clone());
        let mut cursor = start;
        let mut unit = None;

        for field in &fields {
            match self.decode_field(field, data, cursor, &mut unit, path) {
                Ok(Some((value, next))) => {
                    out.push(field.name.clone(), value);
                    cursor = next;
                }
                Ok(None) => {}
                Err(mut failure) => {
                    if let Some(partial) = failure.partial.take() {
                        out.push(field.name.clone(), partial);
                    }
                    return Err(failure.with_partial(out.into()));
                }
            }
        }

        Ok((out, cursor))
    }

    fn decode_field(
        &mut self,
        field: &Field,
        data: &Bytes,
        cursor: usize,
        unit: &mut Option<BitUnit>,
        path: &mut Vec<SymbolId>,
    ) -> Result<Option<(DecodedValue, usize)>, DecodeFailure> {
        if field.kind == FieldKind::ArrayMarker {
            trace!("Skipping array marker {}", field.name);
            return Ok(None);
        }

        let kind = self.type_kind(field.type_id);
        let ty = match kind {
            TypeKind::Unknown => {
                debug!(
                    "Field {} references unknown type #{}",
                    field.name, field.type_id
                );
                Symbol::new(field.type_id, String::new(), 0)
            }
            _ => self.catalog.resolve_symbol(field.type_id)?,
        };

        let decoded = match &field.kind {
            FieldKind::Array(_) => {
                *unit = None;
                self.decode_array(field, &ty, kind, data, cursor, path)?
            }
            _ => self.decode_scalar(field, &ty, kind, data, cursor, unit, path)?,
        };
        Ok(Some(decoded))
    }

    #[allow(clippy::too_many_arguments)]
    fn decode_scalar(
        &mut self,
        field: &Field,
        ty: &Symbol,
        kind: TypeKind,
        data: &Bytes,
        cursor: usize,
        unit: &mut Option<BitUnit>,
        path: &mut Vec<SymbolId>,
    ) -> Result<(DecodedValue, usize), DecodeFailure> {
        match kind {
            TypeKind::Base(base) if field.is_bitfield() && self.config.share_bitfield_storage => {
                self.decode_bitfield(field, ty, base, data, cursor, unit)
            }
            TypeKind::Base(base) => {
                *unit = None;
                let width = byte_width(ty);
                let leaf = field_leaf(LeafKind::Base(base), field, take(data, cursor, width)?);
                Ok((leaf.into(), cursor + width))
            }
            TypeKind::Enum => {
                *unit = None;
                let width = byte_width(ty);
                let leaf = field_leaf(LeafKind::Enum(ty.id), field, take(data, cursor, width)?);
                Ok((leaf.into(), cursor + width))
            }
            TypeKind::Aggregate => {
                *unit = None;
                let (nested, next) = self.decode_aggregate(ty, data, cursor, path)?;
                Ok((nested.into(), next))
            }
            TypeKind::Unknown => {
                *unit = None;
                Ok((Leaf::unknown(ty.id).into(), cursor))
            }
        }
    }

    fn decode_bitfield(
        &mut self,
        field: &Field,
        ty: &Symbol,
        base: BaseType,
        data: &Bytes,
        cursor: usize,
        unit: &mut Option<BitUnit>,
    ) -> Result<(DecodedValue, usize), DecodeFailure> {
        let width = byte_width(ty);
        let bits = Some(BitRange {
            offset: field.bit_offset,
            size: field.bit_size,
        });

        let shared = (*unit).filter(|u| u.byte_offset == field.byte_offset && u.width == width);
        if let Some(shared) = shared {
            trace!(
                "Bit-field {} shares storage at offset {}",
                field.name,
                shared.start
            );
            let bytes = take(data, shared.start, width)?;
            let leaf = field_leaf(LeafKind::Base(base), field, bytes).with_bits(bits);
            return Ok((leaf.into(), cursor));
        }

        let bytes = take(data, cursor, width)?;
        *unit = Some(BitUnit {
            byte_offset: field.byte_offset,
            start: cursor,
            width,
        });
        let leaf = field_leaf(LeafKind::Base(base), field, bytes).with_bits(bits);
        Ok((leaf.into(), cursor + width))
    }

    fn decode_array(
        &mut self,
        field: &Field,
        element: &Symbol,
        kind: TypeKind,
        data: &Bytes,
        cursor: usize,
        path: &mut Vec<SymbolId>,
    ) -> Result<(DecodedValue, usize), DecodeFailure> {
        let count = usize::try_from(field.kind.element_count()).unwrap_or(usize::MAX);
        let width = byte_width(element);

        match kind {
            TypeKind::Base(base) => {
                let total = count.checked_mul(width).unwrap_or(usize::MAX);
                let leaf = field_leaf(LeafKind::Base(base), field, take(data, cursor, total)?);
                Ok((leaf.into(), cursor + total))
            }
            TypeKind::Enum => {
                let count = if width == 0 { count.min(1) } else { count };
                let total = count.checked_mul(width).unwrap_or(usize::MAX);
                take(data, cursor, total)?;
                let items = (0..count)
                    .map(|i| {
                        let start = cursor + i * width;
                        let bytes = data.slice(start..start + width);
                        field_leaf(LeafKind::Enum(element.id), field, bytes).into()
                    })
                    .collect();
                Ok((DecodedValue::Sequence(items), cursor + total))
            }
            TypeKind::Aggregate => {
                let mut items = Vec::new();
                let mut cursor = cursor;
                for _ in 0..count {
                    match self.decode_aggregate(element, data, cursor, path) {
                        Ok((nested, next)) => {
                            items.push(nested.into());
                            if next == cursor {
                                debug!(
                                    "Elements of {} consume no bytes; stopping after {}",
                                    field.name,
                                    items.len()
                                );
                                break;
                            }
                            cursor = next;
                        }
                        Err(mut failure) => {
                            if let Some(partial) = failure.partial.take() {
                                items.push(partial);
                            }
                            return Err(failure.with_partial(DecodedValue::Sequence(items)));
                        }
                    }
                }
                Ok((DecodedValue::Sequence(items), cursor))
            }
            TypeKind::Unknown => Ok((Leaf::unknown(element.id).into(), cursor)),
        }
    }
}

/// Builds a leaf carrying the field's endianness
fn field_leaf(kind: LeafKind, field: &Field, bytes: Bytes) -> Leaf {
    Leaf::new(kind, bytes).with_endianness(field.little_endian)
}

/// Catalog byte size as a `usize`; oversized values saturate and fail the bounds check
fn byte_width(symbol: &Symbol) -> usize {
    usize::try_from(symbol.byte_size).unwrap_or(usize::MAX)
}

/// Slices `len` bytes at `offset`, failing instead of reading out of bounds
fn take(data: &Bytes, offset: usize, len: usize) -> Result<Bytes, Error> {
    let available = data.len().saturating_sub(offset);
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(data.slice(offset..end)),
        _ => Err(Error::truncated_data(offset, len, available)),
    }
}
