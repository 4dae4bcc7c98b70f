//! Type catalog model and query surface.
//!
//! The catalog describes the types of a compiled program: symbols (named types with a
//! byte size), the fields of aggregate symbols, array dimensions, enumeration tables,
//! named global variables, the compiled artifacts (ELF images) they were extracted from
//! and the source files that declared them.
//!
//! ## Extensibility
//!
//! [`TypeCatalog`] is the only thing the decoder and walker need. [`MemoryCatalog`]
//! implements it over a JSON snapshot of the catalog tables; other backing stores can
//! implement it directly:
//!
//! ```no_run
//! use strata_core::catalog::{
//!     ArtifactId, ArtifactSymbol, Dimension, Elf, Enumerator, Field, Symbol, SymbolId,
//!     TypeCatalog,
//! };
//! use strata_core::{Error, Result};
//!
//! struct EmptyCatalog;
//!
//! impl TypeCatalog for EmptyCatalog {
//!     fn resolve_symbol(&self, id: SymbolId) -> Result<Symbol> {
//!         Err(Error::symbol_not_found(id))
//!     }
//!     fn fields_of(&self, _symbol: SymbolId) -> Vec<Field> { vec![] }
//!     fn dimensions_of(&self, _field: u64) -> Vec<Dimension> { vec![] }
//!     fn enumerators_of(&self, _symbol: SymbolId) -> Vec<Enumerator> { vec![] }
//!     fn variable_type(&self, name: &str) -> Result<SymbolId> {
//!         Err(Error::variable_not_found(name))
//!     }
//!     fn elf(&self, id: ArtifactId) -> Result<Elf> {
//!         Err(Error::artifact_not_found(id))
//!     }
//!     fn artifact_symbols(&self) -> Vec<ArtifactSymbol> { vec![] }
//! }
//! ```

mod base_type;
mod memory;

use crate::error::Result;
use serde::Deserialize;
use std::path::PathBuf;

pub use base_type::{classify_base_type, BaseType, PADDING_PREFIX};
pub use memory::{CatalogSnapshot, MemoryCatalog};

/// Symbol row id
pub type SymbolId = u64;
/// Field row id
pub type FieldId = u64;
/// Compiled artifact (`elfs` row) id
pub type ArtifactId = u64;
/// Source file (`artifacts` row) id
pub type SourceFileId = u64;

/// A named type with a byte size
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Symbol {
    /// Unique id
    pub id: SymbolId,
    /// Compiled artifact the symbol was extracted from
    #[serde(default)]
    pub elf: Option<ArtifactId>,
    /// Declared type name
    pub name: String,
    /// Storage size in bytes
    pub byte_size: u64,
    /// Source file that declared the symbol
    #[serde(default)]
    pub artifact: Option<SourceFileId>,
}

impl Symbol {
    /// Creates a new symbol with no owning artifact
    pub fn new(id: SymbolId, name: impl Into<String>, byte_size: u64) -> Self {
        Self {
            id,
            elf: None,
            name: name.into(),
            byte_size,
            artifact: None,
        }
    }

    /// Sets the compiled artifact the symbol belongs to
    pub fn in_elf(mut self, elf: ArtifactId) -> Self {
        self.elf = Some(elf);
        self
    }
}

/// One dimension of an array field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Dimension {
    /// Row id, breaks ties in `order`
    #[serde(default)]
    pub id: u64,
    /// Field the dimension belongs to
    pub field_id: FieldId,
    /// Position of this dimension, outermost first
    #[serde(rename = "dim_order")]
    pub order: u32,
    /// Inclusive upper bound: `int a[3]` has an upper bound of 2
    pub upper_bound: u64,
}

impl Dimension {
    /// Number of elements along this dimension
    pub fn extent(&self) -> u64 {
        self.upper_bound.saturating_add(1)
    }
}

/// How a field occupies storage, resolved once when the field is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Single value of the field's type
    Scalar,
    /// Field whose type is its own owner; it describes an array elsewhere and has no payload
    ArrayMarker,
    /// Array with one or more dimensions, in dimension order
    Array(Vec<Dimension>),
}

impl FieldKind {
    /// Resolves the kind of a field from its owner, type and dimension entries
    pub fn resolve(owner: SymbolId, type_id: SymbolId, mut dimensions: Vec<Dimension>) -> Self {
        if type_id == owner {
            FieldKind::ArrayMarker
        } else if dimensions.is_empty() {
            FieldKind::Scalar
        } else {
            dimensions.sort_by_key(|d| (d.order, d.id));
            FieldKind::Array(dimensions)
        }
    }

    /// Total element count across all dimensions, saturating on overflow.
    ///
    /// Scalars count as one element and array markers as none.
    pub fn element_count(&self) -> u64 {
        match self {
            FieldKind::Scalar => 1,
            FieldKind::ArrayMarker => 0,
            FieldKind::Array(dimensions) => dimensions
                .iter()
                .fold(1u64, |count, d| count.saturating_mul(d.extent())),
        }
    }
}

/// Raw field row as stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldRecord {
    /// Unique id
    pub id: FieldId,
    /// Aggregate this field belongs to
    pub symbol: SymbolId,
    /// Member name
    pub name: String,
    /// Offset within the owner
    pub byte_offset: u64,
    /// Type symbol of the member
    #[serde(rename = "type")]
    pub type_id: SymbolId,
    /// Endianness, when the catalog recorded it
    #[serde(default)]
    pub little_endian: Option<bool>,
    /// Width in bits for bit-field members, 0 otherwise
    #[serde(default)]
    pub bit_size: u32,
    /// Bit position within the storage unit for bit-field members
    #[serde(default)]
    pub bit_offset: u32,
    /// One-line description from the source comments
    #[serde(default)]
    pub short_description: String,
    /// Full description from the source comments
    #[serde(default)]
    pub long_description: String,
}

impl FieldRecord {
    /// Creates a plain (non bit-field) member row
    pub fn new(
        id: FieldId,
        symbol: SymbolId,
        name: impl Into<String>,
        byte_offset: u64,
        type_id: SymbolId,
    ) -> Self {
        Self {
            id,
            symbol,
            name: name.into(),
            byte_offset,
            type_id,
            little_endian: Some(true),
            bit_size: 0,
            bit_offset: 0,
            short_description: String::new(),
            long_description: String::new(),
        }
    }

    /// Marks this row as a bit-field member
    pub fn bits(mut self, bit_offset: u32, bit_size: u32) -> Self {
        self.bit_offset = bit_offset;
        self.bit_size = bit_size;
        self
    }
}

/// A member of an aggregate symbol with its storage kind resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Unique id
    pub id: FieldId,
    /// Aggregate this field belongs to
    pub symbol: SymbolId,
    /// Member name
    pub name: String,
    /// Offset within the owner
    pub byte_offset: u64,
    /// Type symbol of the member
    pub type_id: SymbolId,
    /// Endianness, when the catalog recorded it
    pub little_endian: Option<bool>,
    /// Width in bits for bit-field members, 0 otherwise
    pub bit_size: u32,
    /// Bit position within the storage unit
    pub bit_offset: u32,
    /// Short description
    pub short_description: String,
    /// Long description
    pub long_description: String,
    /// Storage kind
    pub kind: FieldKind,
}

impl Field {
    /// Builds a field from its row and dimension entries
    pub fn from_record(record: FieldRecord, dimensions: Vec<Dimension>) -> Self {
        let kind = FieldKind::resolve(record.symbol, record.type_id, dimensions);
        Self {
            id: record.id,
            symbol: record.symbol,
            name: record.name,
            byte_offset: record.byte_offset,
            type_id: record.type_id,
            little_endian: record.little_endian,
            bit_size: record.bit_size,
            bit_offset: record.bit_offset,
            short_description: record.short_description,
            long_description: record.long_description,
            kind,
        }
    }

    /// Returns true for bit-field members
    pub fn is_bitfield(&self) -> bool {
        self.bit_size > 0
    }
}

/// One (value, label) pair of an enumeration symbol
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Enumerator {
    /// Enumeration symbol
    pub symbol: SymbolId,
    /// Numeric value
    pub value: i64,
    /// Label
    pub name: String,
}

/// A named global and its declared type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Variable {
    /// Variable name as it appears in the artifact's string table
    pub name: String,
    /// Declared type symbol
    #[serde(rename = "type")]
    pub type_id: SymbolId,
}

/// A compiled artifact (ELF image) the walker reads variables from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Elf {
    /// Unique id
    pub id: ArtifactId,
    /// Path to the image
    #[serde(alias = "name")]
    pub path: PathBuf,
    /// Byte order of the image; fields without their own flag use it
    pub little_endian: bool,
}

/// A source file that declared symbols of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceFile {
    /// Unique id
    pub id: SourceFileId,
    /// Artifact built from the file
    pub elf: ArtifactId,
    /// Path of the source file
    pub path: PathBuf,
    /// Checksum recorded when the catalog was built
    #[serde(default)]
    pub md5: String,
}

/// Raw symbol table record locating a variable's storage and name inside an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ArtifactSymbol {
    /// Offset of the name within the string table
    #[serde(alias = "name")]
    pub name_index: u64,
    /// Owning artifact
    #[serde(alias = "elf")]
    pub artifact: ArtifactId,
    /// Offset of the storage within its section
    pub value: u64,
    /// Storage size in bytes
    pub size: u64,
    /// Section the storage lives in
    #[serde(default)]
    pub section_index: u32,
    /// File offset of the section holding the storage
    pub file_offset: u64,
    /// File offset of the string table
    #[serde(alias = "string_table_file_offset")]
    pub str_table_file_offset: u64,
}

impl ArtifactSymbol {
    /// File offset of the variable's storage, `None` on overflow
    pub fn storage_offset(&self) -> Option<u64> {
        self.file_offset.checked_add(self.value)
    }

    /// File offset of the variable's NUL-terminated name, `None` on overflow
    pub fn name_offset(&self) -> Option<u64> {
        self.str_table_file_offset.checked_add(self.name_index)
    }
}

/// How the decoder treats a type symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Scalar recognized by name
    Base(BaseType),
    /// Enumeration storage
    Enum,
    /// Structure with its own fields
    Aggregate,
    /// Type symbol missing from the catalog
    Unknown,
}

/// Read-only query surface over a type catalog
///
/// All queries take `&self`; implementations must not mutate shared state so that
/// several decoders can query one catalog.
pub trait TypeCatalog {
    /// Looks up a symbol by id
    fn resolve_symbol(&self, id: SymbolId) -> Result<Symbol>;

    /// Returns the fields of an aggregate ordered by byte offset, ties by field id
    fn fields_of(&self, symbol: SymbolId) -> Vec<Field>;

    /// Returns the dimensions of a field in dimension order
    fn dimensions_of(&self, field: FieldId) -> Vec<Dimension>;

    /// Returns the enumeration table of a symbol
    fn enumerators_of(&self, symbol: SymbolId) -> Vec<Enumerator>;

    /// Looks up the declared type of a global variable
    fn variable_type(&self, name: &str) -> Result<SymbolId>;

    /// Looks up a compiled artifact
    fn elf(&self, id: ArtifactId) -> Result<Elf>;

    /// Returns every symbol table record known to the catalog
    fn artifact_symbols(&self) -> Vec<ArtifactSymbol>;

    /// Looks up the file path of a compiled artifact
    fn artifact_path(&self, id: ArtifactId) -> Result<PathBuf> {
        self.elf(id).map(|elf| elf.path)
    }

    /// Byte order of a compiled artifact, `None` if it is not in the catalog
    fn elf_little_endian(&self, id: ArtifactId) -> Option<bool> {
        self.elf(id).ok().map(|elf| elf.little_endian)
    }

    /// Returns true if the field has at least one dimension
    fn is_array(&self, field: FieldId) -> bool {
        !self.dimensions_of(field).is_empty()
    }

    /// Returns true if the symbol has at least one enumerator
    fn is_enum(&self, symbol: SymbolId) -> bool {
        !self.enumerators_of(symbol).is_empty()
    }

    /// Classifies a type symbol; enumerations win over base type names and ids
    /// missing from the catalog are [`TypeKind::Unknown`]
    fn type_kind(&self, id: SymbolId) -> TypeKind {
        let Ok(symbol) = self.resolve_symbol(id) else {
            return TypeKind::Unknown;
        };
        if self.is_enum(id) {
            TypeKind::Enum
        } else if let Some(base) = classify_base_type(&symbol.name) {
            TypeKind::Base(base)
        } else {
            TypeKind::Aggregate
        }
    }
}
