//! In-memory catalog built from a JSON snapshot of the catalog tables.

use super::{
    ArtifactId, ArtifactSymbol, Dimension, Elf, Enumerator, Field, FieldId, FieldRecord,
    SourceFile, SourceFileId, Symbol, SymbolId, TypeCatalog, Variable,
};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Row-level contents of a catalog, one vector per table
///
/// Deserializes from a JSON object whose keys name the catalog tables (`symbols`, `fields`,
/// `dimension_lists`, `enumerations`, `variables`, `elfs`, `artifacts`,
/// `elf_symbol_table`); absent tables are empty and unknown columns are ignored.
/// The builder methods make it easy to assemble small catalogs in code.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogSnapshot {
    /// `symbols` table
    pub symbols: Vec<Symbol>,
    /// `fields` table
    pub fields: Vec<FieldRecord>,
    /// `dimension_lists` table
    #[serde(rename = "dimension_lists", alias = "dimensions")]
    pub dimensions: Vec<Dimension>,
    /// `enumerations` table
    pub enumerations: Vec<Enumerator>,
    /// `variables` table
    pub variables: Vec<Variable>,
    /// `elfs` table: compiled artifacts
    pub elfs: Vec<Elf>,
    /// `artifacts` table: source files
    pub artifacts: Vec<SourceFile>,
    /// `elf_symbol_table` table
    #[serde(rename = "elf_symbol_table", alias = "artifact_symbols")]
    pub artifact_symbols: Vec<ArtifactSymbol>,
}

impl CatalogSnapshot {
    /// Creates an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a snapshot from JSON bytes
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Reads and parses a snapshot file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_json(&data)
    }

    /// Adds a symbol row
    pub fn symbol(mut self, id: SymbolId, name: impl Into<String>, byte_size: u64) -> Self {
        self.symbols.push(Symbol::new(id, name, byte_size));
        self
    }

    /// Adds a plain field row
    pub fn field(
        self,
        id: FieldId,
        owner: SymbolId,
        name: impl Into<String>,
        byte_offset: u64,
        type_id: SymbolId,
    ) -> Self {
        self.field_record(FieldRecord::new(id, owner, name, byte_offset, type_id))
    }

    /// Adds a fully specified field row
    pub fn field_record(mut self, record: FieldRecord) -> Self {
        self.fields.push(record);
        self
    }

    /// Adds a dimension row; `upper_bound` is inclusive
    pub fn dimension(mut self, field_id: FieldId, order: u32, upper_bound: u64) -> Self {
        let id = self.dimensions.len() as u64 + 1;
        self.dimensions.push(Dimension {
            id,
            field_id,
            order,
            upper_bound,
        });
        self
    }

    /// Adds an enumerator row
    pub fn enumerator(mut self, symbol: SymbolId, value: i64, name: impl Into<String>) -> Self {
        self.enumerations.push(Enumerator {
            symbol,
            value,
            name: name.into(),
        });
        self
    }

    /// Adds a variable row
    pub fn variable(mut self, name: impl Into<String>, type_id: SymbolId) -> Self {
        self.variables.push(Variable {
            name: name.into(),
            type_id,
        });
        self
    }

    /// Adds a compiled artifact row
    pub fn elf(mut self, id: ArtifactId, path: impl Into<PathBuf>, little_endian: bool) -> Self {
        self.elfs.push(Elf {
            id,
            path: path.into(),
            little_endian,
        });
        self
    }

    /// Adds a symbol table record
    pub fn artifact_symbol(mut self, entry: ArtifactSymbol) -> Self {
        self.artifact_symbols.push(entry);
        self
    }
}

/// A [`TypeCatalog`] held entirely in memory
///
/// Rows are indexed once at construction; queries are map lookups and clones.
/// Later rows win when ids or variable names repeat.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    symbols: HashMap<SymbolId, Symbol>,
    fields: HashMap<SymbolId, Vec<Field>>,
    dimensions: HashMap<FieldId, Vec<Dimension>>,
    enumerators: HashMap<SymbolId, Vec<Enumerator>>,
    variables: HashMap<String, SymbolId>,
    elfs: HashMap<ArtifactId, Elf>,
    source_files: HashMap<SourceFileId, SourceFile>,
    artifact_symbols: Vec<ArtifactSymbol>,
}

impl MemoryCatalog {
    /// Indexes a snapshot
    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let mut dimensions: HashMap<FieldId, Vec<Dimension>> = HashMap::new();
        for dimension in snapshot.dimensions {
            dimensions
                .entry(dimension.field_id)
                .or_default()
                .push(dimension);
        }
        for list in dimensions.values_mut() {
            list.sort_by_key(|d| (d.order, d.id));
        }

        let mut fields: HashMap<SymbolId, Vec<Field>> = HashMap::new();
        for record in snapshot.fields {
            let dims = dimensions.get(&record.id).cloned().unwrap_or_default();
            fields
                .entry(record.symbol)
                .or_default()
                .push(Field::from_record(record, dims));
        }
        for list in fields.values_mut() {
            list.sort_by_key(|f| (f.byte_offset, f.id));
        }

        let mut enumerators: HashMap<SymbolId, Vec<Enumerator>> = HashMap::new();
        for enumerator in snapshot.enumerations {
            enumerators
                .entry(enumerator.symbol)
                .or_default()
                .push(enumerator);
        }

        let catalog = Self {
            symbols: snapshot.symbols.into_iter().map(|s| (s.id, s)).collect(),
            fields,
            dimensions,
            enumerators,
            variables: snapshot
                .variables
                .into_iter()
                .map(|v| (v.name, v.type_id))
                .collect(),
            elfs: snapshot.elfs.into_iter().map(|e| (e.id, e)).collect(),
            source_files: snapshot
                .artifacts
                .into_iter()
                .map(|a| (a.id, a))
                .collect(),
            artifact_symbols: snapshot.artifact_symbols,
        };

        debug!(
            "Indexed catalog: {} symbols, {} variables, {} artifact symbols",
            catalog.symbols.len(),
            catalog.variables.len(),
            catalog.artifact_symbols.len()
        );

        catalog
    }

    /// Parses and indexes a JSON snapshot
    pub fn from_json(data: &[u8]) -> Result<Self> {
        CatalogSnapshot::from_json(data).map(Self::from_snapshot)
    }

    /// Reads, parses and indexes a JSON snapshot file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        CatalogSnapshot::load(path).map(Self::from_snapshot)
    }

    /// Number of symbols in the catalog
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Source file that declared a symbol, if the catalog recorded one
    pub fn declared_in(&self, symbol: &Symbol) -> Option<&SourceFile> {
        symbol.artifact.and_then(|id| self.source_files.get(&id))
    }
}

impl From<CatalogSnapshot> for MemoryCatalog {
    fn from(snapshot: CatalogSnapshot) -> Self {
        Self::from_snapshot(snapshot)
    }
}

impl TypeCatalog for MemoryCatalog {
    fn resolve_symbol(&self, id: SymbolId) -> Result<Symbol> {
        self.symbols
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::symbol_not_found(id))
    }

    fn fields_of(&self, symbol: SymbolId) -> Vec<Field> {
        self.fields.get(&symbol).cloned().unwrap_or_default()
    }

    fn dimensions_of(&self, field: FieldId) -> Vec<Dimension> {
        self.dimensions.get(&field).cloned().unwrap_or_default()
    }

    fn enumerators_of(&self, symbol: SymbolId) -> Vec<Enumerator> {
        self.enumerators.get(&symbol).cloned().unwrap_or_default()
    }

    fn variable_type(&self, name: &str) -> Result<SymbolId> {
        self.variables
            .get(name)
            .copied()
            .ok_or_else(|| Error::variable_not_found(name))
    }

    fn elf(&self, id: ArtifactId) -> Result<Elf> {
        self.elfs
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::artifact_not_found(id))
    }

    fn elf_little_endian(&self, id: ArtifactId) -> Option<bool> {
        self.elfs.get(&id).map(|elf| elf.little_endian)
    }

    fn artifact_symbols(&self) -> Vec<ArtifactSymbol> {
        self.artifact_symbols.clone()
    }

    fn is_array(&self, field: FieldId) -> bool {
        self.dimensions.contains_key(&field)
    }

    fn is_enum(&self, symbol: SymbolId) -> bool {
        self.enumerators.contains_key(&symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BaseType, FieldKind, TypeKind};
    use pretty_assertions::assert_eq;

    const SNAPSHOT: &str = r#"{
        "symbols": [
            {"id": 1, "elf": 1, "name": "int32", "byte_size": 4},
            {"id": 2, "elf": 1, "name": "Telemetry", "byte_size": 12},
            {"id": 3, "elf": 1, "name": "Mode", "byte_size": 1}
        ],
        "fields": [
            {"id": 11, "symbol": 2, "name": "count", "byte_offset": 8, "type": 1,
             "little_endian": true, "bit_size": 0, "bit_offset": 0},
            {"id": 10, "symbol": 2, "name": "samples", "byte_offset": 0, "type": 1,
             "little_endian": true, "bit_size": 0, "bit_offset": 0}
        ],
        "dimension_lists": [
            {"id": 1, "field_id": 10, "dim_order": 0, "upper_bound": 1}
        ],
        "enumerations": [
            {"symbol": 3, "value": 0, "name": "IDLE"},
            {"symbol": 3, "value": 1, "name": "ACTIVE"}
        ],
        "variables": [{"name": "hk_tlm", "type": 2}],
        "elfs": [{"id": 1, "name": "/opt/fsw/core.elf", "md5": "abc",
                  "date": "2024-05-01 12:00:00", "little_endian": true}],
        "elf_symbol_table": [
            {"name": 4, "elf": 1, "value": 16, "size": 12, "info": 17, "other": 0,
             "section_index": 3, "file_offset": 4096, "string_table_file_offset": 8192}
        ]
    }"#;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::from_json(SNAPSHOT.as_bytes()).unwrap()
    }

    #[test]
    fn test_parses_table_layout() {
        let catalog = catalog();
        assert_eq!(catalog.symbol_count(), 3);
        assert_eq!(catalog.resolve_symbol(2).unwrap().name, "Telemetry");
        assert_eq!(catalog.variable_type("hk_tlm").unwrap(), 2);
        assert_eq!(
            catalog.artifact_path(1).unwrap(),
            PathBuf::from("/opt/fsw/core.elf")
        );

        let entries = catalog.artifact_symbols();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].storage_offset(), Some(4112));
        assert_eq!(entries[0].section_index, 3);
        assert_eq!(entries[0].name_offset(), Some(8196));
    }

    #[test]
    fn test_fields_sorted_by_offset() {
        let names: Vec<_> = catalog()
            .fields_of(2)
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["samples", "count"]);
    }

    #[test]
    fn test_field_kinds_resolved() {
        let fields = catalog().fields_of(2);
        assert!(matches!(fields[0].kind, FieldKind::Array(_)));
        assert_eq!(fields[0].kind.element_count(), 2);
        assert_eq!(fields[1].kind, FieldKind::Scalar);
    }

    #[test]
    fn test_array_and_enum_queries() {
        let catalog = catalog();
        assert!(catalog.is_array(10));
        assert!(!catalog.is_array(11));
        assert!(catalog.is_enum(3));
        assert!(!catalog.is_enum(1));
        assert_eq!(catalog.enumerators_of(3).len(), 2);
    }

    #[test]
    fn test_type_kind() {
        let catalog = catalog();
        assert_eq!(catalog.type_kind(1), TypeKind::Base(BaseType::SignedInteger));
        assert_eq!(catalog.type_kind(3), TypeKind::Enum);
        assert_eq!(catalog.type_kind(2), TypeKind::Aggregate);
        assert_eq!(catalog.type_kind(99), TypeKind::Unknown);
    }

    #[test]
    fn test_misses_are_not_found() {
        let catalog = catalog();
        assert!(catalog.resolve_symbol(99).unwrap_err().is_not_found());
        assert!(catalog
            .variable_type("missing")
            .unwrap_err()
            .is_not_found());
        assert!(catalog.artifact_path(7).unwrap_err().is_not_found());
        assert!(catalog.fields_of(99).is_empty());
    }

    #[test]
    fn test_load_reports_path() {
        let err = MemoryCatalog::load("/nonexistent/catalog.json").unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
        assert!(err.to_string().contains("/nonexistent/catalog.json"));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = MemoryCatalog::from_json(b"{\"symbols\": 3}").unwrap_err();
        assert!(matches!(err, Error::CatalogParse(_)));
    }

    /// Every table with every column the catalog writer emits
    const FULL_EXPORT: &str = r#"{
        "elfs": [
            {"id": 1, "name": "/opt/fsw/core.elf", "md5": "9a0364b9",
             "date": "2024-05-01 12:00:00", "little_endian": false}
        ],
        "artifacts": [
            {"id": 5, "elf": 1, "path": "/src/fsw/hk.h", "md5": "77aa01"}
        ],
        "symbols": [
            {"id": 1, "elf": 1, "name": "uint16", "byte_size": 2, "artifact": null},
            {"id": 2, "elf": 1, "name": "HkPacket", "byte_size": 2, "artifact": 5}
        ],
        "fields": [
            {"id": 20, "symbol": 2, "name": "seq", "byte_offset": 0, "type": 1,
             "little_endian": null, "bit_size": 0, "bit_offset": 0,
             "short_description": "", "long_description": ""}
        ],
        "dimension_lists": [],
        "enumerations": [
            {"id": 1, "symbol": 2, "value": 0, "name": "UNUSED"}
        ],
        "variables": [
            {"id": 1, "name": "hk", "elf": 1, "type": 2,
             "short_description": "", "long_description": ""}
        ],
        "elf_symbol_table": [
            {"id": 1, "name": 1, "elf": 1, "value": 0, "size": 2, "info": 17, "other": 0,
             "section_index": 3, "file_offset": 4096, "string_table_file_offset": 8192}
        ]
    }"#;

    #[test]
    fn test_loads_full_export() {
        let catalog = MemoryCatalog::from_json(FULL_EXPORT.as_bytes()).unwrap();

        let elf = catalog.elf(1).unwrap();
        assert_eq!(elf.path, PathBuf::from("/opt/fsw/core.elf"));
        assert!(!elf.little_endian);
        assert_eq!(catalog.elf_little_endian(1), Some(false));
        assert_eq!(catalog.elf_little_endian(2), None);

        let packet = catalog.resolve_symbol(2).unwrap();
        assert_eq!(packet.elf, Some(1));
        assert_eq!(
            catalog.declared_in(&packet).map(|f| f.path.clone()),
            Some(PathBuf::from("/src/fsw/hk.h"))
        );
        assert!(catalog
            .declared_in(&catalog.resolve_symbol(1).unwrap())
            .is_none());

        assert_eq!(catalog.fields_of(2)[0].little_endian, None);
        assert_eq!(catalog.variable_type("hk").unwrap(), 2);

        let entry = catalog.artifact_symbols()[0];
        assert_eq!(entry.name_index, 1);
        assert_eq!(entry.artifact, 1);
        assert_eq!(entry.str_table_file_offset, 8192);
    }

    #[test]
    fn test_source_files_are_not_artifacts() {
        let catalog = MemoryCatalog::from_json(
            br#"{"artifacts": [{"id": 1, "elf": 1, "path": "/src/hk.h", "md5": "ab"}]}"#,
        )
        .unwrap();
        assert!(catalog.artifact_path(1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_builder_matches_json() {
        let built = MemoryCatalog::from_snapshot(
            CatalogSnapshot::new()
                .symbol(1, "int32", 4)
                .symbol(2, "Telemetry", 12)
                .field(11, 2, "count", 8, 1)
                .field(10, 2, "samples", 0, 1)
                .dimension(10, 0, 1),
        );
        assert_eq!(built.fields_of(2), catalog().fields_of(2));
    }
}
