//! Walking artifact symbol tables and decoding every variable found.
//!
//! For each symbol table record the walker opens the owning artifact, reads the
//! variable's storage and its NUL-terminated name, looks the name up in the catalog and
//! hands the bytes to the [`OverlayDecoder`]. Problems with one record are recorded in
//! the [`WalkReport`] and never stop the walk.

mod source;

use crate::catalog::{ArtifactId, ArtifactSymbol, TypeCatalog};
use crate::error::Error;
use crate::overlay::{Aggregate, DecodedValue, DecoderConfig, OverlayDecoder};
use tracing::{debug, trace, warn};

pub use source::{read_entry, read_name, read_storage, EntryData};

/// Configuration for the walker
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Maximum number of symbol table records to visit (0 = unlimited)
    pub max_entries: usize,
    /// Maximum length of a variable name in the string table
    pub max_name_len: usize,
    /// Decoder configuration
    pub decoder: DecoderConfig,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_entries: 0,
            max_name_len: 4096,
            decoder: DecoderConfig::default(),
        }
    }
}

impl WalkerConfig {
    /// Creates a new walker config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of records to visit
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Sets the name scan limit
    pub fn max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = len;
        self
    }

    /// Sets the decoder configuration
    pub fn decoder(mut self, config: DecoderConfig) -> Self {
        self.decoder = config;
        self
    }
}

/// Why a record was not decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Record has no storage
    EmptyStorage,
    /// Owning artifact is not in the catalog
    UnknownArtifact(ArtifactId),
    /// Name is not a catalog variable
    UnknownVariable(String),
}

/// Result of visiting one symbol table record
#[derive(Debug)]
pub enum EntryOutcome {
    /// Variable decoded completely
    Decoded {
        /// Variable name
        variable: String,
        /// Decoded tree
        value: Aggregate,
    },
    /// Record skipped
    Skipped(SkipReason),
    /// Reading or decoding failed
    Failed {
        /// Variable name, if it was read
        variable: Option<String>,
        /// What went wrong
        error: Error,
        /// Tree decoded before the failure
        partial: Option<DecodedValue>,
    },
}

/// Counters over a walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Records visited
    pub visited: usize,
    /// Variables decoded
    pub decoded: usize,
    /// Records skipped
    pub skipped: usize,
    /// Records that failed
    pub failed: usize,
}

/// Outcomes of a walk in visit order
#[derive(Debug, Default)]
pub struct WalkReport {
    /// Per-record outcomes
    pub outcomes: Vec<EntryOutcome>,
    /// Counters
    pub stats: WalkStats,
}

impl WalkReport {
    fn record(&mut self, outcome: EntryOutcome) {
        self.stats.visited += 1;
        match &outcome {
            EntryOutcome::Decoded { .. } => self.stats.decoded += 1,
            EntryOutcome::Skipped(_) => self.stats.skipped += 1,
            EntryOutcome::Failed { .. } => self.stats.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Iterates over the decoded variables
    pub fn decoded(&self) -> impl Iterator<Item = (&str, &Aggregate)> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            EntryOutcome::Decoded { variable, value } => Some((variable.as_str(), value)),
            _ => None,
        })
    }
}

/// Decodes every variable reachable from the catalog's symbol table records
pub struct ArtifactWalker<'c, C: TypeCatalog + ?Sized> {
    decoder: OverlayDecoder<'c, C>,
    config: WalkerConfig,
}

impl<'c, C: TypeCatalog + ?Sized> ArtifactWalker<'c, C> {
    /// Creates a walker with default configuration
    pub fn new(catalog: &'c C) -> Self {
        Self::with_config(catalog, WalkerConfig::default())
    }

    /// Creates a walker with custom configuration
    pub fn with_config(catalog: &'c C, config: WalkerConfig) -> Self {
        Self {
            decoder: OverlayDecoder::with_config(catalog, config.decoder.clone()),
            config,
        }
    }

    /// Visits every symbol table record in the catalog
    pub fn walk(&mut self) -> WalkReport {
        let entries = self.decoder.catalog().artifact_symbols();
        let limit = match self.config.max_entries {
            0 => entries.len(),
            max => max.min(entries.len()),
        };

        debug!("Walking {} of {} symbol table records", limit, entries.len());

        let mut report = WalkReport::default();
        for entry in &entries[..limit] {
            report.record(self.visit(entry));
        }

        debug!(
            "Walk complete: {} decoded, {} skipped, {} failed",
            report.stats.decoded, report.stats.skipped, report.stats.failed
        );
        report
    }

    /// Reads and decodes a single symbol table record
    pub fn visit(&mut self, entry: &ArtifactSymbol) -> EntryOutcome {
        if entry.size == 0 {
            trace!("Skipping record with empty storage");
            return EntryOutcome::Skipped(SkipReason::EmptyStorage);
        }

        let catalog = self.decoder.catalog();
        let path = match catalog.artifact_path(entry.artifact) {
            Ok(path) => path,
            Err(_) => {
                warn!("No artifact #{} in catalog", entry.artifact);
                return EntryOutcome::Skipped(SkipReason::UnknownArtifact(entry.artifact));
            }
        };

        let data = match read_entry(&path, entry, self.config.max_name_len) {
            Ok(data) => data,
            Err(error) => {
                warn!("{}", error);
                return EntryOutcome::Failed {
                    variable: None,
                    error,
                    partial: None,
                };
            }
        };

        let Ok(type_id) = catalog.variable_type(&data.name) else {
            debug!("Skipping {}: not a catalog variable", data.name);
            return EntryOutcome::Skipped(SkipReason::UnknownVariable(data.name));
        };

        let root = match catalog.resolve_symbol(type_id) {
            Ok(root) => root,
            Err(error) => {
                warn!("Variable {} has no type: {}", data.name, error);
                return EntryOutcome::Failed {
                    variable: Some(data.name),
                    error,
                    partial: None,
                };
            }
        };

        trace!(
            "Decoding {} as {} ({} bytes from {})",
            data.name,
            root.name,
            data.storage.len(),
            path.display()
        );

        match self.decoder.decode(&root, &data.storage, 0) {
            Ok(decoded) => EntryOutcome::Decoded {
                variable: data.name,
                value: decoded.value,
            },
            Err(failure) => {
                warn!("Failed to decode {}: {}", data.name, failure.error);
                EntryOutcome::Failed {
                    variable: Some(data.name),
                    error: failure.error,
                    partial: failure.partial,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogSnapshot, MemoryCatalog};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    /// Lays out an artifact: storage section at 0x10, string table at 0x40
    fn write_artifact(dir: &Path) -> std::path::PathBuf {
        let mut image = vec![0u8; 0x60];
        image[0x10..0x18].copy_from_slice(&[1, 0, 0, 0, 2, 0, 0, 0]);
        image[0x18..0x1A].copy_from_slice(&[7, 0]);
        image[0x1C..0x20].copy_from_slice(&[3, 0, 0, 0]);
        image[0x40..0x55].copy_from_slice(b"\0origin\0short\0orphan\0");

        let path = dir.join("app.elf");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&image).unwrap();
        path
    }

    fn entry(name_index: u64, value: u64, size: u64) -> ArtifactSymbol {
        ArtifactSymbol {
            name_index,
            artifact: 1,
            value,
            size,
            section_index: 2,
            file_offset: 0x10,
            str_table_file_offset: 0x40,
        }
    }

    fn catalog(artifact: &Path) -> MemoryCatalog {
        CatalogSnapshot::new()
            .symbol(1, "int32", 4)
            .symbol(2, "Point", 8)
            .symbol(3, "Wide", 8)
            .field(20, 2, "x", 0, 1)
            .field(21, 2, "y", 4, 1)
            .field(30, 3, "a", 0, 1)
            .field(31, 3, "b", 4, 1)
            .variable("origin", 2)
            .variable("short", 3)
            .elf(1, artifact, true)
            .artifact_symbol(entry(1, 0, 8))
            .artifact_symbol(entry(8, 8, 2))
            .artifact_symbol(entry(14, 12, 4))
            .artifact_symbol(entry(21, 0, 0))
            .artifact_symbol(ArtifactSymbol {
                artifact: 9,
                ..entry(1, 0, 8)
            })
            .into()
    }

    #[test]
    fn test_walk_reports_every_record() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&write_artifact(dir.path()));
        let report = ArtifactWalker::new(&catalog).walk();

        assert_eq!(
            report.stats,
            WalkStats {
                visited: 5,
                decoded: 1,
                skipped: 3,
                failed: 1,
            }
        );

        let decoded: Vec<_> = report.decoded().collect();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, "origin");
        assert_eq!(
            serde_json::to_string(decoded[0].1).unwrap(),
            r#"{"Point":{"x":[1,0,0,0],"y":[2,0,0,0]}}"#
        );
    }

    #[test]
    fn test_short_storage_fails_with_partial() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&write_artifact(dir.path()));
        let outcome = ArtifactWalker::new(&catalog).visit(&entry(8, 8, 2));

        match outcome {
            EntryOutcome::Failed {
                variable,
                error,
                partial,
            } => {
                assert_eq!(variable.as_deref(), Some("short"));
                assert!(matches!(error, Error::TruncatedData { .. }));
                let partial = partial.unwrap();
                assert_eq!(partial.as_aggregate().unwrap().type_name(), "Wide");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_skip_reasons() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&write_artifact(dir.path()));
        let mut walker = ArtifactWalker::new(&catalog);

        assert!(matches!(
            walker.visit(&entry(21, 0, 0)),
            EntryOutcome::Skipped(SkipReason::EmptyStorage)
        ));
        assert!(matches!(
            walker.visit(&ArtifactSymbol {
                artifact: 9,
                ..entry(1, 0, 8)
            }),
            EntryOutcome::Skipped(SkipReason::UnknownArtifact(9))
        ));
        match walker.visit(&entry(14, 12, 4)) {
            EntryOutcome::Skipped(SkipReason::UnknownVariable(name)) => {
                assert_eq!(name, "orphan")
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_missing_artifact_file_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir.path().join("gone.elf"));
        let report = ArtifactWalker::new(&catalog).walk();

        assert_eq!(report.stats.visited, 5);
        assert_eq!(report.stats.decoded, 0);
        assert_eq!(report.stats.failed, 3);
    }

    #[test]
    fn test_max_entries() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&write_artifact(dir.path()));
        let config = WalkerConfig::new().max_entries(2);
        let report = ArtifactWalker::with_config(&catalog, config).walk();
        assert_eq!(report.stats.visited, 2);
    }
}
