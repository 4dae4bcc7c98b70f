//! Error types for the strata-core library.
//!
//! Lookup misses, short byte sources and malformed type graphs each get their own
//! variant so callers can decide what is fatal. See [`Error::is_recoverable`].

use crate::catalog::{ArtifactId, SymbolId};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for strata operations
pub type Result<T> = std::result::Result<T, Error>;

/// A catalog lookup key that produced no row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Symbol by id
    Symbol(SymbolId),
    /// Variable by name
    Variable(String),
    /// Artifact by id
    Artifact(ArtifactId),
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Symbol(id) => write!(f, "symbol #{}", id),
            Lookup::Variable(name) => write!(f, "variable '{}'", name),
            Lookup::Artifact(id) => write!(f, "artifact #{}", id),
        }
    }
}

/// Error type for all strata operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read an input file (catalog snapshot or artifact)
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Catalog snapshot is not valid JSON or does not match the table layout
    #[error("failed to parse catalog snapshot: {0}")]
    CatalogParse(#[from] serde_json::Error),

    /// Catalog lookup miss
    #[error("{0} not found in catalog")]
    NotFound(Lookup),

    /// Byte source ended before a required copy
    #[error("truncated data at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedData {
        /// Cursor position of the failed copy
        offset: usize,
        /// Bytes the copy required
        needed: usize,
        /// Bytes left in the source from `offset`
        available: usize,
    },

    /// Type graph recursion revisited a symbol already on the path
    #[error("cyclic type at symbol #{symbol} (path: {})", format_chain(.chain))]
    CyclicType {
        /// Symbol that closed the cycle
        symbol: SymbolId,
        /// Symbol ids from the root down to and including `symbol`
        chain: Vec<SymbolId>,
    },

    /// Recursion went deeper than the configured limit
    #[error("type nesting exceeds maximum depth of {max_depth} at symbol #{symbol}")]
    DepthExceeded {
        /// Symbol that would have exceeded the limit
        symbol: SymbolId,
        /// Configured limit
        max_depth: usize,
    },
}

fn format_chain(chain: &[SymbolId]) -> String {
    chain
        .iter()
        .map(|id| format!("#{}", id))
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a symbol lookup miss
    pub fn symbol_not_found(id: SymbolId) -> Self {
        Self::NotFound(Lookup::Symbol(id))
    }

    /// Creates a variable lookup miss
    pub fn variable_not_found(name: impl Into<String>) -> Self {
        Self::NotFound(Lookup::Variable(name.into()))
    }

    /// Creates an artifact lookup miss
    pub fn artifact_not_found(id: ArtifactId) -> Self {
        Self::NotFound(Lookup::Artifact(id))
    }

    /// Creates a new truncated data error
    pub fn truncated_data(offset: usize, needed: usize, available: usize) -> Self {
        Self::TruncatedData {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new cyclic type error
    pub fn cyclic_type(symbol: SymbolId, chain: Vec<SymbolId>) -> Self {
        Self::CyclicType { symbol, chain }
    }

    /// Creates a new depth limit error
    pub fn depth_exceeded(symbol: SymbolId, max_depth: usize) -> Self {
        Self::DepthExceeded { symbol, max_depth }
    }

    /// Returns true if this error only affects a single variable and a walk can move on
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::TruncatedData { .. }
                | Self::CyclicType { .. }
                | Self::DepthExceeded { .. }
        )
    }

    /// Returns true if this is a catalog lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::truncated_data(8, 4, 2);
        assert_eq!(
            err.to_string(),
            "truncated data at offset 8: need 4 bytes, 2 available"
        );

        let err = Error::variable_not_found("sensor_table");
        assert_eq!(err.to_string(), "variable 'sensor_table' not found in catalog");
    }

    #[test]
    fn test_cyclic_display_lists_chain() {
        let err = Error::cyclic_type(3, vec![3, 7, 3]);
        assert!(err.to_string().contains("#3 -> #7 -> #3"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::truncated_data(0, 1, 0).is_recoverable());
        assert!(Error::cyclic_type(1, vec![1]).is_recoverable());
        assert!(Error::symbol_not_found(9).is_recoverable());

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!Error::file_read("/tmp/app.elf", io).is_recoverable());
    }
}
