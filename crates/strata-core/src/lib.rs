//! # strata-core
//!
//! A library for overlaying catalog type layouts onto the raw storage of global
//! variables in compiled artifacts.
//!
//! This crate provides the core functionality for:
//! - Querying a type catalog of symbols, fields, array dimensions and enumerations
//! - Decoding a variable's bytes into a named tree that mirrors its type
//! - Walking artifact symbol tables and decoding every variable they locate
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`catalog`]: Catalog model, the [`TypeCatalog`] query trait and an in-memory catalog
//! - [`overlay`]: The recursive overlay decoder and the decoded value tree
//! - [`walker`]: Symbol table walking and artifact file reads
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use strata_core::{MemoryCatalog, OverlayDecoder};
//! use bytes::Bytes;
//!
//! let catalog = MemoryCatalog::load("./build/catalog.json")?;
//! let data = Bytes::from(std::fs::read("./dumps/hk_tlm.bin")?);
//!
//! let mut decoder = OverlayDecoder::new(&catalog);
//! match decoder.decode_variable("hk_tlm", &data, 0) {
//!     Ok(decoded) => println!("{}", serde_json::to_string(&decoded.value)?),
//!     Err(failure) => eprintln!("decode stopped: {}", failure),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`TypeCatalog`]: Back the decoder with any catalog store

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod catalog;
pub mod error;
pub mod overlay;
pub mod walker;

// Re-export primary types for convenience
pub use catalog::{
    classify_base_type, BaseType, CatalogSnapshot, Elf, MemoryCatalog, SourceFile, Symbol,
    TypeCatalog, TypeKind,
};
pub use error::{Error, Result};
pub use overlay::{
    Aggregate, DecodeFailure, Decoded, DecodedValue, DecoderConfig, Leaf, LeafKind, OverlayDecoder,
};
pub use walker::{ArtifactWalker, EntryOutcome, SkipReason, WalkReport, WalkStats, WalkerConfig};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
