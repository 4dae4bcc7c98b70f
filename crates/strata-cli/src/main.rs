//! strata - Decode global variables of compiled artifacts against a type catalog
//!
//! This tool overlays the type layouts recorded in a catalog snapshot onto raw
//! variable storage, either read from the artifacts named by the catalog's symbol
//! tables or from a standalone memory dump.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Args, Parser, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use strata_core::{
    Aggregate, ArtifactWalker, BaseType, DecodedValue, DecoderConfig, EntryOutcome, Leaf,
    LeafKind, MemoryCatalog, OverlayDecoder, TypeCatalog, WalkerConfig,
};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;

/// Decode global variables of compiled artifacts against a type catalog
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the catalog snapshot (JSON)
    #[arg(short, long, env = "STRATA_CATALOG")]
    catalog: PathBuf,

    #[command(flatten)]
    input: InputMode,

    /// Variable whose declared type is overlaid onto the blob
    #[arg(long, requires = "blob")]
    variable: Option<String>,

    /// Byte offset into the blob where the variable starts
    #[arg(long, default_value = "0", requires = "blob")]
    offset: usize,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Maximum number of symbol table records to visit (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_entries: usize,

    /// Maximum aggregate nesting depth
    #[arg(long, default_value_t = DecoderConfig::default().max_depth)]
    max_depth: usize,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Decode every variable located by the catalog's symbol tables
    #[arg(short, long)]
    walk: bool,

    /// Decode a single variable from a raw memory dump
    #[arg(short, long)]
    blob: Option<PathBuf>,
}

/// One line of JSON output; fields keep declaration order
#[derive(Serialize)]
struct JsonLine<'a> {
    variable: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a Aggregate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial: Option<&'a DecodedValue>,
}

/// Output format for decoded variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One JSON object per variable
    Json,
    /// One line per leaf: path, category and interpreted value
    Summary,
    /// Just the variable name (for scripting)
    Names,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(&cli, &mut out)
}

fn run(cli: &Cli, out: &mut impl Write) -> Result<()> {
    if !cli.catalog.is_file() {
        bail!("Catalog file does not exist: {}", cli.catalog.display());
    }

    let catalog = MemoryCatalog::load(&cli.catalog)
        .with_context(|| format!("Failed to load catalog: {}", cli.catalog.display()))?;
    info!(
        "Loaded {} symbols from {}",
        catalog.symbol_count(),
        cli.catalog.display()
    );

    let decoder = DecoderConfig::new().max_depth(cli.max_depth);

    if cli.input.walk {
        process_walk(cli, &catalog, decoder, out)
    } else if let Some(ref blob) = cli.input.blob {
        process_blob(cli, &catalog, decoder, blob, out)
    } else {
        bail!("Either --walk or --blob must be specified")
    }
}

/// Decode every variable the catalog's symbol tables point at
fn process_walk(
    cli: &Cli,
    catalog: &MemoryCatalog,
    decoder: DecoderConfig,
    out: &mut impl Write,
) -> Result<()> {
    let config = WalkerConfig::new()
        .max_entries(cli.max_entries)
        .decoder(decoder);
    let report = ArtifactWalker::with_config(catalog, config).walk();

    for outcome in &report.outcomes {
        match outcome {
            EntryOutcome::Decoded { variable, value } => {
                emit(cli.format, catalog, variable, value, out)?;
            }
            EntryOutcome::Skipped(reason) => trace!("Skipped record: {:?}", reason),
            EntryOutcome::Failed {
                variable,
                error,
                partial,
            } => {
                let name = variable.as_deref().unwrap_or("<unnamed>");
                warn!("Failed to decode {}: {}", name, error);
                if let (Some(partial), OutputFormat::Json) = (partial, cli.format) {
                    emit_partial(name, &error.to_string(), partial, out)?;
                }
            }
        }
    }

    info!(
        "Summary: {} records, {} decoded, {} skipped, {} failed",
        report.stats.visited, report.stats.decoded, report.stats.skipped, report.stats.failed
    );
    Ok(())
}

/// Decode a single named variable out of a dump file
fn process_blob(
    cli: &Cli,
    catalog: &MemoryCatalog,
    decoder: DecoderConfig,
    blob: &Path,
    out: &mut impl Write,
) -> Result<()> {
    let Some(ref variable) = cli.variable else {
        bail!("--blob requires --variable");
    };
    if !blob.is_file() {
        bail!("Input file does not exist: {}", blob.display());
    }

    trace!("Reading {}", blob.display());
    let data = Bytes::from(
        fs::read(blob).with_context(|| format!("Failed to read input file: {}", blob.display()))?,
    );
    debug!(
        "Decoding {} from {} bytes at offset {}",
        variable,
        data.len(),
        cli.offset
    );

    let mut decoder = OverlayDecoder::with_config(catalog, decoder);
    match decoder.decode_variable(variable, &data, cli.offset) {
        Ok(decoded) => {
            trace!("Consumed bytes {}..{}", cli.offset, decoded.cursor);
            emit(cli.format, catalog, variable, &decoded.value, out)
        }
        Err(failure) => {
            if let (Some(partial), OutputFormat::Json) = (&failure.partial, cli.format) {
                emit_partial(variable, &failure.error.to_string(), partial, out)?;
            }
            Err(failure).with_context(|| format!("Failed to decode {}", variable))
        }
    }
}

fn emit(
    format: OutputFormat,
    catalog: &impl TypeCatalog,
    variable: &str,
    value: &Aggregate,
    out: &mut impl Write,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let line = JsonLine {
                variable,
                error: None,
                value: Some(value),
                partial: None,
            };
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
        }
        OutputFormat::Names => writeln!(out, "{}", variable)?,
        OutputFormat::Summary => {
            let mut lines = Vec::new();
            for (name, member) in value.members() {
                summarize(catalog, &format!("{}.{}", variable, name), member, &mut lines);
            }
            for line in lines {
                writeln!(out, "{}", line)?;
            }
        }
    }
    Ok(())
}

fn emit_partial(
    variable: &str,
    error: &str,
    partial: &DecodedValue,
    out: &mut impl Write,
) -> Result<()> {
    let line = JsonLine {
        variable,
        error: Some(error.to_string()),
        value: None,
        partial: Some(partial),
    };
    writeln!(out, "{}", serde_json::to_string(&line)?)?;
    Ok(())
}

/// Flattens a decoded tree into `path<TAB>category<TAB>value` lines
fn summarize(
    catalog: &impl TypeCatalog,
    path: &str,
    value: &DecodedValue,
    lines: &mut Vec<String>,
) {
    match value {
        DecodedValue::Leaf(leaf) => {
            let (category, rendered) = render_leaf(catalog, leaf);
            lines.push(format!("{}\t{}\t{}", path, category, rendered));
        }
        DecodedValue::Aggregate(aggregate) => {
            for (name, member) in aggregate.members() {
                summarize(catalog, &format!("{}.{}", path, name), member, lines);
            }
        }
        DecodedValue::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                summarize(catalog, &format!("{}[{}]", path, i), item, lines);
            }
        }
    }
}

fn render_leaf(catalog: &impl TypeCatalog, leaf: &Leaf) -> (&'static str, String) {
    match leaf.kind() {
        LeafKind::UnknownType(id) => ("unknown", format!("<type #{} not in catalog>", id)),
        LeafKind::Enum(symbol) => {
            let enumerators = catalog.enumerators_of(symbol);
            let rendered = match (leaf.enum_label(&enumerators), leaf.to_signed()) {
                (Some(label), _) => label.to_string(),
                (None, Some(value)) => value.to_string(),
                (None, None) => hex(leaf.as_bytes()),
            };
            ("enum", rendered)
        }
        LeafKind::Base(base) => {
            let rendered = match base {
                BaseType::String => leaf
                    .as_c_str()
                    .map(|s| format!("{:?}", s)),
                BaseType::SignedInteger => leaf.to_signed().map(|v| v.to_string()),
                BaseType::Float => match leaf.as_bytes().len() {
                    4 => leaf
                        .to_unsigned()
                        .map(|bits| f32::from_bits(bits as u32).to_string()),
                    8 => leaf
                        .to_unsigned()
                        .map(|bits| f64::from_bits(bits).to_string()),
                    _ => None,
                },
                BaseType::Padding { .. } => Some(String::from("-")),
                _ if base.is_integer() => leaf.to_unsigned().map(|v| v.to_string()),
                _ => None,
            }
            .unwrap_or_else(|| hex(leaf.as_bytes()));
            (base.as_str(), rendered)
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CATALOG: &str = r#"{
        "symbols": [
            {"id": 1, "name": "int16", "byte_size": 2},
            {"id": 2, "name": "Mode", "byte_size": 1},
            {"id": 3, "name": "string", "byte_size": 4},
            {"id": 4, "name": "Status", "byte_size": 7}
        ],
        "fields": [
            {"id": 40, "symbol": 4, "name": "temp", "byte_offset": 0, "type": 1},
            {"id": 41, "symbol": 4, "name": "mode", "byte_offset": 2, "type": 2},
            {"id": 42, "symbol": 4, "name": "tag", "byte_offset": 3, "type": 3}
        ],
        "enumerations": [
            {"symbol": 2, "value": 0, "name": "IDLE"},
            {"symbol": 2, "value": 1, "name": "ACTIVE"}
        ],
        "variables": [{"name": "status", "type": 4}]
    }"#;

    fn setup(blob: &[u8]) -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("catalog.json");
        let dump = dir.path().join("dump.bin");
        fs::write(&catalog, CATALOG).unwrap();
        fs::write(&dump, blob).unwrap();
        (dir, catalog, dump)
    }

    fn run_to_string(args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(args)?;
        let mut out = Vec::new();
        run(&cli, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_blob_json_output() {
        let (_dir, catalog, dump) = setup(&[0xFE, 0xFF, 1, b'o', b'k', 0, 0]);
        let output = run_to_string(&[
            "strata",
            "--catalog",
            catalog.to_str().unwrap(),
            "--blob",
            dump.to_str().unwrap(),
            "--variable",
            "status",
        ])
        .unwrap();

        assert_eq!(
            output,
            concat!(
                r#"{"variable":"status","value":{"Status":"#,
                r#"{"temp":[254,255],"mode":[1],"tag":[111,107,0,0]}}}"#,
                "\n"
            )
        );
    }

    #[test]
    fn test_blob_summary_output() {
        let (_dir, catalog, dump) = setup(&[0, 0, 0xFE, 0xFF, 1, b'o', b'k', 0, 0]);
        let output = run_to_string(&[
            "strata",
            "--catalog",
            catalog.to_str().unwrap(),
            "--blob",
            dump.to_str().unwrap(),
            "--variable",
            "status",
            "--offset",
            "2",
            "--format",
            "summary",
        ])
        .unwrap();

        assert_eq!(
            output,
            "status.temp\tint\t-2\nstatus.mode\tenum\tACTIVE\nstatus.tag\tstring\t\"ok\"\n"
        );
    }

    #[test]
    fn test_blob_truncated_fails() {
        let (_dir, catalog, dump) = setup(&[1, 0, 1]);
        let err = run_to_string(&[
            "strata",
            "--catalog",
            catalog.to_str().unwrap(),
            "--blob",
            dump.to_str().unwrap(),
            "--variable",
            "status",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("status"));
    }

    #[test]
    fn test_truncated_blob_emits_partial() {
        let (_dir, catalog, dump) = setup(&[1, 0, 1]);
        let cli = Cli::try_parse_from([
            "strata",
            "--catalog",
            catalog.to_str().unwrap(),
            "--blob",
            dump.to_str().unwrap(),
            "--variable",
            "status",
        ])
        .unwrap();
        let mut out = Vec::new();
        assert!(run(&cli, &mut out).is_err());

        let line: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(line["variable"], "status");
        assert_eq!(line["partial"]["Status"]["temp"], serde_json::json!([1, 0]));
        assert!(line["error"].as_str().unwrap().contains("truncated"));
    }

    #[test]
    fn test_unknown_variable_fails() {
        let (_dir, catalog, dump) = setup(&[0; 7]);
        let result = run_to_string(&[
            "strata",
            "--catalog",
            catalog.to_str().unwrap(),
            "--blob",
            dump.to_str().unwrap(),
            "--variable",
            "missing",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_walk_with_no_symbol_tables() {
        let (_dir, catalog, _dump) = setup(&[]);
        let output = run_to_string(&["strata", "--catalog", catalog.to_str().unwrap(), "--walk"])
            .unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_input_mode_is_exclusive() {
        assert!(Cli::try_parse_from(["strata", "--catalog", "c.json"]).is_err());
        assert!(
            Cli::try_parse_from(["strata", "--catalog", "c.json", "--walk", "--blob", "d"])
                .is_err()
        );
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0xAB, 0x10]), "00ab10");
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
