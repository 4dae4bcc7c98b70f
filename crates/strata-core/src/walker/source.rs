//! Reading variable storage and names out of artifact files.

use crate::catalog::ArtifactSymbol;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::trace;

fn offset_overflow() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "symbol offset overflows u64")
}

/// Reads the storage of a symbol table entry.
///
/// Reads up to `entry.size` bytes at `file_offset + value`; near the end of the file
/// fewer bytes may come back.
pub fn read_storage<R: Read + Seek>(reader: &mut R, entry: &ArtifactSymbol) -> io::Result<Bytes> {
    let offset = entry.storage_offset().ok_or_else(offset_overflow)?;
    reader.seek(SeekFrom::Start(offset))?;

    let mut buf = Vec::new();
    reader.take(entry.size).read_to_end(&mut buf)?;
    Ok(Bytes::from(buf))
}

/// Reads a NUL-terminated name at `offset`, scanning at most `max_len` bytes.
///
/// The terminator is not part of the result. Invalid UTF-8 is replaced.
pub fn read_name<R: BufRead + Seek>(
    reader: &mut R,
    offset: u64,
    max_len: usize,
) -> io::Result<String> {
    reader.seek(SeekFrom::Start(offset))?;

    let mut raw = Vec::new();
    reader.take(max_len as u64).read_until(0, &mut raw)?;
    if raw.last() == Some(&0) {
        raw.pop();
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Storage and name of one symbol table entry
#[derive(Debug, Clone)]
pub struct EntryData {
    /// Variable name from the string table
    pub name: String,
    /// Raw storage bytes
    pub storage: Bytes,
}

/// Opens the artifact at `path` and reads the entry's storage and name
pub fn read_entry(path: &Path, entry: &ArtifactSymbol, max_name_len: usize) -> Result<EntryData> {
    let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
    let mut reader = BufReader::new(file);

    let storage = read_storage(&mut reader, entry).map_err(|e| Error::file_read(path, e))?;
    if (storage.len() as u64) < entry.size {
        trace!(
            "Short read in {}: wanted {} bytes, got {}",
            path.display(),
            entry.size,
            storage.len()
        );
    }

    let name_offset = entry
        .name_offset()
        .ok_or_else(|| Error::file_read(path, offset_overflow()))?;
    let name = read_name(&mut reader, name_offset, max_name_len)
        .map_err(|e| Error::file_read(path, e))?;

    Ok(EntryData { name, storage })
}
