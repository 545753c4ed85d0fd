//! Single-entry tar framing for the engine's `cp` streams.
//!
//! Uploads are written as one GNU header (with a long-name entry in front
//! when needed), the body, zero padding to the 512-byte block size, and the
//! two zero blocks that end an archive. The
//! stages are written separately so a failure can be attributed to the
//! header, the body, or the trailer. Downloads read only the first entry of
//! whatever archive the engine produces.

use crate::{RuntimeError, TransferStage};
use std::fs::Metadata;
use std::io::{self, Read, Write};

const BLOCK_SIZE: u64 = 512;
const TRAILER: [u8; 1024] = [0; 1024];
/// Width of the name field in a GNU header.
const NAME_FIELD_LEN: usize = 100;
const LONG_NAME_MARKER: &[u8] = b"././@LongLink";

/// Header blocks for a regular file entry named `name`.
///
/// A name longer than the header's name field is preceded by a GNU
/// `././@LongLink` entry carrying the full name; the real header then holds
/// the first 100 bytes only.
pub fn entry_header(name: &str, metadata: &Metadata) -> io::Result<Vec<u8>> {
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "only regular files can be framed as a single entry",
        ));
    }
    let mut blocks = Vec::with_capacity(BLOCK_SIZE as usize);
    let mut header = tar::Header::new_gnu();
    header.set_metadata(metadata);
    header.set_entry_type(tar::EntryType::Regular);
    if name.len() > NAME_FIELD_LEN {
        blocks.extend_from_slice(&long_name_entry(name));
        let field = &mut header.as_old_mut().name;
        field.copy_from_slice(&name.as_bytes()[..NAME_FIELD_LEN]);
    } else {
        header.set_path(name)?;
    }
    header.set_size(metadata.len());
    header.set_cksum();
    blocks.extend_from_slice(header.as_bytes());
    Ok(blocks)
}

/// GNU long-name entry: a type `L` header followed by the NUL-terminated
/// name, padded to the block size.
fn long_name_entry(name: &str) -> Vec<u8> {
    let mut header = tar::Header::new_gnu();
    header.as_old_mut().name[..LONG_NAME_MARKER.len()].copy_from_slice(LONG_NAME_MARKER);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(name.len() as u64 + 1);
    header.set_entry_type(tar::EntryType::GNULongName);
    header.set_cksum();

    let mut entry = header.as_bytes().to_vec();
    entry.extend_from_slice(name.as_bytes());
    entry.push(0);
    let padding = (BLOCK_SIZE as usize - entry.len() % BLOCK_SIZE as usize) % BLOCK_SIZE as usize;
    entry.resize(entry.len() + padding, 0);
    entry
}

/// Write `body` as a single-entry archive named `name` into `out`.
///
/// Exactly `metadata.len()` bytes are taken from `body`; a shorter body is a
/// body-copy failure. `path` is only used to label errors. Returns the number
/// of body bytes written.
pub fn write_single_entry<W: Write>(
    out: &mut W,
    name: &str,
    metadata: &Metadata,
    body: &mut dyn Read,
    path: &str,
) -> Result<u64, RuntimeError> {
    let header = entry_header(name, metadata).map_err(|e| {
        RuntimeError::transfer(
            TransferStage::HeaderWrite,
            path,
            format!("failed to build header: {e}"),
        )
    })?;
    out.write_all(&header).map_err(|e| {
        RuntimeError::transfer(
            TransferStage::HeaderWrite,
            path,
            format!("failed to write header: {e}"),
        )
    })?;

    let size = metadata.len();
    let copied = io::copy(&mut body.take(size), out).map_err(|e| {
        RuntimeError::transfer(
            TransferStage::BodyCopy,
            path,
            format!("failed to pipe upload: {e}"),
        )
    })?;
    if copied != size {
        return Err(RuntimeError::transfer(
            TransferStage::BodyCopy,
            path,
            format!("source ended after {copied} of {size} bytes"),
        ));
    }
    let padding = ((BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE) as usize;
    out.write_all(&TRAILER[..padding]).map_err(|e| {
        RuntimeError::transfer(
            TransferStage::BodyCopy,
            path,
            format!("failed to pad entry: {e}"),
        )
    })?;

    out.write_all(&TRAILER).map_err(|e| {
        RuntimeError::transfer(
            TransferStage::ArchiveClose,
            path,
            format!("failed to close archive: {e}"),
        )
    })?;
    out.flush().map_err(|e| {
        RuntimeError::transfer(
            TransferStage::StreamClose,
            path,
            format!("failed to flush stream: {e}"),
        )
    })?;
    Ok(copied)
}

/// Why the first entry of an archive could not be copied.
#[derive(Debug)]
pub enum EntryError {
    /// The stream held no readable entry.
    Missing(String),
    /// The first entry is a directory.
    Directory(String),
    /// The entry was found but copying its body failed.
    Copy(io::Error),
}

/// Copy the body of the first entry of `archive` into `dst`.
pub fn copy_first_entry<R: Read>(
    archive: &mut tar::Archive<R>,
    dst: &mut dyn Write,
) -> Result<u64, EntryError> {
    let mut entries = archive
        .entries()
        .map_err(|e| EntryError::Missing(e.to_string()))?;
    let mut entry = match entries.next() {
        Some(Ok(entry)) => entry,
        Some(Err(e)) => return Err(EntryError::Missing(e.to_string())),
        None => return Err(EntryError::Missing("archive is empty".to_owned())),
    };
    if entry.header().entry_type().is_dir() {
        let name = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        return Err(EntryError::Directory(name));
    }
    io::copy(&mut entry, dst).map_err(EntryError::Copy)
}
