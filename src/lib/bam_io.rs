//! BAM file I/O utilities.
//!
//! The engine is strictly sequential (it blocks only on I/O), so readers and
//! writers here are plain single-threaded BGZF streams. Helpers create them
//! with consistent error context and header handling.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};
use noodles::sam::Header;

use crate::errors::DupmarkError;

/// Type alias for the BAM reader used throughout the crate.
pub type BamReader = noodles::bam::io::Reader<noodles::bgzf::Reader<File>>;

/// Type alias for the BAM writer used throughout the crate.
pub type BamWriter = noodles::bam::io::Writer<noodles::bgzf::Writer<File>>;

/// The 28-byte empty BGZF block that terminates a well-formed BAM file.
const BGZF_EOF_BLOCK: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Opens a BAM file for reading and reads its header.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the header cannot be read.
pub fn create_bam_reader<P: AsRef<Path>>(path: P) -> Result<(BamReader, Header)> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open input BAM: {}", path_ref.display()))?;

    let mut reader = noodles::bam::io::Reader::new(file);
    let header = reader
        .read_header()
        .with_context(|| format!("Failed to read header from: {}", path_ref.display()))?;

    Ok((reader, header))
}

/// Creates a BAM file for writing and writes the header.
///
/// # Errors
///
/// Returns an error if the file cannot be created or the header cannot be
/// written.
pub fn create_bam_writer<P: AsRef<Path>>(path: P, header: &Header) -> Result<BamWriter> {
    let path_ref = path.as_ref();
    let file = File::create(path_ref)
        .with_context(|| format!("Failed to create output BAM: {}", path_ref.display()))?;

    let mut writer = noodles::bam::io::Writer::new(file);
    writer
        .write_header(header)
        .with_context(|| format!("Failed to write header to: {}", path_ref.display()))?;

    Ok(writer)
}

/// Verifies that the file ends with the BGZF EOF block.
///
/// A missing block is the signature of a truncated transfer; callers can
/// skip the check for streams produced by tools that omit the block.
///
/// # Errors
///
/// Returns [`DupmarkError::MissingEofBlock`] when the block is absent, or an
/// I/O error when the file tail cannot be read.
pub fn check_bgzf_eof<P: AsRef<Path>>(path: P) -> Result<()> {
    let path_ref = path.as_ref();
    let mut file = File::open(path_ref)
        .with_context(|| format!("Failed to open input BAM: {}", path_ref.display()))?;

    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat input BAM: {}", path_ref.display()))?
        .len();
    if len < BGZF_EOF_BLOCK.len() as u64 {
        return Err(DupmarkError::MissingEofBlock { path: path_ref.display().to_string() }.into());
    }

    file.seek(SeekFrom::End(-(BGZF_EOF_BLOCK.len() as i64)))
        .with_context(|| format!("Failed to seek in input BAM: {}", path_ref.display()))?;
    let mut tail = [0u8; 28];
    file.read_exact(&mut tail)
        .with_context(|| format!("Failed to read tail of input BAM: {}", path_ref.display()))?;

    if tail != BGZF_EOF_BLOCK {
        return Err(DupmarkError::MissingEofBlock { path: path_ref.display().to_string() }.into());
    }
    Ok(())
}
