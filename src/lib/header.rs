//! Utilities for adding @PG (program) records to SAM headers.
//!
//! The output header records the dupmark invocation with automatic PP
//! (previous program) chaining and ID collision handling.

use anyhow::Result;
use bstr::BString;
use noodles::sam::Header;
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::Program;
use noodles::sam::header::record::value::map::program::tag;
use std::collections::HashSet;

/// Program ID used for dupmark's own @PG records.
const PROGRAM_ID: &str = "dupmark";

/// Gets the ID of the last program in the @PG chain: the one no other
/// program references through its PP tag.
#[must_use]
pub fn get_last_program_id(header: &Header) -> Option<String> {
    let programs = header.programs();
    let program_map = programs.as_ref();

    if program_map.is_empty() {
        return None;
    }

    let mut referenced: HashSet<&[u8]> = HashSet::new();
    for (_id, pg) in program_map {
        if let Some(pp) = pg.other_fields().get(&tag::PREVIOUS_PROGRAM_ID) {
            referenced.insert(pp.as_ref());
        }
    }

    for (id, _pg) in program_map {
        if !referenced.contains(id.as_slice()) {
            return Some(String::from_utf8_lossy(id).to_string());
        }
    }

    // malformed PP cycles: fall back to any program ID
    program_map.keys().next().map(|id| String::from_utf8_lossy(id).to_string())
}

/// Creates a unique program ID by appending `.1`, `.2`, ... when needed.
#[must_use]
pub fn make_unique_program_id(header: &Header) -> String {
    let programs = header.programs();
    let program_map = programs.as_ref();

    if !program_map.contains_key(PROGRAM_ID.as_bytes()) {
        return PROGRAM_ID.to_string();
    }

    for i in 1..=1000 {
        let candidate = format!("{PROGRAM_ID}.{i}");
        if !program_map.contains_key(candidate.as_bytes()) {
            return candidate;
        }
    }

    format!("{PROGRAM_ID}.{}", std::process::id())
}

/// Adds a dupmark @PG record to the header with automatic PP chaining.
///
/// # Errors
///
/// Returns an error if the program record cannot be built or added.
pub fn add_pg_record(mut header: Header, version: &str, command_line: &str) -> Result<Header> {
    let previous_program = get_last_program_id(&header);
    let unique_id = make_unique_program_id(&header);

    let mut builder = Map::<Program>::builder()
        .insert(tag::NAME, PROGRAM_ID)
        .insert(tag::VERSION, version)
        .insert(tag::COMMAND_LINE, command_line);
    if let Some(pp) = previous_program.as_deref() {
        builder = builder.insert(tag::PREVIOUS_PROGRAM_ID, pp);
    }
    let pg_record = builder.build()?;

    header.programs_mut().add(BString::from(unique_id), pg_record)?;

    Ok(header)
}
