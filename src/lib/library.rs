//! Read group to library id resolution.
//!
//! Duplicates can only arise within a sequencing library, so the fingerprint
//! carries a small library id instead of the library name. The mapping is
//! built once from the header's `@RG` lines: read groups sharing an `LB`
//! value share an id. Read groups without `LB` are grouped under a single
//! unnamed library, matching the behavior of the reference tools.
//!
//! Library ids start at 1; id 0 is reserved for records whose `RG` tag is
//! absent or does not match any header read group. The id is stored in an
//! 8-bit field, capping a run at 255 distinct libraries.

use std::collections::HashMap;

use log::warn;
use noodles::sam::Header;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::header::record::value::map::read_group::tag as rg_tag;

use crate::errors::{DupmarkError, Result};
use crate::sam::record_utils::read_name;

/// Maximum number of distinct libraries an 8-bit id can address.
pub const MAX_LIBRARIES: usize = 255;

/// Maps a record's `RG` tag to the small integer id of its library.
#[derive(Debug, Default)]
pub struct LibraryMap {
    by_read_group: HashMap<Vec<u8>, u8>,
    libraries: usize,
    warned_missing_rg: bool,
    warned_unknown_rg: bool,
}

impl LibraryMap {
    /// Builds the map from the header's `@RG` lines.
    ///
    /// Duplicate read group IDs are rejected by the header parser before
    /// this point, so each `@RG` line seen here is unique.
    ///
    /// # Errors
    ///
    /// Fails when the header names more than [`MAX_LIBRARIES`] distinct
    /// libraries.
    pub fn from_header(header: &Header) -> Result<Self> {
        let mut by_read_group = HashMap::new();
        let mut by_library_name: HashMap<Vec<u8>, u8> = HashMap::new();

        for (id, group) in header.read_groups() {
            let library = match group.other_fields().get(&rg_tag::LIBRARY) {
                Some(name) => {
                    let bytes: &[u8] = name.as_ref();
                    bytes.to_vec()
                }
                None => {
                    warn!("read group '{id}' has no LB field; grouping it under the unnamed library");
                    Vec::new()
                }
            };

            let library_id = match by_library_name.get(&library) {
                Some(&existing) => existing,
                None => {
                    let next = by_library_name.len() + 1;
                    if next > MAX_LIBRARIES {
                        return Err(DupmarkError::TooManyLibraries { count: next });
                    }
                    by_library_name.insert(library, next as u8);
                    next as u8
                }
            };

            let id_bytes: &[u8] = id.as_ref();
            by_read_group.insert(id_bytes.to_vec(), library_id);
        }

        Ok(Self {
            by_read_group,
            libraries: by_library_name.len(),
            warned_missing_rg: false,
            warned_unknown_rg: false,
        })
    }

    /// Number of distinct libraries declared in the header.
    #[must_use]
    pub fn library_count(&self) -> usize {
        self.libraries
    }

    /// Resolves the library id of a record from its `RG` tag.
    ///
    /// With at most one declared library every record resolves to 0 without
    /// touching the tag. Records with no `RG` tag, or with an `RG` value the
    /// header does not know, fall back to library 0 with a warning emitted
    /// once per condition.
    pub fn library_for(&mut self, record: &RecordBuf) -> u8 {
        if self.libraries <= 1 {
            return 0;
        }

        let Some(Value::String(rg)) = record.data().get(b"RG") else {
            if !self.warned_missing_rg {
                warn!(
                    "record '{}' has no RG tag; assuming library 0",
                    String::from_utf8_lossy(read_name(record))
                );
                self.warned_missing_rg = true;
            }
            return 0;
        };

        let rg_bytes: &[u8] = rg.as_ref();
        match self.by_read_group.get(rg_bytes) {
            Some(&id) => id,
            None => {
                if !self.warned_unknown_rg {
                    warn!(
                        "read group '{}' is not declared in the header; assuming library 0",
                        String::from_utf8_lossy(rg_bytes)
                    );
                    self.warned_unknown_rg = true;
                }
                0
            }
        }
    }
}
