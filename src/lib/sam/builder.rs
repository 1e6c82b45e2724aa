//! Builders for creating test SAM/BAM records and files.
//!
//! This module provides a fluent API for constructing alignment records in
//! tests, modeled after fgbio's `SamBuilder`. [`RecordBuilder`] assembles a
//! single `RecordBuf`; [`SamBuilder`] manages a header and accumulates
//! records that can be written out as a BAM file.
//!
//! ```rust
//! use dupmark_lib::sam::builder::RecordBuilder;
//!
//! let record = RecordBuilder::new()
//!     .name("read1")
//!     .sequence("ACGT")
//!     .qualities(&[30, 30, 30, 30])
//!     .reference_sequence_id(0)
//!     .alignment_start(100)
//!     .cigar("4M")
//!     .build();
//! ```

use std::num::NonZeroUsize;
use std::path::Path;

use anyhow::Result;
use bstr::BString;
use noodles::core::Position;
use noodles::sam::Header;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::MappingQuality;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::{Cigar, QualityScores, RecordBuf, Sequence};
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::header::tag as header_tag;
use noodles::sam::header::record::value::map::{
    Header as HeaderMap, ReadGroup, ReferenceSequence,
};

pub const DEFAULT_MAPQ: u8 = 60;
pub const DEFAULT_READ_GROUP_ID: &str = "A";
pub const DEFAULT_REFERENCE_LENGTH: usize = 10_000_000;

/// Parses a CIGAR string like `"10S40M"` into a `Cigar`.
///
/// # Panics
///
/// Panics on malformed input; this is test support code.
#[must_use]
pub fn parse_cigar(cigar: &str) -> Cigar {
    let mut ops = Vec::new();
    let mut len = 0usize;

    for ch in cigar.chars() {
        if let Some(digit) = ch.to_digit(10) {
            len = len * 10 + digit as usize;
            continue;
        }
        let kind = match ch {
            'M' => Kind::Match,
            'I' => Kind::Insertion,
            'D' => Kind::Deletion,
            'N' => Kind::Skip,
            'S' => Kind::SoftClip,
            'H' => Kind::HardClip,
            'P' => Kind::Pad,
            '=' => Kind::SequenceMatch,
            'X' => Kind::SequenceMismatch,
            other => panic!("unknown CIGAR op '{other}' in '{cigar}'"),
        };
        ops.push(Op::new(kind, len));
        len = 0;
    }

    Cigar::from(ops)
}

/// Fluent builder for a single test record.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    name: Option<String>,
    sequence: Option<String>,
    qualities: Option<Vec<u8>>,
    cigar: Option<String>,
    reference_sequence_id: Option<usize>,
    alignment_start: Option<usize>,
    mapping_quality: Option<u8>,
    mate_reference_sequence_id: Option<usize>,
    mate_alignment_start: Option<usize>,
    template_length: i32,
    flag_bits: u16,
    flags_override: Option<Flags>,
    tags: Vec<(Tag, Value)>,
}

impl RecordBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn sequence(mut self, bases: &str) -> Self {
        self.sequence = Some(bases.to_string());
        self
    }

    #[must_use]
    pub fn qualities(mut self, qualities: &[u8]) -> Self {
        self.qualities = Some(qualities.to_vec());
        self
    }

    #[must_use]
    pub fn cigar(mut self, cigar: &str) -> Self {
        self.cigar = Some(cigar.to_string());
        self
    }

    #[must_use]
    pub fn reference_sequence_id(mut self, id: usize) -> Self {
        self.reference_sequence_id = Some(id);
        self
    }

    /// 1-based alignment start.
    #[must_use]
    pub fn alignment_start(mut self, start: usize) -> Self {
        self.alignment_start = Some(start);
        self
    }

    #[must_use]
    pub fn mapping_quality(mut self, mapq: u8) -> Self {
        self.mapping_quality = Some(mapq);
        self
    }

    #[must_use]
    pub fn mate_reference_sequence_id(mut self, id: usize) -> Self {
        self.mate_reference_sequence_id = Some(id);
        self
    }

    /// 1-based mate alignment start.
    #[must_use]
    pub fn mate_alignment_start(mut self, start: usize) -> Self {
        self.mate_alignment_start = Some(start);
        self
    }

    #[must_use]
    pub fn template_length(mut self, tlen: i32) -> Self {
        self.template_length = tlen;
        self
    }

    /// Replaces all flag bits with an explicit value.
    #[must_use]
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags_override = Some(flags);
        self
    }

    #[must_use]
    pub fn paired(self, on: bool) -> Self {
        self.set_bit(Flags::SEGMENTED, on)
    }

    #[must_use]
    pub fn properly_paired(self, on: bool) -> Self {
        self.set_bit(Flags::PROPERLY_SEGMENTED, on)
    }

    #[must_use]
    pub fn first_segment(self, on: bool) -> Self {
        self.set_bit(Flags::FIRST_SEGMENT, on).set_bit(Flags::LAST_SEGMENT, !on)
    }

    #[must_use]
    pub fn reverse_complement(self, on: bool) -> Self {
        self.set_bit(Flags::REVERSE_COMPLEMENTED, on)
    }

    #[must_use]
    pub fn mate_reverse_complement(self, on: bool) -> Self {
        self.set_bit(Flags::MATE_REVERSE_COMPLEMENTED, on)
    }

    #[must_use]
    pub fn unmapped(self, on: bool) -> Self {
        self.set_bit(Flags::UNMAPPED, on)
    }

    #[must_use]
    pub fn mate_unmapped(self, on: bool) -> Self {
        self.set_bit(Flags::MATE_UNMAPPED, on)
    }

    #[must_use]
    pub fn duplicate(self, on: bool) -> Self {
        self.set_bit(Flags::DUPLICATE, on)
    }

    #[must_use]
    pub fn qc_fail(self, on: bool) -> Self {
        self.set_bit(Flags::QC_FAIL, on)
    }

    /// Adds a string-valued auxiliary tag (e.g. `RG`).
    ///
    /// # Panics
    ///
    /// Panics when the tag is not two bytes.
    #[must_use]
    pub fn tag(mut self, tag: &str, value: &str) -> Self {
        let bytes = tag.as_bytes();
        assert_eq!(bytes.len(), 2, "tags are two characters");
        self.tags.push((Tag::from([bytes[0], bytes[1]]), Value::String(BString::from(value))));
        self
    }

    fn set_bit(mut self, flag: Flags, on: bool) -> Self {
        if on {
            self.flag_bits |= u16::from(flag);
        } else {
            self.flag_bits &= !u16::from(flag);
        }
        self
    }

    /// Builds the record.
    ///
    /// Unlike real aligner output, qualities stay empty unless set; several
    /// tests rely on records that carry no quality string.
    ///
    /// # Panics
    ///
    /// Panics on out-of-range positions; this is test support code.
    #[must_use]
    pub fn build(self) -> RecordBuf {
        let mut record = RecordBuf::default();

        if let Some(name) = self.name {
            *record.name_mut() = Some(name.into());
        }

        *record.flags_mut() = self.flags_override.unwrap_or_else(|| Flags::from(self.flag_bits));

        if let Some(id) = self.reference_sequence_id {
            *record.reference_sequence_id_mut() = Some(id);
        }
        if let Some(start) = self.alignment_start {
            *record.alignment_start_mut() =
                Some(Position::try_from(start).expect("alignment_start must be >= 1"));
        }
        if let Some(mapq) = self.mapping_quality {
            *record.mapping_quality_mut() =
                Some(MappingQuality::try_from(mapq).expect("mapping_quality must be valid"));
        }
        if let Some(cigar) = self.cigar {
            *record.cigar_mut() = parse_cigar(&cigar);
        }
        if let Some(id) = self.mate_reference_sequence_id {
            *record.mate_reference_sequence_id_mut() = Some(id);
        }
        if let Some(start) = self.mate_alignment_start {
            *record.mate_alignment_start_mut() =
                Some(Position::try_from(start).expect("mate_alignment_start must be >= 1"));
        }
        *record.template_length_mut() = self.template_length;
        if let Some(bases) = self.sequence {
            *record.sequence_mut() = Sequence::from(bases.into_bytes());
        }
        if let Some(qualities) = self.qualities {
            *record.quality_scores_mut() = QualityScores::from(qualities);
        }
        for (tag, value) in self.tags {
            record.data_mut().insert(tag, value);
        }

        record
    }
}

/// Accumulates test records under a managed header.
#[derive(Debug)]
pub struct SamBuilder {
    /// SAM header with reference sequences and a default read group.
    pub header: Header,
    records: Vec<RecordBuf>,
}

impl Default for SamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SamBuilder {
    /// Creates a builder whose header declares coordinate sorting, two
    /// reference sequences (`chr1`, `chr2`) and one read group.
    ///
    /// # Panics
    ///
    /// Panics if the fixed reference length is zero (impossible).
    #[must_use]
    pub fn new() -> Self {
        let mut header = Header::builder().set_header(
            Map::<HeaderMap>::builder()
                .insert(header_tag::SORT_ORDER, BString::from("coordinate"))
                .build()
                .unwrap(),
        );

        for name in ["chr1", "chr2"] {
            let map = Map::<ReferenceSequence>::new(
                NonZeroUsize::new(DEFAULT_REFERENCE_LENGTH).unwrap(),
            );
            header = header.add_reference_sequence(BString::from(name), map);
        }

        header = header
            .add_read_group(BString::from(DEFAULT_READ_GROUP_ID), Map::<ReadGroup>::default());

        Self { header: header.build(), records: Vec::new() }
    }

    /// Returns the accumulated records.
    #[must_use]
    pub fn records(&self) -> &[RecordBuf] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds a pre-built record to the collection.
    pub fn push_record(&mut self, record: RecordBuf) {
        self.records.push(record);
    }

    /// Writes the accumulated records to a BAM file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write_bam(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = noodles::bam::io::Writer::new(file);
        writer.write_header(&self.header)?;

        for record in &self.records {
            writer.write_alignment_record(&self.header, record)?;
        }

        writer.finish(&self.header)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cigar() {
        let cigar = parse_cigar("10S40M5H");
        let ops = cigar.as_ref();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], Op::new(Kind::SoftClip, 10));
        assert_eq!(ops[1], Op::new(Kind::Match, 40));
        assert_eq!(ops[2], Op::new(Kind::HardClip, 5));
    }

    #[test]
    fn test_record_builder_basics() {
        let record = RecordBuilder::new()
            .name("r1")
            .sequence("ACGT")
            .qualities(&[30, 30, 30, 30])
            .reference_sequence_id(1)
            .alignment_start(100)
            .cigar("4M")
            .paired(true)
            .first_segment(true)
            .build();

        assert_eq!(record.name().map(AsRef::as_ref), Some(b"r1".as_slice()));
        assert_eq!(record.reference_sequence_id(), Some(1));
        assert_eq!(record.alignment_start().map(usize::from), Some(100));
        assert!(record.flags().is_segmented());
        assert!(record.flags().is_first_segment());
        assert_eq!(record.quality_scores().as_ref(), &[30, 30, 30, 30]);
    }

    #[test]
    fn test_record_builder_tags() {
        let record = RecordBuilder::new().name("r1").sequence("ACGT").tag("RG", "A").build();
        let Some(Value::String(s)) = record.data().get(b"RG") else {
            panic!("missing RG tag");
        };
        let bytes: &[u8] = s.as_ref();
        assert_eq!(bytes, b"A");
    }

    #[test]
    fn test_sam_builder_header() {
        let builder = SamBuilder::new();
        assert_eq!(builder.header.reference_sequences().len(), 2);
        assert_eq!(builder.header.read_groups().len(), 1);
        assert!(crate::sam::is_coordinate_sorted(&builder.header));
    }

    #[test]
    fn test_sam_builder_write_bam() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("test.bam");

        let mut builder = SamBuilder::new();
        builder.push_record(
            RecordBuilder::new()
                .name("r1")
                .sequence("ACGT")
                .qualities(&[30; 4])
                .reference_sequence_id(0)
                .alignment_start(100)
                .cigar("4M")
                .build(),
        );
        builder.write_bam(&path).unwrap();

        let mut reader = noodles::bam::io::Reader::new(std::fs::File::open(&path).unwrap());
        let header = reader.read_header().unwrap();
        let mut record = RecordBuf::default();
        assert!(reader.read_record_buf(&header, &mut record).unwrap() > 0);
        assert_eq!(record.name().map(AsRef::as_ref), Some(b"r1".as_slice()));
        assert_eq!(reader.read_record_buf(&header, &mut record).unwrap(), 0);
    }
}
