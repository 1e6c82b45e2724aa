//! Record-level utilities for SAM/BAM records.
//!
//! The duplicate fingerprint needs two things from a CIGAR: how much of the
//! reference an alignment spans, and how many bases were soft-clipped off
//! either end of the read. Hard clips are irrelevant here; the removed bases
//! never made it into the stored record, so they cannot shift the anchor of
//! the sequenced fragment the way trimming does.

use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::cigar::op::Kind;

/// Returns the record's read name as raw bytes, or an empty slice when the
/// record has no name.
#[inline]
#[must_use]
pub fn read_name(record: &RecordBuf) -> &[u8] {
    record.name().map_or(&[], AsRef::as_ref)
}

/// Counts reference-consuming bases in a CIGAR (M, D, N, =, X).
#[must_use]
pub fn reference_length(ops: &[Op]) -> usize {
    ops.iter()
        .filter(|op| {
            matches!(
                op.kind(),
                Kind::Match
                    | Kind::SequenceMatch
                    | Kind::SequenceMismatch
                    | Kind::Deletion
                    | Kind::Skip
            )
        })
        .map(|op| op.len())
        .sum()
}

/// Length of any soft clip at the start of the read, skipping a leading
/// hard clip.
#[must_use]
pub fn leading_soft_clip(ops: &[Op]) -> usize {
    ops.iter()
        .skip_while(|op| op.kind() == Kind::HardClip)
        .take_while(|op| op.kind() == Kind::SoftClip)
        .map(|op| op.len())
        .sum()
}

/// Length of any soft clip at the end of the read, skipping a trailing
/// hard clip.
#[must_use]
pub fn trailing_soft_clip(ops: &[Op]) -> usize {
    ops.iter()
        .rev()
        .skip_while(|op| op.kind() == Kind::HardClip)
        .take_while(|op| op.kind() == Kind::SoftClip)
        .map(|op| op.len())
        .sum()
}
