//! Phred quality scoring for duplicate tie-breaking.
//!
//! When two reads collide on the same fingerprint, the one whose bases were
//! called with more confidence survives. The score is the sum of per-base
//! Phred values at or above a configurable floor; low-confidence bases carry
//! no evidence either way and are excluded from the sum.

use noodles::sam::alignment::RecordBuf;

/// Default minimum base quality included in a read's score.
pub const DEFAULT_MIN_QUAL: u8 = 15;

/// Maximum valid Phred score in SAM/BAM quality strings.
pub const MAX_PHRED: u8 = 93;

/// Sums the base qualities of a record, counting only bases at or above
/// `min_qual`.
///
/// A record with no stored qualities (`*` in SAM) scores zero. Qualities in
/// a `RecordBuf` are already numeric Phred values, not ASCII.
#[inline]
#[must_use]
pub fn sum_base_qualities(record: &RecordBuf, min_qual: u8) -> i32 {
    record
        .quality_scores()
        .as_ref()
        .iter()
        .filter(|&&q| q >= min_qual)
        .map(|&q| i32::from(q))
        .sum()
}
