//! Fingerprint keys identifying the physical fragment end of a read.
//!
//! Two reads are duplicate candidates iff they share a [`DupKey`]: the same
//! library, reference sequence, strand, and unclipped 5' anchor. Pairs are
//! compared through a [`PairedKey`] holding the fingerprints of both mates.
//!
//! Key ordering is coordinate-major so that the sweep controller can erase
//! every entry the input cursor has passed with a single range removal. The
//! cutoff lags the cursor by [`MAX_CLIP_LOOKBACK`] because a leading soft
//! clip shifts a forward-strand anchor left of its alignment position.

use std::cmp::Ordering;

use noodles::sam::alignment::RecordBuf;

use crate::errors::{DupmarkError, Result};
use crate::sam::record_utils::{
    leading_soft_clip, read_name, reference_length, trailing_soft_clip,
};

/// How far behind the input cursor the sweep cutoff trails, in bases.
/// Anchors shifted left by soft clips longer than this are swept early and
/// may miss collisions; this matches the clip allowance of the reference
/// duplicate-marking tools.
pub const MAX_CLIP_LOOKBACK: i32 = 1000;

/// Strand of the sequenced fragment end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Orientation {
    Forward,
    Reverse,
}

/// Compact comparable identity of a read's 5' alignment anchor.
///
/// Field declaration order doubles as comparison priority: reference first,
/// then anchor, so an ordered map of keys can be swept by coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DupKey {
    /// Reference sequence id; -1 marks the empty sentinel key.
    pub reference: i32,
    /// 0-based unclipped 5' anchor position.
    pub anchor: i32,
    /// Strand of the read.
    pub orientation: Orientation,
    /// Small integer library id resolved from the read group.
    pub library: u8,
}

impl DupKey {
    /// The minimal key, used as a lower-bound probe during sweeps.
    pub const EMPTY: DupKey =
        DupKey { reference: -1, anchor: -1, orientation: Orientation::Forward, library: 0 };

    /// Computes the fingerprint of a mapped record.
    ///
    /// The anchor is the 5' unclipped coordinate: for forward-strand reads
    /// the leftmost aligned position minus any leading soft clip, for
    /// reverse-strand reads the rightmost aligned position plus any trailing
    /// soft clip. Both account for trimming so that reads with the same
    /// physical fragment start collide regardless of how they were clipped.
    pub fn for_record(record: &RecordBuf, library: u8) -> Result<Self> {
        let reference = record.reference_sequence_id().map_or(-1, |id| id as i32);
        let start = record
            .alignment_start()
            .map(|p| usize::from(p) as i32 - 1)
            .ok_or_else(|| DupmarkError::MalformedRecord {
                name: String::from_utf8_lossy(read_name(record)).into_owned(),
                reason: "mapped record has no alignment start".to_string(),
            })?;

        let ops = record.cigar().as_ref();
        let (orientation, anchor) = if record.flags().is_reverse_complemented() {
            let end = start + reference_length(ops) as i32 - 1;
            (Orientation::Reverse, end + trailing_soft_clip(ops) as i32)
        } else {
            (Orientation::Forward, start - leading_soft_clip(ops) as i32)
        };

        Ok(Self { reference, anchor, orientation, library })
    }

    /// Builds the sweep cutoff key for the current input position.
    ///
    /// Every stored key strictly less than this cutoff belongs to a position
    /// the input has passed for good and can be retired.
    #[must_use]
    pub fn cleanup(reference: i32, position: i32) -> Self {
        Self {
            reference,
            anchor: position - MAX_CLIP_LOOKBACK,
            orientation: Orientation::Forward,
            library: 0,
        }
    }
}

/// Identity of a read pair: the fingerprints of both fragment ends.
///
/// The two keys are stored value-ordered (`first <= second`). Comparison is
/// later-key-major: a pair sorts by the anchor the input reaches *last*, so
/// the sweep retires a pair only once both ends are behind the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairedKey {
    /// The smaller of the two fingerprints.
    pub first: DupKey,
    /// The larger of the two fingerprints.
    pub second: DupKey,
}

impl PairedKey {
    /// Creates a pair key from the two mates' fingerprints, in either order.
    #[must_use]
    pub fn new(a: DupKey, b: DupKey) -> Self {
        if b < a { Self { first: b, second: a } } else { Self { first: a, second: b } }
    }

    /// The sweep cutoff for the paired table: pairs whose later fingerprint
    /// is behind `cutoff` are retired.
    #[must_use]
    pub fn cleanup(cutoff: DupKey) -> Self {
        Self { first: DupKey::EMPTY, second: cutoff }
    }
}

impl Ord for PairedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.second.cmp(&other.second).then_with(|| self.first.cmp(&other.first))
    }
}

impl PartialOrd for PairedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Packs a (reference id, 0-based position) pair into one orderable word.
#[inline]
#[must_use]
pub fn pack_position(reference: i32, position: i32) -> u64 {
    (u64::from(reference as u32) << 32) | u64::from(position as u32)
}
