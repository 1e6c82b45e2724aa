//! The streaming duplicate-detection engine.
//!
//! [`DedupEngine`] consumes decoded records in ascending coordinate order
//! and decides, for every fingerprint collision, which record survives.
//! Unpaired records compete in the fragment table directly. Paired records
//! first wait in the pending-mate table until their mate arrives, then
//! compete as a unit in the paired table. Whenever the input position
//! advances, entries whose positions can no longer collide with anything
//! still to come are retired.
//!
//! The engine never writes output. It collects the input ordinals of the
//! losing records; a second pass over the same input applies the flags.

use log::{info, warn};
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::Flags;

use crate::errors::{DupmarkError, Result};
use crate::fingerprint::{DupKey, PairedKey, pack_position};
use crate::library::LibraryMap;
use crate::phred::{DEFAULT_MIN_QUAL, sum_base_qualities};
use crate::pool::RecordPool;
use crate::recab::Recalibrator;
use crate::sam::record_utils::read_name;
use crate::tables::{
    DuplicateList, FragmentEntry, FragmentOutcome, FragmentTable, MateEntry, MateTable,
    PairedEntry, PairedTable,
};

/// Tunables of a dedup run.
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Minimum per-base Phred score counted toward a read's quality sum.
    pub min_qual: u8,
    /// Treat reads whose mate maps to a different reference as single-ended.
    pub one_chrom: bool,
    /// Accept input that already carries duplicate flags.
    pub force: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { min_qual: DEFAULT_MIN_QUAL, one_chrom: false, force: false }
    }
}

/// Read counts accumulated during pass 1.
#[derive(Debug, Default, Clone)]
pub struct PassOneStats {
    /// Total records read.
    pub records: u64,
    /// Records with the paired flag set.
    pub paired: u64,
    /// Records flagged as properly paired.
    pub proper_pair: u64,
    /// Unmapped records (skipped by the classifier).
    pub unmapped: u64,
    /// Reverse-strand records.
    pub reverse: u64,
    /// Records flagged as failing vendor QC.
    pub qc_fail: u64,
    /// Paired records whose mate never showed up.
    pub missing_mate: u64,
}

/// Everything pass 2 needs from pass 1.
pub struct PassOneSummary {
    /// Read counts.
    pub stats: PassOneStats,
    /// Sorted input ordinals of all duplicate records.
    pub duplicates: DuplicateList,
    /// Fragment table size after the final sweep; zero on a clean run.
    pub final_fragments: usize,
    /// Paired table size after the final sweep; zero on a clean run.
    pub final_pairs: usize,
    /// Pending-mate table size after the final sweep; zero on a clean run.
    pub final_pending_mates: usize,
    /// The recalibration hook, handed back for pass 2.
    pub recalibrator: Option<Box<dyn Recalibrator>>,
}

/// Single-pass duplicate classifier and sweep controller.
pub struct DedupEngine {
    config: DedupConfig,
    libraries: LibraryMap,
    pool: RecordPool,
    fragments: FragmentTable,
    pending_mates: MateTable,
    pairs: PairedTable,
    duplicates: DuplicateList,
    stats: PassOneStats,
    // sweep cursor
    last_reference: i32,
    last_position: i32,
    // coordinate-order validation cursor (unplaced reads order last)
    last_sort_reference: i32,
    last_sort_position: i32,
    // one-line diagnostics, each emitted at most once
    warned_same_reference_mate: bool,
    warned_cross_reference_mate: bool,
    recalibrator: Option<Box<dyn Recalibrator>>,
}

impl DedupEngine {
    #[must_use]
    pub fn new(
        config: DedupConfig,
        libraries: LibraryMap,
        recalibrator: Option<Box<dyn Recalibrator>>,
    ) -> Self {
        Self {
            config,
            libraries,
            pool: RecordPool::new(),
            fragments: FragmentTable::default(),
            pending_mates: MateTable::default(),
            pairs: PairedTable::default(),
            duplicates: DuplicateList::default(),
            stats: PassOneStats::default(),
            last_reference: -1,
            last_position: -1,
            last_sort_reference: -1,
            last_sort_position: -1,
            warned_same_reference_mate: false,
            warned_cross_reference_mate: false,
            recalibrator,
        }
    }

    /// Hands out a record buffer for the reader to decode into.
    pub fn acquire_record(&mut self) -> RecordBuf {
        self.pool.acquire()
    }

    /// Returns an unused buffer (e.g. after hitting EOF).
    pub fn recycle(&mut self, record: RecordBuf) {
        self.pool.release(record);
    }

    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn pending_mate_count(&self) -> usize {
        self.pending_mates.len()
    }

    #[must_use]
    pub fn stats(&self) -> &PassOneStats {
        &self.stats
    }

    /// Feeds the next record, in input order, through the classifier.
    ///
    /// # Errors
    ///
    /// Fails when the record is out of coordinate order, already carries a
    /// duplicate flag without `force`, or is structurally malformed.
    pub fn process(&mut self, record: RecordBuf, ordinal: u32) -> Result<()> {
        let flags = record.flags();
        self.stats.records += 1;
        if flags.is_segmented() {
            self.stats.paired += 1;
        }
        if flags.is_properly_segmented() {
            self.stats.proper_pair += 1;
        }
        if flags.is_reverse_complemented() {
            self.stats.reverse += 1;
        }
        if flags.is_qc_fail() {
            self.stats.qc_fail += 1;
        }
        if flags.is_duplicate() && !self.config.force {
            return Err(DupmarkError::AlreadyMarked {
                name: String::from_utf8_lossy(read_name(&record)).into_owned(),
            });
        }

        self.check_coordinate_order(&record)?;

        // Every position advance retires entries the input has passed.
        if let Some(id) = record.reference_sequence_id() {
            let reference = id as i32;
            let position = record.alignment_start().map_or(-1, |p| usize::from(p) as i32 - 1);
            if self.has_position_changed(reference, position) {
                self.sweep(Some((reference, position)));
            }
        }

        if flags.is_unmapped() {
            self.stats.unmapped += 1;
            self.pool.release(record);
            return Ok(());
        }

        self.classify(record, ordinal)
    }

    /// Flushes the tables and seals the duplicate list.
    #[must_use]
    pub fn finish(mut self) -> PassOneSummary {
        self.sweep(None);
        debug_assert!(self.fragments.is_empty());
        debug_assert!(self.pairs.is_empty());
        debug_assert!(self.pending_mates.is_empty());

        // the high-water mark of in-flight records, i.e. the sweep window
        info!("allocated {} record buffers", self.pool.allocated());

        self.duplicates.sort();

        PassOneSummary {
            stats: self.stats,
            duplicates: self.duplicates,
            final_fragments: self.fragments.len(),
            final_pairs: self.pairs.len(),
            final_pending_mates: self.pending_mates.len(),
            recalibrator: self.recalibrator,
        }
    }

    fn check_coordinate_order(&mut self, record: &RecordBuf) -> Result<()> {
        let reference = record.reference_sequence_id().map_or(i32::MAX, |id| id as i32);
        let position = record.alignment_start().map_or(-1, |p| usize::from(p) as i32 - 1);
        if (reference, position) < (self.last_sort_reference, self.last_sort_position) {
            return Err(DupmarkError::NotCoordinateSorted {
                name: String::from_utf8_lossy(read_name(record)).into_owned(),
                reference: record.reference_sequence_id().map_or(-1, |id| id as i32),
                position,
                prev_reference: if self.last_sort_reference == i32::MAX {
                    -1
                } else {
                    self.last_sort_reference
                },
                prev_position: self.last_sort_position,
            });
        }
        self.last_sort_reference = reference;
        self.last_sort_position = position;
        Ok(())
    }

    fn has_position_changed(&mut self, reference: i32, position: i32) -> bool {
        if self.last_reference != reference || self.last_position < position {
            if self.last_reference != reference {
                info!("reading reference {reference}");
                self.last_reference = reference;
            }
            self.last_position = position;
            true
        } else {
            false
        }
    }

    /// Retires entries behind `up_to`, or everything when `None`.
    fn sweep(&mut self, up_to: Option<(i32, i32)>) {
        let (fragment_cutoff, pair_cutoff, mate_cutoff) = match up_to {
            Some((reference, position)) => {
                let cutoff = DupKey::cleanup(reference, position);
                (Some(cutoff), Some(PairedKey::cleanup(cutoff)), Some(pack_position(reference, position)))
            }
            None => (None, None, None),
        };

        for entry in self.fragments.drain_before(fragment_cutoff) {
            // paired entries left only bookkeeping here; their records moved on
            if !entry.paired {
                if let Some(record) = entry.record {
                    self.handle_non_duplicate(record);
                }
            }
        }

        for entry in self.pairs.drain_before(pair_cutoff) {
            self.handle_non_duplicate(entry.record1);
            self.handle_non_duplicate(entry.record2);
        }

        for entry in self.pending_mates.drain_before(mate_cutoff) {
            self.handle_missing_mate(entry.record);
        }
    }

    /// Routes one mapped record through the fragment, pending-mate and
    /// paired tables.
    fn classify(&mut self, record: RecordBuf, ordinal: u32) -> Result<()> {
        let flags = record.flags();
        let library = self.libraries.library_for(&record);
        let key = DupKey::for_record(&record, library)?;
        let sum_base_qual = sum_base_qualities(&record, self.config.min_qual);

        let reference = record.reference_sequence_id().map_or(-1, |id| id as i32);
        let mate_reference = record.mate_reference_sequence_id().map_or(-1, |id| id as i32);

        let mut mate_expected = flags.is_segmented() && !flags.is_mate_unmapped();
        if self.config.one_chrom && reference != mate_reference {
            mate_expected = false;
        }

        if !mate_expected {
            let candidate =
                FragmentEntry { sum_base_qual, ordinal, paired: false, record: Some(record) };
            match self.fragments.offer(key, candidate) {
                FragmentOutcome::Stored => {}
                FragmentOutcome::StoredDisplacing(loser) => self.retire_fragment_loser(loser),
                FragmentOutcome::Rejected(candidate) => self.retire_fragment_loser(candidate),
            }
            return Ok(());
        }

        // The fragment slot still tracks paired records so that unpaired
        // collisions at the same anchor lose to them; the pair itself is
        // judged in the paired table once both mates are in hand.
        let placeholder = FragmentEntry { sum_base_qual, ordinal, paired: true, record: None };
        match self.fragments.offer(key, placeholder) {
            FragmentOutcome::Stored => {}
            FragmentOutcome::StoredDisplacing(loser) => self.retire_fragment_loser(loser),
            FragmentOutcome::Rejected(_) => {} // stored entry is itself paired
        }

        let position = record.alignment_start().map_or(-1, |p| usize::from(p) as i32 - 1);
        let mate_position =
            record.mate_alignment_start().map(|p| usize::from(p) as i32 - 1).ok_or_else(|| {
                DupmarkError::MalformedRecord {
                    name: String::from_utf8_lossy(read_name(&record)).into_owned(),
                    reason: "mapped mate has no alignment start".to_string(),
                }
            })?;
        let self_packed = pack_position(reference, position);
        let mate_packed = pack_position(mate_reference, mate_position);

        // A mate at an earlier position must already be parked under this
        // record's position; claim it by name.
        let claimed = if mate_packed <= self_packed {
            let name = read_name(&record);
            self.pending_mates.claim(self_packed, name)
        } else {
            None
        };

        match claimed {
            Some(mate) => {
                let pair_key = PairedKey::new(key, mate.key);
                let entry = PairedEntry {
                    sum_base_qual: sum_base_qual + mate.sum_base_qual,
                    ordinal1: ordinal,
                    ordinal2: mate.ordinal,
                    record1: record,
                    record2: mate.record,
                };
                if let Some(loser) = self.pairs.offer(pair_key, entry) {
                    self.duplicates.push(loser.ordinal1);
                    self.duplicates.push(loser.ordinal2);
                    self.pool.release(loser.record1);
                    self.pool.release(loser.record2);
                }
            }
            // Equal positions park on first arrival and claim on second.
            None if mate_packed >= self_packed => {
                self.pending_mates
                    .park(mate_packed, MateEntry { key, sum_base_qual, ordinal, record });
            }
            None => self.handle_missing_mate(record),
        }

        Ok(())
    }

    fn retire_fragment_loser(&mut self, loser: FragmentEntry) {
        // a paired candidate is never a fragment loser; its fate rests with
        // the paired table
        if loser.paired {
            return;
        }
        self.duplicates.push(loser.ordinal);
        if let Some(record) = loser.record {
            self.pool.release(record);
        }
    }

    /// A retired record that is not a duplicate: feed the recalibration
    /// model if configured, then recycle the buffer.
    fn handle_non_duplicate(&mut self, mut record: RecordBuf) {
        if let Some(recalibrator) = self.recalibrator.as_mut() {
            if self.config.force && record.flags().is_duplicate() {
                let flags = u16::from(record.flags());
                *record.flags_mut() = Flags::from(flags & !u16::from(Flags::DUPLICATE));
            }
            recalibrator.observe(&record);
        }
        self.pool.release(record);
    }

    fn handle_missing_mate(&mut self, record: RecordBuf) {
        let cross_reference =
            record.mate_reference_sequence_id() != record.reference_sequence_id();
        if cross_reference {
            if !self.warned_cross_reference_mate {
                warn!(
                    "mate on a different chromosome was never seen; consider --oneChrom to \
                     treat such reads as single-ended"
                );
                self.warned_cross_reference_mate = true;
            }
        } else if !self.warned_same_reference_mate {
            warn!("records with a missing mate cannot be checked for duplicates");
            self.warned_same_reference_mate = true;
        }

        self.stats.missing_mate += 1;
        self.handle_non_duplicate(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recab::testing::CountingRecalibrator;
    use crate::sam::builder::RecordBuilder;
    use std::rc::Rc;

    fn engine() -> DedupEngine {
        DedupEngine::new(DedupConfig::default(), LibraryMap::default(), None)
    }

    /// Unpaired forward-strand read; `start` is 0-based, `qual` per base.
    fn frag(name: &str, reference: usize, start: usize, cigar: &str, qual: u8) -> RecordBuf {
        let read_length = 50;
        RecordBuilder::new()
            .name(name)
            .sequence(&"A".repeat(read_length))
            .qualities(&vec![qual; read_length])
            .reference_sequence_id(reference)
            .alignment_start(start + 1)
            .cigar(cigar)
            .build()
    }

    /// One mate of a pair; `start`/`mate_start` are 0-based.
    #[allow(clippy::too_many_arguments)]
    fn mate(
        name: &str,
        reference: usize,
        start: usize,
        mate_reference: usize,
        mate_start: usize,
        reverse: bool,
        qual: u8,
    ) -> RecordBuf {
        let read_length = 50;
        RecordBuilder::new()
            .name(name)
            .sequence(&"A".repeat(read_length))
            .qualities(&vec![qual; read_length])
            .paired(true)
            .first_segment(!reverse)
            .reverse_complement(reverse)
            .mate_reverse_complement(!reverse)
            .reference_sequence_id(reference)
            .alignment_start(start + 1)
            .cigar("50M")
            .mate_reference_sequence_id(mate_reference)
            .mate_alignment_start(mate_start + 1)
            .build()
    }

    #[test]
    fn test_single_end_duplicates_keep_highest_quality() {
        // two unpaired reads on the same anchor: 16*50=800 vs 20*50=1000
        let mut engine = engine();
        engine.process(frag("a", 0, 100, "50M", 16), 0).unwrap();
        engine.process(frag("b", 0, 100, "50M", 20), 1).unwrap();

        let summary = engine.finish();
        assert_eq!(summary.duplicates.as_slice(), &[0]);
        assert_eq!(summary.stats.records, 2);
    }

    #[test]
    fn test_arrival_order_does_not_change_the_survivor() {
        let mut engine = engine();
        engine.process(frag("b", 0, 100, "50M", 20), 0).unwrap();
        engine.process(frag("a", 0, 100, "50M", 16), 1).unwrap();

        let summary = engine.finish();
        assert_eq!(summary.duplicates.as_slice(), &[1]);
    }

    #[test]
    fn test_equal_quality_keeps_the_earlier_record() {
        let mut engine = engine();
        engine.process(frag("a", 0, 100, "50M", 20), 0).unwrap();
        engine.process(frag("b", 0, 100, "50M", 20), 1).unwrap();

        let summary = engine.finish();
        assert_eq!(summary.duplicates.as_slice(), &[1]);
    }

    #[test]
    fn test_soft_clipped_read_collides_on_shared_anchor() {
        // 10S40M at 100 anchors at 90, same as 40M at 90
        let mut engine = engine();
        engine.process(frag("plain", 0, 90, "40M", 20), 0).unwrap();
        engine.process(frag("clipped", 0, 100, "10S40M", 16), 1).unwrap();

        let summary = engine.finish();
        assert_eq!(summary.duplicates.as_slice(), &[1]);
    }

    #[test]
    fn test_opposite_strands_do_not_collide() {
        // forward at 100 and a reverse read whose 5' anchor is also 100
        let mut engine = engine();
        engine.process(frag("fwd", 0, 100, "50M", 20), 0).unwrap();
        let rev = RecordBuilder::new()
            .name("rev")
            .sequence(&"A".repeat(50))
            .qualities(&[20; 50])
            .reference_sequence_id(0)
            .alignment_start(52)
            .cigar("50M")
            .reverse_complement(true)
            .build();
        engine.process(rev, 1).unwrap();

        let summary = engine.finish();
        assert!(summary.duplicates.is_empty());
    }

    #[test]
    fn test_reads_in_different_libraries_do_not_collide() {
        use bstr::BString;
        use noodles::sam::Header;
        use noodles::sam::header::record::value::Map;
        use noodles::sam::header::record::value::map::ReadGroup;
        use noodles::sam::header::record::value::map::read_group::tag as rg_tag;

        let mut header = Header::builder();
        for (id, lb) in [("rg1", "libA"), ("rg2", "libB")] {
            let group =
                Map::<ReadGroup>::builder().insert(rg_tag::LIBRARY, lb.to_string()).build().unwrap();
            header = header.add_read_group(BString::from(id), group);
        }
        let libraries = LibraryMap::from_header(&header.build()).unwrap();

        let mut engine = DedupEngine::new(DedupConfig::default(), libraries, None);
        let mut a = frag("a", 0, 100, "50M", 20);
        a.data_mut().insert(
            noodles::sam::alignment::record::data::field::Tag::from([b'R', b'G']),
            noodles::sam::alignment::record_buf::data::field::Value::String(BString::from("rg1")),
        );
        let mut b = frag("b", 0, 100, "50M", 20);
        b.data_mut().insert(
            noodles::sam::alignment::record::data::field::Tag::from([b'R', b'G']),
            noodles::sam::alignment::record_buf::data::field::Value::String(BString::from("rg2")),
        );
        engine.process(a, 0).unwrap();
        engine.process(b, 1).unwrap();

        let summary = engine.finish();
        assert!(summary.duplicates.is_empty());
    }

    #[test]
    fn test_paired_duplicates_keep_highest_combined_quality() {
        // pairs (a1,a2) and (b1,b2) share fingerprints on both sides;
        // a sums to 15*100=1500, b to 16*100=1600
        let mut engine = engine();
        engine.process(mate("a", 0, 100, 0, 300, false, 15), 0).unwrap();
        engine.process(mate("b", 0, 100, 0, 300, false, 16), 1).unwrap();
        engine.process(mate("a", 0, 300, 0, 100, true, 15), 2).unwrap();
        engine.process(mate("b", 0, 300, 0, 100, true, 16), 3).unwrap();

        let summary = engine.finish();
        let mut losers = summary.duplicates.as_slice().to_vec();
        losers.sort_unstable();
        assert_eq!(losers, vec![0, 2]);
    }

    #[test]
    fn test_paired_tie_keeps_first_seen_pair() {
        let mut engine = engine();
        engine.process(mate("a", 0, 100, 0, 300, false, 15), 0).unwrap();
        engine.process(mate("b", 0, 100, 0, 300, false, 15), 1).unwrap();
        engine.process(mate("a", 0, 300, 0, 100, true, 15), 2).unwrap();
        engine.process(mate("b", 0, 300, 0, 100, true, 15), 3).unwrap();

        let summary = engine.finish();
        let mut losers = summary.duplicates.as_slice().to_vec();
        losers.sort_unstable();
        assert_eq!(losers, vec![1, 3], "pair 'a' was seen first and survives the tie");
    }

    #[test]
    fn test_paired_record_beats_unpaired_at_same_anchor() {
        // the unpaired read has higher quality but pairing evidence wins
        let mut engine = engine();
        engine.process(frag("single", 0, 100, "50M", 40), 0).unwrap();
        engine.process(mate("pair", 0, 100, 0, 300, false, 15), 1).unwrap();
        engine.process(mate("pair", 0, 300, 0, 100, true, 15), 2).unwrap();

        let summary = engine.finish();
        assert_eq!(summary.duplicates.as_slice(), &[0]);
    }

    #[test]
    fn test_unpaired_record_loses_against_stored_pair() {
        let mut engine = engine();
        engine.process(mate("pair", 0, 100, 0, 300, false, 15), 0).unwrap();
        engine.process(frag("single", 0, 100, "50M", 40), 1).unwrap();
        engine.process(mate("pair", 0, 300, 0, 100, true, 15), 2).unwrap();

        let summary = engine.finish();
        assert_eq!(summary.duplicates.as_slice(), &[1]);
    }

    #[test]
    fn test_missing_mate_is_counted_and_not_marked() {
        // claims a mate at an earlier position that was never parked
        let mut engine = engine();
        engine.process(mate("lonely", 0, 500, 0, 100, true, 20), 0).unwrap();

        assert_eq!(engine.stats().missing_mate, 1);
        let summary = engine.finish();
        assert!(summary.duplicates.is_empty());
        assert_eq!(summary.stats.missing_mate, 1);
    }

    #[test]
    fn test_parked_mate_never_claimed_is_missing_at_eof() {
        let mut engine = engine();
        engine.process(mate("waiting", 0, 100, 0, 900, false, 20), 0).unwrap();
        assert_eq!(engine.pending_mate_count(), 1);

        let summary = engine.finish();
        assert_eq!(summary.stats.missing_mate, 1);
        assert!(summary.duplicates.is_empty());
        assert_eq!(summary.final_pending_mates, 0);
    }

    #[test]
    fn test_one_chrom_mode_bypasses_the_mate_table() {
        let config = DedupConfig { one_chrom: true, ..DedupConfig::default() };
        let mut engine = DedupEngine::new(config, LibraryMap::default(), None);

        // paired read with its mate on chr2: treated as single-ended
        engine.process(mate("cross", 0, 100, 1, 100, false, 16), 0).unwrap();
        assert_eq!(engine.pending_mate_count(), 0);

        // a colliding unpaired read follows the normal fragment rules
        engine.process(frag("single", 0, 100, "50M", 20), 1).unwrap();

        let summary = engine.finish();
        assert_eq!(summary.duplicates.as_slice(), &[0]);
        assert_eq!(summary.stats.missing_mate, 0);
    }

    #[test]
    fn test_cross_reference_pair_without_one_chrom_reports_missing_mate() {
        // the mate on chr2 never arrives within this input
        let mut engine = engine();
        engine.process(mate("cross", 1, 100, 0, 100, true, 16), 0).unwrap();

        let summary = engine.finish();
        assert_eq!(summary.stats.missing_mate, 1);
        assert!(summary.duplicates.is_empty());
    }

    #[test]
    fn test_sweep_retires_entries_behind_the_cursor() {
        let mut engine = engine();
        engine.process(frag("a", 0, 100, "50M", 20), 0).unwrap();
        assert_eq!(engine.fragment_count(), 1);

        // advancing well past the look-back window retires the entry
        engine.process(frag("far", 0, 5000, "50M", 20), 1).unwrap();
        assert_eq!(engine.fragment_count(), 1, "only the new entry remains");

        let summary = engine.finish();
        assert!(summary.duplicates.is_empty());
    }

    #[test]
    fn test_tables_are_empty_after_finish() {
        let mut engine = engine();
        engine.process(mate("p", 0, 100, 0, 200, false, 20), 0).unwrap();
        engine.process(frag("f", 0, 150, "50M", 20), 1).unwrap();
        engine.process(mate("p", 0, 200, 0, 100, true, 20), 2).unwrap();

        let summary = engine.finish();
        assert_eq!(summary.final_fragments, 0);
        assert_eq!(summary.final_pairs, 0);
        assert_eq!(summary.final_pending_mates, 0);
    }

    #[test]
    fn test_unsorted_input_is_rejected() {
        let mut engine = engine();
        engine.process(frag("a", 0, 200, "50M", 20), 0).unwrap();
        let result = engine.process(frag("b", 0, 100, "50M", 20), 1);
        assert!(matches!(result, Err(DupmarkError::NotCoordinateSorted { .. })));
    }

    #[test]
    fn test_reference_going_backwards_is_rejected() {
        let mut engine = engine();
        engine.process(frag("a", 1, 100, "50M", 20), 0).unwrap();
        let result = engine.process(frag("b", 0, 500, "50M", 20), 1);
        assert!(matches!(result, Err(DupmarkError::NotCoordinateSorted { .. })));
    }

    #[test]
    fn test_already_marked_input_is_rejected_without_force() {
        let mut engine = engine();
        let marked = RecordBuilder::new()
            .name("old")
            .sequence(&"A".repeat(50))
            .qualities(&[20; 50])
            .reference_sequence_id(0)
            .alignment_start(101)
            .cigar("50M")
            .duplicate(true)
            .build();
        let result = engine.process(marked, 0);
        assert!(matches!(result, Err(DupmarkError::AlreadyMarked { .. })));
    }

    #[test]
    fn test_force_accepts_already_marked_input() {
        let config = DedupConfig { force: true, ..DedupConfig::default() };
        let mut engine = DedupEngine::new(config, LibraryMap::default(), None);
        let marked = RecordBuilder::new()
            .name("old")
            .sequence(&"A".repeat(50))
            .qualities(&[20; 50])
            .reference_sequence_id(0)
            .alignment_start(101)
            .cigar("50M")
            .duplicate(true)
            .build();
        engine.process(marked, 0).unwrap();
        let summary = engine.finish();
        assert!(summary.duplicates.is_empty());
    }

    #[test]
    fn test_unmapped_records_are_counted_and_skipped() {
        let mut engine = engine();
        let unmapped = RecordBuilder::new()
            .name("u")
            .sequence("ACGT")
            .qualities(&[20; 4])
            .unmapped(true)
            .build();
        engine.process(unmapped, 0).unwrap();

        let summary = engine.finish();
        assert_eq!(summary.stats.unmapped, 1);
        assert_eq!(summary.final_fragments, 0);
        assert!(summary.duplicates.is_empty());
    }

    #[test]
    fn test_recalibration_hook_sees_retired_non_duplicates() {
        let recalibrator = CountingRecalibrator::default();
        let counts = Rc::clone(&recalibrator.counts);
        let mut engine = DedupEngine::new(
            DedupConfig::default(),
            LibraryMap::default(),
            Some(Box::new(recalibrator)),
        );

        // one fragment survivor, one duplicate
        engine.process(frag("a", 0, 100, "50M", 16), 0).unwrap();
        engine.process(frag("b", 0, 100, "50M", 20), 1).unwrap();
        // an unrelated survivor
        engine.process(frag("c", 0, 400, "50M", 20), 2).unwrap();

        let summary = engine.finish();
        assert_eq!(summary.duplicates.as_slice(), &[0]);
        // only the two survivors feed the model
        assert_eq!(counts.borrow().observed, 2);
    }

    #[test]
    fn test_record_buffers_are_recycled() {
        let mut engine = engine();
        for i in 0..20 {
            // same anchor, equal quality: every round rejects the newcomer
            // and its buffer lands back on the free list
            engine.process(frag(&format!("r{i}"), 0, 100, "50M", 20), i).unwrap();
        }
        assert_eq!(engine.pool.idle(), 19);
        assert_eq!(engine.fragment_count(), 1);
    }
}
