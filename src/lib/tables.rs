//! In-flight tables for the streaming duplicate sweep.
//!
//! Three ordered tables hold candidates between their arrival and the moment
//! the input cursor passes their position:
//!
//! - [`FragmentTable`] keeps the best single-end candidate per fingerprint.
//! - [`MateTable`] parks paired records until their mate arrives.
//! - [`PairedTable`] keeps the best pair per paired fingerprint.
//!
//! All three are `BTreeMap`s so the sweep can retire everything behind a
//! cutoff with one range split, and so collision resolution never depends on
//! hash iteration order. Losers' input ordinals accumulate in a
//! [`DuplicateList`] that pass 2 walks in lockstep with the input.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::mem;

use noodles::sam::alignment::RecordBuf;

use crate::fingerprint::{DupKey, PairedKey};
use crate::sam::record_utils::read_name;

//////////////////////////////////////////////////////////////////////////////
// Fragment table
//////////////////////////////////////////////////////////////////////////////

/// Best-so-far candidate for one fingerprint.
///
/// `record` is only held for unpaired candidates; a paired candidate's
/// record travels on to the mate and paired tables, and the fragment entry
/// keeps just its score and ordinal.
#[derive(Debug)]
pub struct FragmentEntry {
    pub sum_base_qual: i32,
    pub ordinal: u32,
    pub paired: bool,
    pub record: Option<RecordBuf>,
}

/// What happened to an offered fragment candidate.
#[derive(Debug)]
pub enum FragmentOutcome {
    /// The candidate is now the stored entry (fresh fingerprint).
    Stored,
    /// The candidate replaced the previous entry; the loser is handed back.
    StoredDisplacing(FragmentEntry),
    /// The stored entry stands; the candidate is handed back.
    Rejected(FragmentEntry),
}

/// Ordered map of single-end candidates keyed by fingerprint.
#[derive(Debug, Default)]
pub struct FragmentTable {
    map: BTreeMap<DupKey, FragmentEntry>,
}

impl FragmentTable {
    /// Offers a candidate for a fingerprint slot.
    ///
    /// A stored unpaired entry yields to a paired candidate, or to an
    /// unpaired candidate with a strictly higher score. A stored paired
    /// entry never yields; pairing evidence outranks any quality.
    pub fn offer(&mut self, key: DupKey, candidate: FragmentEntry) -> FragmentOutcome {
        match self.map.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
                FragmentOutcome::Stored
            }
            Entry::Occupied(mut slot) => {
                let stored = slot.get();
                let replace = !stored.paired
                    && (candidate.paired || candidate.sum_base_qual > stored.sum_base_qual);
                if replace {
                    FragmentOutcome::StoredDisplacing(slot.insert(candidate))
                } else {
                    FragmentOutcome::Rejected(candidate)
                }
            }
        }
    }

    /// Retires every entry strictly below `cutoff`; `None` retires all.
    pub fn drain_before(&mut self, cutoff: Option<DupKey>) -> Vec<FragmentEntry> {
        let drained = match cutoff {
            Some(cutoff) => {
                let kept = self.map.split_off(&cutoff);
                mem::replace(&mut self.map, kept)
            }
            None => mem::take(&mut self.map),
        };
        drained.into_values().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

//////////////////////////////////////////////////////////////////////////////
// Pending-mate table
//////////////////////////////////////////////////////////////////////////////

/// A paired record waiting for its mate, parked under the packed position
/// where the mate is expected to appear.
#[derive(Debug)]
pub struct MateEntry {
    /// Fingerprint of the parked record, computed at parking time.
    pub key: DupKey,
    pub sum_base_qual: i32,
    pub ordinal: u32,
    pub record: RecordBuf,
}

/// Multi-map of parked records keyed by packed `(reference, position)`.
#[derive(Debug, Default)]
pub struct MateTable {
    map: BTreeMap<u64, Vec<MateEntry>>,
    len: usize,
}

impl MateTable {
    /// Parks a record under the position where its mate will arrive.
    pub fn park(&mut self, at: u64, entry: MateEntry) {
        self.map.entry(at).or_default().push(entry);
        self.len += 1;
    }

    /// Removes and returns the parked record at `at` whose read name equals
    /// `name`, byte for byte.
    pub fn claim(&mut self, at: u64, name: &[u8]) -> Option<MateEntry> {
        let entries = self.map.get_mut(&at)?;
        let index = entries.iter().position(|entry| read_name(&entry.record) == name)?;
        let entry = entries.swap_remove(index);
        if entries.is_empty() {
            self.map.remove(&at);
        }
        self.len -= 1;
        Some(entry)
    }

    /// Retires every entry parked strictly below `cutoff`; `None` retires
    /// all. Whatever comes back never met its mate.
    pub fn drain_before(&mut self, cutoff: Option<u64>) -> Vec<MateEntry> {
        let drained = match cutoff {
            Some(cutoff) => {
                let kept = self.map.split_off(&cutoff);
                mem::replace(&mut self.map, kept)
            }
            None => mem::take(&mut self.map),
        };
        let entries: Vec<MateEntry> = drained.into_values().flatten().collect();
        self.len -= entries.len();
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

//////////////////////////////////////////////////////////////////////////////
// Paired table
//////////////////////////////////////////////////////////////////////////////

/// Best-so-far pair for one paired fingerprint. `record1`/`ordinal1` belong
/// to the later-arriving mate, `record2`/`ordinal2` to the earlier one.
#[derive(Debug)]
pub struct PairedEntry {
    pub sum_base_qual: i32,
    pub ordinal1: u32,
    pub ordinal2: u32,
    pub record1: RecordBuf,
    pub record2: RecordBuf,
}

/// Ordered map of pair candidates keyed by paired fingerprint.
#[derive(Debug, Default)]
pub struct PairedTable {
    map: BTreeMap<PairedKey, PairedEntry>,
}

impl PairedTable {
    /// Offers a resolved pair for a slot, returning the losing pair on a
    /// collision.
    ///
    /// The pair with the higher combined score wins; on a tie, the pair
    /// whose first-seen (earlier) ordinal is smaller wins. Both rules are
    /// total, so the survivor never depends on arrival interleaving.
    pub fn offer(&mut self, key: PairedKey, incoming: PairedEntry) -> Option<PairedEntry> {
        match self.map.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(incoming);
                None
            }
            Entry::Occupied(mut slot) => {
                let stored = slot.get();
                let incoming_wins = incoming.sum_base_qual > stored.sum_base_qual
                    || (incoming.sum_base_qual == stored.sum_base_qual
                        && incoming.ordinal2 < stored.ordinal2);
                if incoming_wins { Some(slot.insert(incoming)) } else { Some(incoming) }
            }
        }
    }

    /// Retires every pair whose later fingerprint is strictly below
    /// `cutoff`; `None` retires all.
    pub fn drain_before(&mut self, cutoff: Option<PairedKey>) -> Vec<PairedEntry> {
        let drained = match cutoff {
            Some(cutoff) => {
                let kept = self.map.split_off(&cutoff);
                mem::replace(&mut self.map, kept)
            }
            None => mem::take(&mut self.map),
        };
        drained.into_values().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

//////////////////////////////////////////////////////////////////////////////
// Duplicate ordinal list
//////////////////////////////////////////////////////////////////////////////

/// Append-only list of the input ordinals of duplicate records.
#[derive(Debug, Default)]
pub struct DuplicateList {
    ordinals: Vec<u32>,
}

impl DuplicateList {
    /// Records a loser's input ordinal.
    pub fn push(&mut self, ordinal: u32) {
        self.ordinals.push(ordinal);
    }

    /// Sorts the ordinals ascending; required before [`Self::cursor`].
    pub fn sort(&mut self) {
        self.ordinals.sort_unstable();
        debug_assert!(
            self.ordinals.windows(2).all(|w| w[0] < w[1]),
            "a record was marked duplicate twice"
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    /// The recorded ordinals, in push order until [`Self::sort`] is called.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.ordinals
    }

    /// Walks the sorted list in lockstep with ascending input ordinals.
    #[must_use]
    pub fn cursor(&self) -> DuplicateCursor<'_> {
        DuplicateCursor { ordinals: &self.ordinals, next: 0 }
    }
}

/// Forward-only cursor over a sorted [`DuplicateList`].
#[derive(Debug)]
pub struct DuplicateCursor<'a> {
    ordinals: &'a [u32],
    next: usize,
}

impl DuplicateCursor<'_> {
    /// Returns true when `ordinal` is the next pending duplicate, advancing
    /// past it. Ordinals must be queried in ascending order.
    pub fn matches(&mut self, ordinal: u32) -> bool {
        if self.next < self.ordinals.len() && self.ordinals[self.next] == ordinal {
            self.next += 1;
            true
        } else {
            false
        }
    }
}
