//! Secondary-supers lookups.
//!
//! A published [`SecondarySupers`] is immutable, so any number of threads may
//! query it without synchronization. The hashed path touches one bitmap word
//! and usually one entry:
//!
//! 1. A clear bit at the candidate's home slot is an exact "no".
//! 2. Otherwise the entry at dense index `popcount(bitmap below slot)` is
//!    compared.
//! 3. On a miss, if the next slot is empty the candidate cannot have been
//!    displaced and the answer is "no"; else the run of occupied slots is
//!    walked by [`SecondarySupers::fallback_search`].

use crate::bitmap::{SupersBitmap, TableShape};
use crate::bits;
use crate::stats::counters;
use crate::table::HashedSuper;
use std::borrow::Borrow;

/// A type's secondary supers in table order, with their occupancy bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondarySupers<E> {
    entries: Box<[E]>,
    bitmap: SupersBitmap,
    shape: TableShape,
}

impl<E> SecondarySupers<E> {
    /// A table with no entries.
    pub fn empty(shape: TableShape) -> Self {
        Self {
            entries: Box::default(),
            bitmap: SupersBitmap::EMPTY,
            shape,
        }
    }

    /// Assemble a table from parts produced by the builder.
    pub(crate) fn from_parts(entries: Box<[E]>, bitmap: SupersBitmap, shape: TableShape) -> Self {
        debug_assert!(bitmap.is_full() || bitmap.len() as usize == entries.len());
        Self {
            entries,
            bitmap,
            shape,
        }
    }

    /// Entries in table order.
    #[inline]
    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    /// Occupancy bitmap.
    #[inline]
    pub fn bitmap(&self) -> SupersBitmap {
        self.bitmap
    }

    /// Table geometry the bitmap refers to.
    #[inline]
    pub fn shape(&self) -> TableShape {
        self.shape
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether there are no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in table order.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.entries.iter()
    }
}

impl<E: HashedSuper> SecondarySupers<E> {
    /// Check whether `candidate` is one of the entries.
    ///
    /// Unindexed tables are scanned linearly; everything else goes through
    /// the hashed lookup.
    #[inline]
    pub fn contains<Q>(&self, candidate: &Q) -> bool
    where
        E: Borrow<Q>,
        Q: HashedSuper + ?Sized,
    {
        if self.bitmap.is_full() {
            return self.linear_search(candidate);
        }
        self.lookup_hashed(candidate)
    }

    /// Hashed lookup. The table must not carry the full sentinel.
    pub fn lookup_hashed<Q>(&self, candidate: &Q) -> bool
    where
        E: Borrow<Q>,
        Q: HashedSuper + ?Sized,
    {
        debug_assert!(!self.bitmap.is_full());
        let slot = u32::from(candidate.hash_slot()) & self.shape.mask();
        let bitmap = self.bitmap.raw();

        if !self.bitmap.contains_slot(slot) {
            return false;
        }

        let index = bits::count_below(bitmap, slot) as usize;
        if self.entries[index].borrow().same_super(candidate) {
            return true;
        }

        // Bit 1 of the rotated map is the slot after the home slot.
        let rotated = bits::rotate_right(bitmap, slot, self.shape.size());
        if rotated & 2 == 0 {
            return false;
        }
        self.fallback_search(candidate, index, rotated)
    }

    /// Walk the run of occupied slots after a missed home slot.
    ///
    /// `index` is the dense index that was just compared and `rotated` is the
    /// bitmap rotated so that bit 0 is that slot. Tables too close to capacity
    /// are scanned linearly instead.
    pub fn fallback_search<Q>(&self, candidate: &Q, index: usize, rotated: u64) -> bool
    where
        E: Borrow<Q>,
        Q: HashedSuper + ?Sized,
    {
        counters().record_fallback_probe();
        let len = self.entries.len();
        if len > self.shape.probe_limit() {
            return self.linear_search(candidate);
        }

        let width = self.shape.size();
        let mut index = index;
        let mut rotated = rotated;
        let mut probes = 0u32;
        while rotated & 2 != 0 {
            index += 1;
            if index == len {
                index = 0;
            }
            probes += 1;
            if self.entries[index].borrow().same_super(candidate) {
                tracing::trace!(?candidate, probes, "secondary supers: found after probing");
                return true;
            }
            rotated = bits::rotate_right(rotated, 1, width);
        }
        tracing::trace!(?candidate, probes, "secondary supers: probe run exhausted");
        false
    }

    /// Scan every entry in order.
    pub fn linear_search<Q>(&self, candidate: &Q) -> bool
    where
        E: Borrow<Q>,
        Q: HashedSuper + ?Sized,
    {
        counters().record_linear_scan();
        self.entries
            .iter()
            .any(|entry| entry.borrow().same_super(candidate))
    }
}

impl<'a, E> IntoIterator for &'a SecondarySupers<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::SupersTableBuilder;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Entry {
        slot: u8,
        key: u64,
    }

    impl HashedSuper for Entry {
        fn hash_slot(&self) -> u8 {
            self.slot
        }

        fn tie_key(&self) -> u64 {
            self.key
        }
    }

    fn entry(slot: u8, key: u64) -> Entry {
        Entry { slot, key }
    }

    fn build(entries: Vec<Entry>) -> SecondarySupers<Entry> {
        SupersTableBuilder::default().build(entries)
    }

    // =========================================================================
    // Hashed Lookup
    // =========================================================================

    #[test]
    fn test_empty_table() {
        let table = SecondarySupers::<Entry>::empty(TableShape::DEFAULT);
        assert!(table.is_empty());
        assert!(!table.contains(&entry(0, 1)));
        assert!(!table.contains(&entry(63, 1)));
    }

    #[test]
    fn test_singleton() {
        let table = build(vec![entry(17, 4)]);
        assert!(table.contains(&entry(17, 4)));
        assert!(!table.contains(&entry(17, 5)));
        assert!(!table.contains(&entry(18, 4)));
    }

    #[test]
    fn test_every_entry_found() {
        let entries: Vec<Entry> = (0..40).map(|i| entry((i * 11 % 23) as u8, i)).collect();
        let table = build(entries.clone());
        for e in &entries {
            assert!(table.contains(e), "{e:?} not found");
        }
    }

    #[test]
    fn test_displaced_entries_found() {
        let a = entry(5, 1);
        let b = entry(5, 2);
        let c = entry(6, 3);
        let table = build(vec![a, b, c]);
        assert!(table.contains(&a));
        assert!(table.contains(&b));
        assert!(table.contains(&c));
        // Same home slot, not present: walks the run 5..=7 and stops at 8.
        assert!(!table.contains(&entry(5, 99)));
        // Empty home slot: rejected by the bitmap alone.
        assert!(!table.contains(&entry(8, 1)));
    }

    #[test]
    fn test_miss_with_empty_next_slot() {
        let table = build(vec![entry(10, 1), entry(12, 2)]);
        assert!(!table.contains(&entry(10, 3)));
        assert!(!table.contains(&entry(12, 3)));
    }

    #[test]
    fn test_probe_run_wraps() {
        let entries = vec![entry(62, 1), entry(62, 2), entry(62, 3), entry(62, 4)];
        let table = build(entries.clone());
        assert!(table.bitmap().contains_slot(0));
        assert!(table.bitmap().contains_slot(1));
        for e in &entries {
            assert!(table.contains(e));
        }
        assert!(!table.contains(&entry(62, 5)));
        assert!(!table.contains(&entry(63, 1)));
    }

    #[test]
    fn test_narrow_table() {
        let shape = TableShape::from_size(8).unwrap();
        let builder = SupersTableBuilder::with_shape(shape);
        let entries: Vec<Entry> = (0..6).map(|i| entry((i % 3 * 3) as u8, i)).collect();
        let table = builder.build(entries.clone());
        assert_eq!(table.shape(), shape);
        for e in &entries {
            assert!(table.contains(e));
        }
        for slot in 0..8 {
            assert!(!table.contains(&entry(slot, 100)));
        }
    }

    // =========================================================================
    // Linear Paths
    // =========================================================================

    #[test]
    fn test_full_sentinel_scans_linearly() {
        let entries: Vec<Entry> = (0..70).map(|i| entry((i % 3 * 21) as u8, i)).collect();
        let table = build(entries.clone());
        assert!(table.bitmap().is_full());
        for e in &entries {
            assert!(table.contains(e));
        }
        assert!(!table.contains(&entry(0, 1000)));
    }

    #[test]
    fn test_near_capacity_uses_linear_scan() {
        // 63 entries leave a single empty slot, above the probe limit.
        let entries: Vec<Entry> = (0..63).map(|i| entry(0, i)).collect();
        let table = build(entries.clone());
        assert!(!table.bitmap().is_full());
        assert!(table.len() > table.shape().probe_limit());
        for e in &entries {
            assert!(table.contains(e));
        }
        assert!(!table.contains(&entry(0, 63)));
    }

    #[test]
    fn test_linear_search_direct() {
        let table = build(vec![entry(1, 1), entry(2, 2)]);
        assert!(table.linear_search(&entry(2, 2)));
        assert!(!table.linear_search(&entry(2, 3)));
    }

    #[test]
    fn test_iteration_in_table_order() {
        let table = build(vec![entry(9, 3), entry(2, 1), entry(40, 2)]);
        let slots: Vec<u8> = table.iter().map(|e| e.slot).collect();
        assert_eq!(slots, vec![2, 9, 40]);
        assert_eq!((&table).into_iter().count(), 3);
    }
}
