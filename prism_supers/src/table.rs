//! Secondary-supers hash table construction.
//!
//! A type's secondary supers are stored as a dense array plus a
//! [`SupersBitmap`]. Conceptually the array is an open-addressed table of
//! `table_size` slots with the empty slots squeezed out; the bitmap records
//! which slots were occupied, and the dense index of an entry is the number of
//! occupied slots below it.
//!
//! # Insertion
//!
//! Entries are inserted with Robin Hood linear probing: when an incoming entry
//! has probed further from its home slot than the occupant, it takes the slot
//! and the occupant continues probing. Ties are broken by [`HashedSuper::tie_key`],
//! which makes the final layout a pure function of the *set* of entries,
//! independent of insertion order.
//!
//! ```text
//!   home slots:   A=5  B=5  C=6        tie keys: A < B
//!
//!   slot:    4    5    6    7    8
//!          [ .  | B  | A  | C  | .  ]    bitmap bits 5,6,7
//!   dense:        [B, A, C]
//! ```
//!
//! # Sentinels
//!
//! Empty sets use [`SupersBitmap::EMPTY`]; sets with at least `table_size`
//! entries are not hashed at all and get [`SupersBitmap::FULL`], which routes
//! every lookup to a linear scan.

use crate::bitmap::{SupersBitmap, TableShape};
use crate::config::{ConfigError, SupersConfig};
use crate::error::verification_failure;
use crate::lookup::SecondarySupers;
use crate::stats::{counters, positive_lookup_stats};
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Hashed Entries
// =============================================================================

/// An entry that can be stored in a secondary-supers table.
pub trait HashedSuper: fmt::Debug {
    /// Home slot of this entry, in `[0, table_size)`.
    fn hash_slot(&self) -> u8;

    /// Total order used to break Robin Hood ties.
    ///
    /// Must be unique among the entries of one table and must not depend on
    /// insertion order.
    fn tie_key(&self) -> u64;

    /// Identity comparison used by lookups.
    #[inline]
    fn same_super(&self, other: &Self) -> bool {
        self.tie_key() == other.tie_key()
    }
}

impl<T: HashedSuper + ?Sized> HashedSuper for Arc<T> {
    #[inline]
    fn hash_slot(&self) -> u8 {
        (**self).hash_slot()
    }

    #[inline]
    fn tie_key(&self) -> u64 {
        (**self).tie_key()
    }

    #[inline]
    fn same_super(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other) || (**self).same_super(other)
    }
}

// =============================================================================
// Table Builder
// =============================================================================

/// Builds secondary-supers tables for one table geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SupersTableBuilder {
    shape: TableShape,
}

impl SupersTableBuilder {
    /// Create a builder for the given configuration.
    pub fn new(config: &SupersConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_shape(config.table_shape()?))
    }

    /// Create a builder for an explicit geometry.
    pub const fn with_shape(shape: TableShape) -> Self {
        Self { shape }
    }

    /// Table geometry used by this builder.
    #[inline]
    pub fn shape(&self) -> TableShape {
        self.shape
    }

    /// Insert `entry` into the scratch `table` with Robin Hood probing.
    ///
    /// `table` must have exactly `table_size` slots and `bitmap` must describe
    /// its occupancy. Inserting into a table that would be left without an
    /// empty slot is fatal: probe termination relies on at least one zero bit.
    pub fn hash_insert<E: HashedSuper>(
        &self,
        entry: E,
        table: &mut [Option<E>],
        bitmap: &mut SupersBitmap,
    ) {
        let size = self.shape.size();
        let mask = self.shape.mask();
        debug_assert_eq!(table.len(), size as usize);

        if bitmap.is_full() || bitmap.len() + 1 >= size {
            verification_failure(format_args!(
                "hash_insert of {entry:?} into a table with {} of {size} slots occupied ({bitmap:?})",
                bitmap.len(),
            ));
        }

        let mut incoming = entry;
        let mut dist = 0u32;
        let mut slot = u32::from(incoming.hash_slot()) & mask;
        loop {
            debug_assert_eq!(bitmap.contains_slot(slot), table[slot as usize].is_some());
            let Some(existing) = table[slot as usize].as_mut() else {
                table[slot as usize] = Some(incoming);
                bitmap.insert(slot);
                return;
            };

            let existing_dist = slot.wrapping_sub(u32::from(existing.hash_slot())) & mask;
            if existing_dist < dist
                || (existing_dist == dist && existing.tie_key() < incoming.tie_key())
            {
                incoming = std::mem::replace(existing, incoming);
                dist = existing_dist;
            }
            dist += 1;
            slot = (slot + 1) & mask;
        }
    }

    /// Hash `entries` and return the resulting bitmap.
    ///
    /// With `rewrite`, `entries` is reordered into table order. Without it,
    /// `entries` must already be in table order; any difference is fatal.
    ///
    /// Empty sets, singletons, and sets of `table_size` or more entries are
    /// answered without building a scratch table.
    pub fn hash_secondary_supers<E>(&self, entries: &mut [E], rewrite: bool) -> SupersBitmap
    where
        E: HashedSuper + Clone,
    {
        if !rewrite {
            return self.compute_bitmap(entries);
        }
        if let Some(bitmap) = self.shortcut(entries) {
            return bitmap;
        }

        let (scratch, bitmap) = self.hash_into_scratch(entries);
        for (dense, entry) in scratch.into_iter().flatten().enumerate() {
            entries[dense] = entry;
        }
        debug_assert_eq!(bitmap.len() as usize, entries.len());
        bitmap
    }

    /// Recompute the bitmap of an array that is already in table order.
    ///
    /// Fatal if the array is not in the order hashing would produce.
    pub fn compute_bitmap<E>(&self, entries: &[E]) -> SupersBitmap
    where
        E: HashedSuper + Clone,
    {
        if let Some(bitmap) = self.shortcut(entries) {
            return bitmap;
        }

        let (scratch, bitmap) = self.hash_into_scratch(entries);
        for (dense, expected) in scratch.iter().flatten().enumerate() {
            let actual = &entries[dense];
            if !actual.same_super(expected) {
                verification_failure(format_args!(
                    "broken secondary supers order at index {dense}: expected {expected:?}, found {actual:?}; \
                     bitmap {bitmap:?}, entries {entries:?}"
                ));
            }
        }
        bitmap
    }

    /// Build a published table from an unordered set of entries.
    pub fn build<E>(&self, mut entries: Vec<E>) -> SecondarySupers<E>
    where
        E: HashedSuper + Clone,
    {
        let bitmap = self.hash_secondary_supers(&mut entries, true);
        let table = SecondarySupers::from_parts(entries.into_boxed_slice(), bitmap, self.shape);
        self.record_build(&table);
        table
    }

    /// Rebuild a table from an array already in table order and its bitmap,
    /// e.g. one restored from a snapshot.
    ///
    /// Fatal if either the order or the bitmap disagrees with a fresh hash.
    pub fn restore<E>(&self, entries: Vec<E>, bitmap: SupersBitmap) -> SecondarySupers<E>
    where
        E: HashedSuper + Clone,
    {
        let computed = self.compute_bitmap(&entries);
        if computed != bitmap {
            verification_failure(format_args!(
                "restored bitmap {bitmap:?} does not match computed {computed:?} for {entries:?}"
            ));
        }
        SecondarySupers::from_parts(entries.into_boxed_slice(), bitmap, self.shape)
    }

    /// Answer the sizes that never need a scratch table.
    fn shortcut<E: HashedSuper>(&self, entries: &[E]) -> Option<SupersBitmap> {
        match entries {
            [] => Some(SupersBitmap::EMPTY),
            [only] => Some(SupersBitmap::singleton(
                u32::from(only.hash_slot()) & self.shape.mask(),
            )),
            _ if entries.len() >= self.shape.size() as usize => Some(SupersBitmap::FULL),
            _ => None,
        }
    }

    /// Robin Hood hash `entries` into a fresh scratch table.
    pub(crate) fn hash_into_scratch<E>(&self, entries: &[E]) -> (Vec<Option<E>>, SupersBitmap)
    where
        E: HashedSuper + Clone,
    {
        let mut scratch: Vec<Option<E>> = vec![None; self.shape.size() as usize];
        let mut bitmap = SupersBitmap::EMPTY;
        for entry in entries {
            self.hash_insert(entry.clone(), &mut scratch, &mut bitmap);
        }
        (scratch, bitmap)
    }

    fn record_build<E: HashedSuper>(&self, table: &SecondarySupers<E>) {
        let counters = counters();
        counters.record_table_built();
        let bitmap = table.bitmap();
        if bitmap.is_empty() {
            counters.record_empty_table();
            tracing::trace!("secondary supers: empty table");
        } else if bitmap.is_full() {
            counters.record_full_table();
            tracing::debug!(
                len = table.len(),
                "secondary supers: table full, lookups will scan linearly"
            );
        } else if table.len() == 1 {
            counters.record_singleton_table();
            tracing::trace!(bitmap = %format_args!("{bitmap:#018x}"), "secondary supers: singleton table");
        } else {
            let worst = positive_lookup_stats(table).map_or(0, |s| s.worst);
            tracing::debug!(
                len = table.len(),
                bitmap = %format_args!("{bitmap:#018x}"),
                worst_probe = worst,
                "secondary supers: hashed table built"
            );
        }
    }
}
