//! Occupancy bitmap and table geometry for secondary-supers tables.
//!
//! Bit `i` of a [`SupersBitmap`] is set iff logical slot `i` of the hashed
//! table holds an entry. Because the bitmap is exact, a clear bit is a precise
//! negative answer for a lookup whose home slot is `i`.
//!
//! Two values are reserved:
//! - [`SupersBitmap::EMPTY`] (`0`): no secondary supers.
//! - [`SupersBitmap::FULL`] (all ones): the table is not indexed and lookups
//!   fall back to a linear scan.

use crate::bits::{self, WORD_BITS};
use std::fmt;

// =============================================================================
// Table Shape
// =============================================================================

/// Geometry of a hashed secondary-supers table.
///
/// The size is always a power of two between [`TableShape::MIN_SIZE`] and 64,
/// so masking replaces modulo and the whole occupancy map fits in one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableShape {
    /// log2 of the table size.
    bits: u8,
}

impl TableShape {
    /// The standard 64-slot table.
    pub const DEFAULT: Self = Self { bits: 6 };

    /// Smallest supported table.
    pub const MIN_SIZE: usize = 4;

    /// Largest supported table (one bitmap word).
    pub const MAX_SIZE: usize = WORD_BITS as usize;

    /// Create a shape for `size` slots, or `None` if the size is unsupported.
    pub const fn from_size(size: usize) -> Option<Self> {
        if size < Self::MIN_SIZE || size > Self::MAX_SIZE || !size.is_power_of_two() {
            return None;
        }
        Some(Self {
            bits: size.trailing_zeros() as u8,
        })
    }

    /// Number of slots.
    #[inline(always)]
    pub const fn size(self) -> u32 {
        1 << self.bits
    }

    /// Slot index mask (`size - 1`).
    #[inline(always)]
    pub const fn mask(self) -> u32 {
        self.size() - 1
    }

    /// log2 of the table size.
    #[inline(always)]
    pub const fn bits(self) -> u32 {
        self.bits as u32
    }

    /// Highest dense length that may still be probed through the hash table.
    ///
    /// Longer tables keep fewer than two empty slots and are searched
    /// linearly.
    #[inline(always)]
    pub const fn probe_limit(self) -> usize {
        (self.size() - 2) as usize
    }
}

impl Default for TableShape {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// =============================================================================
// Supers Bitmap
// =============================================================================

/// Occupancy bitmap of a secondary-supers table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SupersBitmap(u64);

impl SupersBitmap {
    /// No secondary supers.
    pub const EMPTY: Self = Self(0);

    /// Too many secondary supers to index; use linear search.
    pub const FULL: Self = Self(u64::MAX);

    /// Create a bitmap from raw bits.
    #[inline(always)]
    pub const fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    /// Bitmap with only `slot` occupied.
    #[inline(always)]
    pub const fn singleton(slot: u32) -> Self {
        Self(1u64 << slot)
    }

    /// Raw bits.
    #[inline(always)]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check for the empty sentinel.
    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.0 == Self::EMPTY.0
    }

    /// Check for the full sentinel.
    #[inline(always)]
    pub const fn is_full(self) -> bool {
        self.0 == Self::FULL.0
    }

    /// Check whether logical slot `slot` is occupied.
    #[inline(always)]
    pub const fn contains_slot(self, slot: u32) -> bool {
        (self.0 >> slot) & 1 != 0
    }

    /// Mark `slot` as occupied.
    #[inline(always)]
    pub fn insert(&mut self, slot: u32) {
        self.0 |= 1u64 << slot;
    }

    /// Number of occupied slots.
    #[inline(always)]
    pub const fn len(self) -> u32 {
        bits::population_count(self.0)
    }

    /// Check whether every slot of `shape` is occupied.
    #[inline]
    pub const fn fills(self, shape: TableShape) -> bool {
        let mask = bits::width_mask(shape.size());
        self.0 & mask == mask
    }

    /// Iterate over occupied slots in increasing order.
    pub fn slots(self) -> impl Iterator<Item = u32> {
        let mut rest = self.0;
        std::iter::from_fn(move || {
            if rest == 0 {
                return None;
            }
            let slot = rest.trailing_zeros();
            rest &= rest - 1;
            Some(slot)
        })
    }
}

impl fmt::Debug for SupersBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::EMPTY => f.write_str("SupersBitmap(EMPTY)"),
            Self::FULL => f.write_str("SupersBitmap(FULL)"),
            Self(bits) => write!(f, "SupersBitmap({bits:#018x})"),
        }
    }
}

impl fmt::LowerHex for SupersBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_from_size() {
        assert_eq!(TableShape::from_size(64), Some(TableShape::DEFAULT));
        assert_eq!(TableShape::from_size(8).map(|s| s.size()), Some(8));
        assert!(TableShape::from_size(2).is_none());
        assert!(TableShape::from_size(48).is_none());
        assert!(TableShape::from_size(128).is_none());
    }

    #[test]
    fn test_shape_geometry() {
        let shape = TableShape::DEFAULT;
        assert_eq!(shape.size(), 64);
        assert_eq!(shape.mask(), 63);
        assert_eq!(shape.bits(), 6);
        assert_eq!(shape.probe_limit(), 62);
    }

    #[test]
    fn test_sentinels() {
        assert!(SupersBitmap::EMPTY.is_empty());
        assert!(SupersBitmap::FULL.is_full());
        assert_eq!(SupersBitmap::FULL.len(), 64);
        assert_eq!(SupersBitmap::default(), SupersBitmap::EMPTY);
    }

    #[test]
    fn test_insert_and_contains() {
        let mut bitmap = SupersBitmap::EMPTY;
        bitmap.insert(5);
        bitmap.insert(63);
        assert!(bitmap.contains_slot(5));
        assert!(bitmap.contains_slot(63));
        assert!(!bitmap.contains_slot(6));
        assert_eq!(bitmap.len(), 2);
        assert_eq!(bitmap.slots().collect::<Vec<_>>(), vec![5, 63]);
    }

    #[test]
    fn test_fills_respects_shape() {
        let small = TableShape::from_size(8).unwrap();
        assert!(SupersBitmap::from_raw(0xff).fills(small));
        assert!(!SupersBitmap::from_raw(0x7f).fills(small));
        assert!(!SupersBitmap::from_raw(0xff).fills(TableShape::DEFAULT));
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", SupersBitmap::EMPTY), "SupersBitmap(EMPTY)");
        assert_eq!(
            format!("{:?}", SupersBitmap::singleton(4)),
            "SupersBitmap(0x0000000000000010)"
        );
    }
}
