//! Bit-manipulation primitives for occupancy bitmaps.
//!
//! The secondary-supers bitmap is a single `u64`, but the logical table may be
//! narrower than 64 slots. Rotations are therefore performed within an explicit
//! `width`; for the default width of 64 they lower to a single `ror`.

/// Number of bits in a bitmap word.
pub const WORD_BITS: u32 = u64::BITS;

/// Count the set bits of `bits`.
#[inline(always)]
pub const fn population_count(bits: u64) -> u32 {
    bits.count_ones()
}

/// Mask covering the low `width` bits.
#[inline(always)]
pub const fn width_mask(width: u32) -> u64 {
    if width >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Rotate the low `width` bits of `bits` right by `n` positions.
///
/// Bits at or above `width` are discarded.
#[inline]
pub const fn rotate_right(bits: u64, n: u32, width: u32) -> u64 {
    debug_assert!(width > 0 && width <= WORD_BITS);
    if width == WORD_BITS {
        return bits.rotate_right(n);
    }
    let mask = width_mask(width);
    let bits = bits & mask;
    let n = n % width;
    if n == 0 {
        return bits;
    }
    ((bits >> n) | (bits << (width - n))) & mask
}

/// Number of set bits strictly below `slot`.
///
/// Shifting left by `WORD_BITS - slot` drops everything at or above `slot`;
/// slot 0 is handled separately because a 64-bit shift would overflow.
#[inline]
pub const fn count_below(bits: u64, slot: u32) -> u32 {
    if slot == 0 {
        0
    } else {
        population_count(bits << (WORD_BITS - slot))
    }
}

/// Number of consecutive set bits starting at `slot`, walking upwards and
/// wrapping within `width`.
///
/// This is the number of probes a negative lookup starting at `slot` performs
/// before it reaches an empty slot. Returns `width` when every bit is set.
#[inline]
pub const fn distance_to_nearest_zero(bits: u64, slot: u32, width: u32) -> u32 {
    let run = (!rotate_right(bits, slot, width)).trailing_zeros();
    if run > width { width } else { run }
}
