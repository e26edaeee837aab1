//! Secondary-supers diagnostics.
//!
//! Nothing here is on the lookup fast path. Probe-distance statistics let
//! tests and operators spot clustering; [`SupersCounters`] records how often
//! the slow paths run.

use crate::bitmap::SupersBitmap;
use crate::bits;
use crate::lookup::SecondarySupers;
use crate::table::HashedSuper;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Probe Distances
// =============================================================================

/// Dense index of the slot `entry` hashes to: the number of occupied slots
/// below its home slot.
#[inline]
pub fn compute_home_slot<E: HashedSuper + ?Sized>(entry: &E, bitmap: SupersBitmap) -> usize {
    bits::count_below(bitmap.raw(), u32::from(entry.hash_slot())) as usize
}

/// Summary of a set of probe distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupStats {
    /// Number of lookups measured.
    pub samples: u32,
    /// Shortest distance.
    pub best: u32,
    /// Longest distance.
    pub worst: u32,
    /// Sum of all distances.
    pub total: u64,
}

impl LookupStats {
    /// Summarize `distances`, or `None` if there are none.
    pub fn from_distances(distances: impl IntoIterator<Item = u32>) -> Option<Self> {
        distances.into_iter().fold(None, |acc, d| {
            Some(match acc {
                None => Self {
                    samples: 1,
                    best: d,
                    worst: d,
                    total: u64::from(d),
                },
                Some(s) => Self {
                    samples: s.samples + 1,
                    best: s.best.min(d),
                    worst: s.worst.max(d),
                    total: s.total + u64::from(d),
                },
            })
        })
    }

    /// Mean distance.
    pub fn average(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.total as f64 / f64::from(self.samples)
    }
}

impl fmt::Display for LookupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "best = {}, worst = {}, average = {:.2}",
            self.best,
            self.worst,
            self.average()
        )
    }
}

/// How far each present entry sits from its home slot.
///
/// `None` for empty and unindexed tables.
pub fn positive_lookup_stats<E: HashedSuper>(table: &SecondarySupers<E>) -> Option<LookupStats> {
    let bitmap = table.bitmap();
    if bitmap.is_empty() || bitmap.is_full() {
        return None;
    }
    let len = table.len();
    LookupStats::from_distances(table.iter().enumerate().map(|(index, entry)| {
        let home = compute_home_slot(entry, bitmap);
        ((index + len - home) % len) as u32
    }))
}

/// How many occupied slots a miss starting at each slot walks past.
///
/// `None` for empty and unindexed tables.
pub fn negative_lookup_stats<E>(table: &SecondarySupers<E>) -> Option<LookupStats> {
    let bitmap = table.bitmap();
    if bitmap.is_empty() || bitmap.is_full() {
        return None;
    }
    let width = table.shape().size();
    LookupStats::from_distances(
        (0..width).map(|slot| bits::distance_to_nearest_zero(bitmap.raw(), slot, width)),
    )
}

// =============================================================================
// Table Dump
// =============================================================================

/// Length, bitmap and probe statistics of one table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableStats {
    /// Number of entries.
    pub len: usize,
    /// Occupancy bitmap.
    pub bitmap: SupersBitmap,
    /// Probe distances of present entries.
    pub positive: Option<LookupStats>,
    /// Probe distances of misses.
    pub negative: Option<LookupStats>,
}

impl TableStats {
    /// Collect statistics for `table`.
    pub fn of<E: HashedSuper>(table: &SecondarySupers<E>) -> Self {
        Self {
            len: table.len(),
            bitmap: table.bitmap(),
            positive: positive_lookup_stats(table),
            negative: negative_lookup_stats(table),
        }
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} elements; bitmap: {:#018x}", self.len, self.bitmap)?;
        if let Some(positive) = &self.positive {
            writeln!(f, "  positive lookup: {positive}")?;
        }
        if let Some(negative) = &self.negative {
            writeln!(f, "  negative lookup: {negative}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Slow-Path Counters
// =============================================================================

/// Counts of table builds and slow lookups.
///
/// All updates are `Relaxed`; the numbers are diagnostic only.
#[derive(Debug)]
pub struct SupersCounters {
    /// Tables built through the builder.
    pub tables_built: AtomicU64,
    /// Builds that produced the empty sentinel.
    pub empty_tables: AtomicU64,
    /// Builds answered by the singleton shortcut.
    pub singleton_tables: AtomicU64,
    /// Builds that gave up and produced the full sentinel.
    pub full_tables: AtomicU64,
    /// Hashed lookups that missed the home slot and probed further.
    pub fallback_probes: AtomicU64,
    /// Linear scans of a secondary array.
    pub linear_scans: AtomicU64,
    /// Legacy lookups answered by the one-element cache.
    pub cache_hits: AtomicU64,
}

impl SupersCounters {
    /// Create zeroed counters.
    pub const fn new() -> Self {
        Self {
            tables_built: AtomicU64::new(0),
            empty_tables: AtomicU64::new(0),
            singleton_tables: AtomicU64::new(0),
            full_tables: AtomicU64::new(0),
            fallback_probes: AtomicU64::new(0),
            linear_scans: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_table_built(&self) {
        self.tables_built.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_empty_table(&self) {
        self.empty_tables.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_singleton_table(&self) {
        self.singleton_tables.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_full_table(&self) {
        self.full_tables.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_fallback_probe(&self) {
        self.fallback_probes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_linear_scan(&self) {
        self.linear_scans.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            tables_built: self.tables_built.load(Ordering::Relaxed),
            empty_tables: self.empty_tables.load(Ordering::Relaxed),
            singleton_tables: self.singleton_tables.load(Ordering::Relaxed),
            full_tables: self.full_tables.load(Ordering::Relaxed),
            fallback_probes: self.fallback_probes.load(Ordering::Relaxed),
            linear_scans: self.linear_scans.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.tables_built.store(0, Ordering::Relaxed);
        self.empty_tables.store(0, Ordering::Relaxed);
        self.singleton_tables.store(0, Ordering::Relaxed);
        self.full_tables.store(0, Ordering::Relaxed);
        self.fallback_probes.store(0, Ordering::Relaxed);
        self.linear_scans.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
    }

    /// Print a summary to stderr.
    pub fn print_summary(&self) {
        eprint!("{}", self.snapshot());
    }
}

impl Default for SupersCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`SupersCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountersSnapshot {
    /// Tables built through the builder.
    pub tables_built: u64,
    /// Builds that produced the empty sentinel.
    pub empty_tables: u64,
    /// Builds answered by the singleton shortcut.
    pub singleton_tables: u64,
    /// Builds that produced the full sentinel.
    pub full_tables: u64,
    /// Hashed lookups that probed past the home slot.
    pub fallback_probes: u64,
    /// Linear scans.
    pub linear_scans: u64,
    /// Legacy cache hits.
    pub cache_hits: u64,
}

impl fmt::Display for CountersSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Secondary Supers ===")?;
        writeln!(
            f,
            "Tables: {} built ({} empty, {} singleton, {} full)",
            self.tables_built, self.empty_tables, self.singleton_tables, self.full_tables
        )?;
        writeln!(
            f,
            "Lookups: {} fallback probes, {} linear scans, {} cache hits",
            self.fallback_probes, self.linear_scans, self.cache_hits
        )
    }
}

static COUNTERS: SupersCounters = SupersCounters::new();

/// Process-wide counters.
#[inline]
pub fn counters() -> &'static SupersCounters {
    &COUNTERS
}
