//! Prism Subtype Checks
//!
//! Constant-time "is `S` a subtype of `T`?" for a single-inheritance class
//! hierarchy with multiple interface inheritance.
//!
//! # Architecture
//!
//! Every type carries two structures:
//!
//! - **Primary chain**: its superclass lineage, root first, in an inline
//!   array of up to eight ids. A class at depth `d` is checked with one
//!   indexed compare.
//!
//! - **Secondary supers**: interfaces, plus ancestors too deep for the
//!   primary chain, stored as a Robin Hood hash table compressed into a
//!   dense array and a 64-bit occupancy bitmap. A clear bit is an exact
//!   negative answer; a hit is usually found at the home slot.
//!
//! ```text
//! bitmap  ..0 1 1 1 0..       slots 5, 6, 7 occupied
//!                 │
//! dense   [B, A, C]           index = popcount(bitmap below slot)
//! ```
//!
//! Tables with `table_size` or more entries are not indexed and carry the
//! full sentinel; lookups against them scan linearly.
//!
//! # Usage
//!
//! ```
//! use prism_supers::{KlassRegistry, SupersConfig};
//!
//! let registry = KlassRegistry::new(SupersConfig::default()).unwrap();
//! let runnable = registry.define_interface("Runnable", &[]).unwrap();
//! let thread = registry.define_class("Thread", None, &[runnable.clone()]).unwrap();
//!
//! assert!(thread.is_subtype_of(&runnable));
//! assert!(thread.is_subtype_of(registry.root()));
//! assert!(!runnable.is_subtype_of(&thread));
//! ```
//!
//! # Concurrency
//!
//! Definitions are serialized per registry. Published tables are immutable
//! and swapped atomically on redefinition, so lookups never lock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitmap;
pub mod bits;
pub mod config;
pub mod error;
pub mod hash_slot;
pub mod klass;
pub mod lookup;
pub mod primary;
pub mod registry;
pub mod stats;
pub mod symbol;
pub mod table;

// Re-exports for convenient access
pub use bitmap::{SupersBitmap, TableShape};
pub use config::{ConfigError, SupersConfig};
pub use error::{LinkError, verification_failure};
pub use hash_slot::HashSlotter;
pub use klass::{Klass, KlassFlags, KlassId, KlassKind, KlassRef, LookupPolicy, Supertypes};
pub use lookup::SecondarySupers;
pub use primary::{PRIMARY_SUPER_LIMIT, PrimaryChain, SuperCheck};
pub use registry::KlassRegistry;
pub use stats::{
    CountersSnapshot, LookupStats, SupersCounters, TableStats, compute_home_slot, counters,
    negative_lookup_stats, positive_lookup_stats,
};
pub use symbol::{Symbol, SymbolTable, intern, string_hash, symbol_table};
pub use table::{HashedSuper, SupersTableBuilder};
