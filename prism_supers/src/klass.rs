//! Type descriptors.
//!
//! A [`Klass`] is the runtime metadata for one class or interface. It carries
//! everything a subtype check needs:
//!
//! ```text
//! Klass
//! ├── name: Symbol           interned, hashed once into hash_slot
//! ├── id: KlassId            registry-unique, Robin Hood tie key
//! ├── primary: PrimaryChain  root .. self, at most 8 entries inline
//! ├── super_check            Primary { depth } or Secondary
//! └── supertypes: ArcSwap<Supertypes>
//!     ├── local_interfaces
//!     ├── transitive_interfaces
//!     └── secondary: SecondarySupers<KlassRef>   (dense array + bitmap)
//! ```
//!
//! Supertypes are published as one immutable snapshot. Redefinition builds a
//! new snapshot and swaps it in; readers holding the old one keep a
//! consistent array/bitmap pair.

use crate::error::verification_failure;
use crate::lookup::SecondarySupers;
use crate::primary::{PrimaryChain, SuperCheck};
use crate::stats::{TableStats, compute_home_slot, counters};
use crate::symbol::Symbol;
use crate::table::{HashedSuper, SupersTableBuilder};
use arc_swap::{ArcSwap, Guard};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Shared handle to a type descriptor.
pub type KlassRef = Arc<Klass>;

// =============================================================================
// Identity
// =============================================================================

/// Registry-unique type identifier, allocated in definition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KlassId(u32);

impl KlassId {
    /// Sentinel meaning "no type" in the legacy lookup cache.
    const NONE: u32 = u32::MAX;

    /// Create an id from its raw value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for KlassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a type is a class or an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KlassKind {
    /// Single-inheritance class.
    Class,
    /// Interface; never primary.
    Interface,
}

bitflags::bitflags! {
    /// Facts about a type fixed when it is linked.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KlassFlags: u32 {
        /// The registry's root class.
        const ROOT = 1 << 0;
        /// A class too deep for the primary chain.
        const PRIMARY_OVERFLOW = 1 << 1;
        /// Has at least one overflowed ancestor in its secondary supers.
        const HAS_OVERFLOW_SUPERS = 1 << 2;
    }
}

// =============================================================================
// Lookup Policy
// =============================================================================

/// How secondary lookups are performed for a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupPolicy {
    /// Use the hashed table; otherwise scan linearly with a one-element cache.
    pub use_table: bool,
    /// Cross-check hashed answers against a linear scan.
    pub verify: bool,
}

impl Default for LookupPolicy {
    fn default() -> Self {
        Self {
            use_table: true,
            verify: cfg!(debug_assertions),
        }
    }
}

// =============================================================================
// Supertypes Snapshot
// =============================================================================

/// Supertypes of a type that are not on its primary chain.
#[derive(Debug, Clone)]
pub struct Supertypes {
    local_interfaces: Box<[KlassRef]>,
    transitive_interfaces: Box<[KlassRef]>,
    secondary: SecondarySupers<KlassRef>,
}

impl Supertypes {
    pub(crate) fn new(
        local_interfaces: Box<[KlassRef]>,
        transitive_interfaces: Box<[KlassRef]>,
        secondary: SecondarySupers<KlassRef>,
    ) -> Self {
        Self {
            local_interfaces,
            transitive_interfaces,
            secondary,
        }
    }

    /// Interfaces named directly in the definition.
    #[inline]
    pub fn local_interfaces(&self) -> &[KlassRef] {
        &self.local_interfaces
    }

    /// Every interface implemented, directly or through a supertype.
    #[inline]
    pub fn transitive_interfaces(&self) -> &[KlassRef] {
        &self.transitive_interfaces
    }

    /// The hashed secondary-supers table.
    #[inline]
    pub fn secondary(&self) -> &SecondarySupers<KlassRef> {
        &self.secondary
    }
}

// =============================================================================
// Klass
// =============================================================================

/// Construction parameters, filled in by the registry.
pub(crate) struct KlassInit {
    pub name: Symbol,
    pub id: KlassId,
    pub registry: u32,
    pub kind: KlassKind,
    pub hash_slot: u8,
    pub super_klass: Option<KlassRef>,
    pub primary: PrimaryChain,
    pub super_check: SuperCheck,
    pub flags: KlassFlags,
    pub policy: LookupPolicy,
    pub supertypes: Supertypes,
}

/// Runtime metadata for one class or interface.
///
/// Created by [`KlassRegistry`](crate::KlassRegistry). Subtype checks are
/// only meaningful between types of the same registry.
pub struct Klass {
    name: Symbol,
    id: KlassId,
    registry: u32,
    kind: KlassKind,
    hash_slot: u8,
    super_klass: Option<KlassRef>,
    primary: PrimaryChain,
    super_check: SuperCheck,
    flags: KlassFlags,
    policy: LookupPolicy,
    supertypes: ArcSwap<Supertypes>,
    /// Id of the last secondary hit in linear mode, or `KlassId::NONE`.
    secondary_super_cache: AtomicU32,
    redefinitions: AtomicU32,
}

impl Klass {
    pub(crate) fn new(init: KlassInit) -> Self {
        Self {
            name: init.name,
            id: init.id,
            registry: init.registry,
            kind: init.kind,
            hash_slot: init.hash_slot,
            super_klass: init.super_klass,
            primary: init.primary,
            super_check: init.super_check,
            flags: init.flags,
            policy: init.policy,
            supertypes: ArcSwap::from_pointee(init.supertypes),
            secondary_super_cache: AtomicU32::new(KlassId::NONE),
            redefinitions: AtomicU32::new(0),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Type name.
    #[inline]
    pub fn name(&self) -> &Symbol {
        &self.name
    }

    /// Registry-unique id.
    #[inline]
    pub fn id(&self) -> KlassId {
        self.id
    }

    #[inline]
    pub(crate) fn registry(&self) -> u32 {
        self.registry
    }

    /// Class or interface.
    #[inline]
    pub fn kind(&self) -> KlassKind {
        self.kind
    }

    /// Check whether this is an interface.
    #[inline]
    pub fn is_interface(&self) -> bool {
        self.kind == KlassKind::Interface
    }

    /// Home slot in secondary-supers tables.
    #[inline]
    pub fn hash_slot(&self) -> u8 {
        self.hash_slot
    }

    /// Direct superclass. `None` only for the root.
    #[inline]
    pub fn super_klass(&self) -> Option<&KlassRef> {
        self.super_klass.as_ref()
    }

    /// Primary chain, root first.
    #[inline]
    pub fn primary_supers(&self) -> &PrimaryChain {
        &self.primary
    }

    /// How checks against this type are answered.
    #[inline]
    pub fn super_check(&self) -> SuperCheck {
        self.super_check
    }

    /// Link-time flags.
    #[inline]
    pub fn flags(&self) -> KlassFlags {
        self.flags
    }

    /// Lookup policy inherited from the registry.
    #[inline]
    pub fn lookup_policy(&self) -> LookupPolicy {
        self.policy
    }

    /// Current supertypes snapshot.
    pub fn supertypes(&self) -> Arc<Supertypes> {
        self.supertypes.load_full()
    }

    /// Last secondary hit remembered by linear-mode lookups.
    pub fn secondary_super_cache(&self) -> Option<KlassId> {
        match self.secondary_super_cache.load(Ordering::Acquire) {
            KlassId::NONE => None,
            raw => Some(KlassId(raw)),
        }
    }

    /// Number of times the supertypes have been replaced.
    pub fn redefinition_count(&self) -> u32 {
        self.redefinitions.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Subtype Checks
    // =========================================================================

    /// Check whether `self` is `k` or a subtype of `k`.
    #[inline]
    pub fn is_subtype_of(&self, k: &Klass) -> bool {
        match self.primary.check(k.super_check, k.id) {
            Some(answer) => answer,
            None => std::ptr::eq(self, k) || self.search_secondary_supers(k),
        }
    }

    /// Check whether `k` is one of this type's secondary supers.
    pub fn search_secondary_supers(&self, k: &Klass) -> bool {
        let supertypes = self.load();
        let secondary = supertypes.secondary();

        if !self.policy.use_table {
            return self.linear_lookup_cached(secondary, k);
        }

        let found = secondary.contains(k);
        if self.policy.verify {
            let expected = secondary.iter().any(|entry| Klass::same_super(entry, k));
            if found != expected {
                verification_failure(format_args!(
                    "lookup of {} in secondary supers of {} returned {found}, linear scan says {expected}; \
                     bitmap {:?}, entries {:?}",
                    k.name,
                    self.name,
                    secondary.bitmap(),
                    secondary.entries(),
                ));
            }
        }
        found
    }

    fn linear_lookup_cached(&self, secondary: &SecondarySupers<KlassRef>, k: &Klass) -> bool {
        if self.secondary_super_cache.load(Ordering::Acquire) == k.id.raw() {
            counters().record_cache_hit();
            return true;
        }
        if secondary.linear_search(k) {
            self.secondary_super_cache.store(k.id.raw(), Ordering::Release);
            return true;
        }
        false
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Recompute the bitmap from the published array and compare it with the
    /// published bitmap. Fatal on mismatch.
    pub fn verify_secondary_supers(&self) {
        let supertypes = self.load();
        let secondary = supertypes.secondary();
        let builder = SupersTableBuilder::with_shape(secondary.shape());
        let computed = builder.compute_bitmap(secondary.entries());
        if computed != secondary.bitmap() {
            verification_failure(format_args!(
                "secondary supers of {} have bitmap {:?}, recomputed {computed:?}",
                self.name,
                secondary.bitmap(),
            ));
        }
    }

    /// Write the secondary-supers table with its probe statistics.
    pub fn print_secondary_supers(&self, out: &mut impl fmt::Write) -> fmt::Result {
        let supertypes = self.load();
        let secondary = supertypes.secondary();
        let bitmap = secondary.bitmap();

        writeln!(out, "Secondary supers of {}:", self.name)?;
        write!(out, "{}", TableStats::of(secondary))?;
        let indexed = !bitmap.is_empty() && !bitmap.is_full();
        for (index, entry) in secondary.iter().enumerate() {
            write!(out, "  [{index}] {} (slot {}", entry.name, entry.hash_slot)?;
            if indexed {
                write!(out, ", home {}", compute_home_slot(entry, bitmap))?;
            }
            writeln!(out, ")")?;
        }
        Ok(())
    }

    // =========================================================================
    // Publication
    // =========================================================================

    #[inline]
    fn load(&self) -> Guard<Arc<Supertypes>> {
        self.supertypes.load()
    }

    /// Publish a new supertypes snapshot.
    pub(crate) fn replace_supertypes(&self, supertypes: Supertypes) {
        self.supertypes.store(Arc::new(supertypes));
        self.secondary_super_cache
            .store(KlassId::NONE, Ordering::Release);
        self.redefinitions.fetch_add(1, Ordering::Relaxed);
    }
}

impl HashedSuper for Klass {
    #[inline]
    fn hash_slot(&self) -> u8 {
        self.hash_slot
    }

    #[inline]
    fn tie_key(&self) -> u64 {
        u64::from(self.id.raw())
    }

    #[inline]
    fn same_super(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl PartialEq for Klass {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Klass {}

impl fmt::Debug for Klass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Klass")
            .field("name", &self.name.as_str())
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("hash_slot", &self.hash_slot)
            .field("super_check", &self.super_check)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Klass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}
