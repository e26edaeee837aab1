//! Primary supertype chains.
//!
//! Every class records its single-inheritance ancestors, root first, in a
//! fixed-capacity inline array. A class found at depth `d` of that array is
//! at depth `d` of every subclass too, so checking against it is one indexed
//! compare. Classes deeper than the limit, and all interfaces, cannot be
//! checked this way and are placed in secondary tables instead.
//!
//! ```text
//! Object ─► Number ─► Integer          depth 0, 1, 2
//!
//! Integer.primary = [Object, Number, Integer]
//! Integer is-a Number  <=>  Integer.primary[1] == Number
//! ```

use crate::klass::KlassId;
use smallvec::SmallVec;

/// Maximum length of a primary chain.
pub const PRIMARY_SUPER_LIMIT: usize = 8;

/// Inline storage for a primary chain.
pub type PrimarySupers = SmallVec<[KlassId; PRIMARY_SUPER_LIMIT]>;

/// How subtype checks against a type are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuperCheck {
    /// The type sits at `depth` of the primary chain of every subtype.
    Primary {
        /// Index into the primary chain.
        depth: u8,
    },
    /// The type has to be searched in secondary tables.
    Secondary,
}

impl SuperCheck {
    /// Check for a primary check.
    #[inline]
    pub const fn is_primary(self) -> bool {
        matches!(self, Self::Primary { .. })
    }

    /// Primary depth, if any.
    #[inline]
    pub const fn depth(self) -> Option<usize> {
        match self {
            Self::Primary { depth } => Some(depth as usize),
            Self::Secondary => None,
        }
    }
}

/// Ancestor ids from the root down to the type itself, truncated at the
/// primary limit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrimaryChain {
    supers: PrimarySupers,
}

impl PrimaryChain {
    /// Chain of the root class.
    pub fn root(id: KlassId) -> (Self, SuperCheck) {
        let mut supers = PrimarySupers::new();
        supers.push(id);
        (Self { supers }, SuperCheck::Primary { depth: 0 })
    }

    /// Chain of a type whose superclass has chain `self`.
    ///
    /// The parent chain is copied up to `limit` entries. The new type is
    /// appended when it can be primary and there is room; otherwise it is
    /// checked through secondary tables.
    pub fn extend(&self, id: KlassId, can_be_primary: bool, limit: usize) -> (Self, SuperCheck) {
        debug_assert!((1..=PRIMARY_SUPER_LIMIT).contains(&limit));
        let mut supers: PrimarySupers = self.supers.iter().copied().take(limit).collect();

        if can_be_primary && supers.len() < limit {
            let depth = supers.len() as u8;
            supers.push(id);
            (Self { supers }, SuperCheck::Primary { depth })
        } else {
            (Self { supers }, SuperCheck::Secondary)
        }
    }

    /// Ancestor at `depth`.
    #[inline]
    pub fn get(&self, depth: usize) -> Option<KlassId> {
        self.supers.get(depth).copied()
    }

    /// Answer a subtype check against `id` from the primary chain alone.
    ///
    /// Returns `None` when `check` is secondary and the chain cannot decide.
    #[inline]
    pub fn check(&self, check: SuperCheck, id: KlassId) -> Option<bool> {
        check.depth().map(|depth| self.get(depth) == Some(id))
    }

    /// Ancestor ids, root first.
    #[inline]
    pub fn as_slice(&self) -> &[KlassId] {
        &self.supers
    }

    /// Number of ancestors recorded.
    #[inline]
    pub fn len(&self) -> usize {
        self.supers.len()
    }

    /// Check whether the chain is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.supers.is_empty()
    }

    /// Check whether the chain ever left inline storage.
    #[inline]
    pub fn spilled(&self) -> bool {
        self.supers.spilled()
    }
}
