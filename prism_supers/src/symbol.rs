//! Interned type names.
//!
//! A `Symbol` is a refcounted immutable string. Interning through a
//! [`SymbolTable`] guarantees that equal names share one allocation, so
//! equality is usually a pointer compare.

use dashmap::DashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

// =============================================================================
// Symbol
// =============================================================================

/// An interned, immutable type name.
#[derive(Clone)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Get the name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the raw name bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Check whether two symbols share the same interned allocation.
    #[inline]
    pub fn ptr_eq(a: &Symbol, b: &Symbol) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Stable content hash of this name.
    #[inline]
    pub fn content_hash(&self) -> u32 {
        string_hash(self.as_bytes())
    }
}

impl PartialEq for Symbol {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Symbol::ptr_eq(self, other) || *self.0 == *other.0
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl std::borrow::Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// String Hash
// =============================================================================

/// Polynomial string hash with multiplier 31.
///
/// Depends only on the bytes, never on addresses, so the result is identical
/// from run to run. Hash slots derived from it can be baked into snapshots.
#[inline]
pub fn string_hash(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |h, &b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

// =============================================================================
// Symbol Table
// =============================================================================

/// Thread-safe interner for type names.
#[derive(Default)]
pub struct SymbolTable {
    symbols: DashMap<Box<str>, Symbol>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            symbols: DashMap::new(),
        }
    }

    /// Intern `name`, returning the shared symbol.
    pub fn intern(&self, name: &str) -> Symbol {
        if let Some(symbol) = self.symbols.get(name) {
            return symbol.value().clone();
        }
        self.symbols
            .entry(Box::from(name))
            .or_insert_with(|| Symbol(Arc::from(name)))
            .value()
            .clone()
    }

    /// Look up a name without interning it.
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).map(|s| s.value().clone())
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Check if no names are interned.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

static SYMBOLS: OnceLock<SymbolTable> = OnceLock::new();

/// Get the process-wide symbol table.
pub fn symbol_table() -> &'static SymbolTable {
    SYMBOLS.get_or_init(SymbolTable::new)
}

/// Intern `name` in the process-wide symbol table.
#[inline]
pub fn intern(name: &str) -> Symbol {
    symbol_table().intern(name)
}
