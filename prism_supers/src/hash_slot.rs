//! Hash-slot assignment.
//!
//! Each type gets a home slot in `[0, table_size)` computed once from its
//! name. The slot must be reproducible across runs, so it is derived from the
//! name's content hash rather than from an address or identity hash.

use crate::bitmap::TableShape;
use crate::config::{ConfigError, SupersConfig};
use crate::symbol::string_hash;

/// Fibonacci hashing multiplier, `2^32 / phi` rounded to an odd integer.
pub const FIBONACCI_MULTIPLIER: u32 = 2_654_435_769;

/// Number of buckets used by the collision stress mode.
const STRESS_BUCKETS: u32 = 3;

/// Computes home slots for type names.
#[derive(Debug, Clone)]
pub struct HashSlotter {
    shape: TableShape,
    stress_collisions: bool,
    cloneable_marker: Box<str>,
    serializable_marker: Box<str>,
}

impl HashSlotter {
    /// Create a slotter for the given configuration.
    pub fn new(config: &SupersConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            shape: config.table_shape()?,
            stress_collisions: config.stress_collisions,
            cloneable_marker: config.cloneable_marker.as_str().into(),
            serializable_marker: config.serializable_marker.as_str().into(),
        })
    }

    /// Table geometry the slots are computed for.
    #[inline]
    pub fn shape(&self) -> TableShape {
        self.shape
    }

    /// Compute the home slot for `name`.
    ///
    /// The two marker supertypes that nearly every type implements are pinned
    /// to opposite halves of the table (slot 0 and `size / 2`) so they never
    /// collide with each other. Every other name goes through a multiplicative
    /// mix and keeps the top `log2(size)` bits of the 32-bit product.
    ///
    /// Stress mode squeezes general names into three buckets; the markers
    /// stay pinned.
    pub fn compute_hash_slot(&self, name: &str) -> u8 {
        let size = self.shape.size();
        let hash = if name == &*self.cloneable_marker {
            0
        } else if name == &*self.serializable_marker {
            size / 2
        } else {
            let mixed = string_hash(name.as_bytes()).wrapping_mul(FIBONACCI_MULTIPLIER);
            let hash = mixed >> (u32::BITS - self.shape.bits());
            if self.stress_collisions {
                (hash % STRESS_BUCKETS) * (size / STRESS_BUCKETS)
            } else {
                hash
            }
        };

        (hash & self.shape.mask()) as u8
    }
}

impl Default for HashSlotter {
    fn default() -> Self {
        match Self::new(&SupersConfig::default()) {
            Ok(slotter) => slotter,
            Err(err) => unreachable!("default configuration is valid: {err}"),
        }
    }
}
