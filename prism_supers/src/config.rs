//! Subtype-check configuration.
//!
//! Every knob that the table builder, hash-slot function and lookup paths
//! depend on is carried here as an explicit value. Registries and builders
//! take a `SupersConfig` at construction, so independently configured
//! instances can coexist in one process (and in parallel tests).

use crate::bitmap::TableShape;
use crate::primary::PRIMARY_SUPER_LIMIT;

/// Configuration for secondary-supers tables and subtype lookups.
///
/// # Example
///
/// ```
/// use prism_supers::SupersConfig;
///
/// // Force heavy hash collisions to exercise the fallback probe loop.
/// let config = SupersConfig {
///     stress_collisions: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupersConfig {
    // =========================================================================
    // Table Geometry
    // =========================================================================
    /// Number of logical slots in a hashed secondary-supers table.
    ///
    /// Must be a power of two between 4 and 64. A type with at least this
    /// many secondary supers is not indexed and is searched linearly.
    ///
    /// Default: 64
    pub table_size: usize,

    /// Length of the inline primary-supers chain.
    ///
    /// Classes deeper than this overflow into the secondary table.
    ///
    /// Default: 8 (also the maximum)
    pub primary_super_limit: usize,

    // =========================================================================
    // Hashing
    // =========================================================================
    /// Squeeze every hash slot into one of three buckets.
    ///
    /// Produces long collision chains on purpose so the fallback probe loop
    /// and the linear-scan paths get exercised.
    ///
    /// Default: false
    pub stress_collisions: bool,

    /// Name of the marker supertype pinned to slot 0.
    ///
    /// Default: `"Cloneable"`
    pub cloneable_marker: String,

    /// Name of the marker supertype pinned to slot `table_size / 2`.
    ///
    /// Default: `"Serializable"`
    pub serializable_marker: String,

    // =========================================================================
    // Lookup
    // =========================================================================
    /// Use the hashed table for secondary lookups.
    ///
    /// When disabled, lookups scan the secondary array linearly and remember
    /// the last successful hit in a one-element cache.
    ///
    /// Default: true
    pub use_secondary_table: bool,

    /// Cross-check every hashed lookup against a linear scan.
    ///
    /// A disagreement is treated as a fatal invariant violation.
    ///
    /// Default: false (enabled in debug builds)
    pub verify_lookups: bool,

    // =========================================================================
    // Hierarchy
    // =========================================================================
    /// Name of the root class created by every registry.
    ///
    /// Default: `"Object"`
    pub root_name: String,
}

impl Default for SupersConfig {
    fn default() -> Self {
        Self {
            // Geometry
            table_size: TableShape::MAX_SIZE,
            primary_super_limit: PRIMARY_SUPER_LIMIT,

            // Hashing
            stress_collisions: false,
            cloneable_marker: "Cloneable".to_string(),
            serializable_marker: "Serializable".to_string(),

            // Lookup
            use_secondary_table: true,
            verify_lookups: cfg!(debug_assertions),

            // Hierarchy
            root_name: "Object".to_string(),
        }
    }
}

impl SupersConfig {
    /// Create a configuration that maximizes hash collisions and verifies
    /// every lookup.
    pub fn stress() -> Self {
        Self {
            stress_collisions: true,
            verify_lookups: true,
            ..Default::default()
        }
    }

    /// Create a configuration that searches secondary supers linearly.
    pub fn legacy_linear() -> Self {
        Self {
            use_secondary_table: false,
            ..Default::default()
        }
    }

    /// Table geometry described by `table_size`.
    pub fn table_shape(&self) -> Result<TableShape, ConfigError> {
        TableShape::from_size(self.table_size).ok_or(ConfigError::InvalidTableSize(self.table_size))
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.table_shape()?;
        if self.primary_super_limit == 0 || self.primary_super_limit > PRIMARY_SUPER_LIMIT {
            return Err(ConfigError::InvalidPrimaryLimit(self.primary_super_limit));
        }
        if self.cloneable_marker.is_empty()
            || self.serializable_marker.is_empty()
            || self.root_name.is_empty()
        {
            return Err(ConfigError::EmptyName);
        }
        if self.cloneable_marker == self.serializable_marker {
            return Err(ConfigError::DuplicateMarker);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Table size is not a power of two in `4..=64`.
    #[error("table size must be a power of two between 4 and 64, got {0}")]
    InvalidTableSize(usize),
    /// Primary chain limit out of range.
    #[error("primary super limit must be between 1 and {max}, got {0}", max = PRIMARY_SUPER_LIMIT)]
    InvalidPrimaryLimit(usize),
    /// A marker or root name is empty.
    #[error("marker and root names must not be empty")]
    EmptyName,
    /// Both pinned markers have the same name.
    #[error("cloneable and serializable markers must differ")]
    DuplicateMarker,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SupersConfig::default().validate().is_ok());
    }

    #[test]
    fn test_preset_configs_are_valid() {
        assert!(SupersConfig::stress().validate().is_ok());
        assert!(SupersConfig::legacy_linear().validate().is_ok());
    }

    #[test]
    fn test_invalid_table_size() {
        let config = SupersConfig {
            table_size: 48, // Not power of two
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidTableSize(48)));

        let config = SupersConfig {
            table_size: 128,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidTableSize(128)));
    }

    #[test]
    fn test_small_table_size() {
        let config = SupersConfig {
            table_size: 8,
            ..Default::default()
        };
        assert_eq!(config.table_shape().map(|s| s.size()), Ok(8));
    }

    #[test]
    fn test_invalid_primary_limit() {
        let config = SupersConfig {
            primary_super_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidPrimaryLimit(0)));

        let config = SupersConfig {
            primary_super_limit: 9,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidPrimaryLimit(9)));
    }

    #[test]
    fn test_marker_names() {
        let config = SupersConfig {
            serializable_marker: "Cloneable".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::DuplicateMarker));

        let config = SupersConfig {
            root_name: String::new(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyName));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConfigError::InvalidPrimaryLimit(9).to_string(),
            "primary super limit must be between 1 and 8, got 9"
        );
    }
}
