//! Error types.
//!
//! Linking mistakes made by a caller are reported as [`LinkError`]. A broken
//! secondary-supers table is different: it means a subtype check may already
//! have answered wrongly, so it is never returned as a value. Those paths go
//! through [`verification_failure`], which logs the full context and panics.

use crate::config::ConfigError;
use std::fmt;

/// Errors raised while defining or relinking types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Type names must be non-empty.
    #[error("type name must not be empty")]
    EmptyName,

    /// A type with this name already exists in the registry.
    #[error("type '{0}' is already defined")]
    DuplicateName(String),

    /// A type listed as an interface is a class.
    #[error("'{0}' is not an interface")]
    NotAnInterface(String),

    /// A class named an interface as its superclass.
    #[error("class cannot extend interface '{0}'")]
    SuperIsInterface(String),

    /// The descriptor was not defined by this registry.
    #[error("type '{0}' is not registered in this registry")]
    UnknownType(String),

    /// Relinking would make a type its own supertype.
    #[error("circular inheritance involving '{0}'")]
    CircularInheritance(String),

    /// The registry configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Abort on a secondary-supers invariant violation.
///
/// `context` should name the offending entry and the expected versus actual
/// table state.
#[cold]
#[inline(never)]
#[track_caller]
pub fn verification_failure(context: fmt::Arguments<'_>) -> ! {
    tracing::error!(%context, "secondary supers verification failed");
    panic!("secondary supers verification failed: {context}");
}
