//! Common error infrastructure shared by every component.
//!
//! Domain-specific errors (`HierarchyError`, `ScheduleError`, `HandlerError`,
//! `RestoreError`) are defined in their respective modules alongside the
//! operations they guard. This module provides the classification surface
//! they all implement.

/// Severity level of an error, used for categorization and recovery strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// Expected during normal operation and contained where it occurs.
    ///
    /// Examples: a handler fault during dispatch, an unresolvable node
    /// type during restore.
    Recoverable,

    /// Precondition violation - the operation was rejected and nothing
    /// was mutated.
    ///
    /// Examples: attaching a node that already has a parent, scheduling
    /// with a non-positive interval.
    Validation,

    /// Unexpected state inconsistency. These indicate bugs and should be
    /// investigated.
    Internal,
}

impl ErrorSeverity {
    /// Returns a human-readable description of this severity level.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Validation => "validation",
            Self::Internal => "internal",
        }
    }

    /// Returns true if this error is contained rather than surfaced to the
    /// caller of the mutating operation.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }
}

/// Common trait for all runtime errors.
///
/// Provides a uniform interface for error classification across the crate.
/// Error enums derive Display/Error via `thiserror` and implement this trait
/// for categorization, metrics, and testing.
pub trait CoreError: std::fmt::Display + std::fmt::Debug {
    /// Returns the severity level of this error.
    fn severity(&self) -> ErrorSeverity;

    /// Returns a static string identifier for this error variant.
    fn error_code(&self) -> &'static str;
}
