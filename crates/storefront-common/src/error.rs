//! Error types shared across storefront crates
//!
//! Errors are structured with fields to aid debugging in production.
//! Variants that relate to a specific store carry its identifier so log
//! lines and API responses can point at the record involved.

use thiserror::Error;

/// Main error type for storefront operations
#[derive(Debug, Error)]
pub enum Error {
    /// Request input failed validation
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The offending input field, if known
        field: Option<String>,
    },

    /// No store record with the given id
    #[error("store not found: {id}")]
    NotFound {
        /// The id that was looked up
        id: String,
    },

    /// A write collided with an existing record (duplicate id or namespace)
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the collision
        message: String,
    },

    /// Catalog storage failure
    #[error("catalog error [{context}]: {message}")]
    Catalog {
        /// Description of what failed
        message: String,
        /// Operation that failed (e.g., "create", "update_status")
        context: String,
    },

    /// Deployment driver failure (helm or cluster query)
    #[error("driver error for {release}: {message}")]
    Driver {
        /// Release the operation targeted
        release: String,
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a not-found error for a store id
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
        }
    }

    /// Create a catalog error with operation context
    pub fn catalog(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Catalog {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Create a driver error for a specific release
    pub fn driver_for(release: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Driver {
            release: release.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether the caller is at fault (bad input or unknown id)
    ///
    /// Client errors are rejected before any side effect happens.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. } | Error::NotFound { .. } | Error::Conflict { .. }
        )
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Catalog { context, .. } => Some(context),
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}
