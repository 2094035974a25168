//! # Error Types
//!
//! Domain-specific error types for keystone-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  keystone-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Request shape failures                         │
//! │                                                                         │
//! │  keystone-db errors                                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  keystone-txn errors                                                   │
//! │  └── TxnError         - What callers of a coordinator see              │
//! │                                                                         │
//! │  Flow: ValidationError / CoreError / DbError → TxnError → caller       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::transfer::{TransferAction, TransferStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations detected without touching storage.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A transfer action was attempted from a state that does not allow it.
    ///
    /// ## When This Occurs
    /// - Completing a cancelled or already completed transfer
    /// - Cancelling an approved or completed transfer
    #[error("{message}")]
    InvalidTransition {
        from: TransferStatus,
        action: TransferAction,
        message: &'static str,
    },

    /// The header discount is larger than what the sale is worth.
    #[error("Discount {discount_cents} exceeds sale value {available_cents}")]
    DiscountExceedsTotal {
        discount_cents: i64,
        available_cents: i64,
    },

    /// Paid amount outside `0..=total`.
    #[error("Paid amount {paid_cents} must be between 0 and {total_cents}")]
    InvalidPaidAmount { paid_cents: i64, total_cents: i64 },

    /// An amount left the `i64` cent range while pricing.
    #[error("{what} is too large")]
    AmountOverflow { what: &'static str },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any transaction is opened.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or greater.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format or combination of values.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value within one request.
    #[error("{field} '{value}' is duplicated")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(
            ValidationError::required("items").to_string(),
            "items is required"
        );
        let err = ValidationError::MustBePositive {
            field: "items[0].quantity".to_string(),
        };
        assert_eq!(err.to_string(), "items[0].quantity must be positive");
    }

    #[test]
    fn test_transition_error_uses_message() {
        let err = CoreError::InvalidTransition {
            from: TransferStatus::Completed,
            action: TransferAction::Cancel,
            message: "only pending transfers can be cancelled",
        };
        assert_eq!(err.to_string(), "only pending transfers can be cancelled");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("sku").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
