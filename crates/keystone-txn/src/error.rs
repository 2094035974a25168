//! # Transaction Error Types
//!
//! The closed set of failures a coordinator call can report.
//!
//! ## Error Kinds
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Coordinator Failure Kinds                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   NotFound      │  │   Conflict      │  │   Validation            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  customer,      │  │  InsufficientSt.│  │  rejected before any    │ │
//! │  │  product,       │  │  bad transition │  │  transaction is opened  │ │
//! │  │  transfer, seq  │  │  already void   │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Transient     │  │   Invariant     │  │   Internal              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  busy / pool /  │  │  counter did    │  │  anything else from     │ │
//! │  │  connection;    │  │  not move; a    │  │  storage                │ │
//! │  │  caller retries │  │  bug signal     │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Every variant means the transaction was rolled back in full.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use keystone_core::{CoreError, Quantity, ValidationError};
use keystone_db::DbError;

/// Result type alias for coordinator operations.
pub type TxnResult<T> = Result<T, TxnError>;

/// Coarse category of a [`TxnError`], for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Transient,
    Invariant,
    Internal,
}

/// Coordinator failure.
#[derive(Debug, Error)]
pub enum TxnError {
    /// A referenced entity does not exist for this company.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A check-then-deduct found less stock than requested.
    #[error("insufficient stock for product ID {product_id}")]
    InsufficientStock {
        product_id: i64,
        location_id: i64,
        available: Quantity,
        requested: Quantity,
    },

    /// The entity is in a state that does not allow the operation.
    #[error("{reason}")]
    Conflict {
        entity: String,
        id: String,
        reason: String,
    },

    /// Malformed request.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Lock wait timed out or the connection failed; retrying the whole
    /// call is safe.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// A storage guarantee did not hold.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TxnError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        TxnError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(entity: impl Into<String>, id: impl ToString, reason: impl Into<String>) -> Self {
        TxnError::Conflict {
            entity: entity.into(),
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TxnError::NotFound { .. } => ErrorKind::NotFound,
            TxnError::InsufficientStock { .. } | TxnError::Conflict { .. } => ErrorKind::Conflict,
            TxnError::Validation(_) => ErrorKind::Validation,
            TxnError::Transient(_) => ErrorKind::Transient,
            TxnError::Invariant(_) => ErrorKind::Invariant,
            TxnError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the caller may retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for TxnError {
    fn from(err: DbError) -> Self {
        if err.is_transient() {
            return TxnError::Transient(err.to_string());
        }
        match err {
            DbError::NotFound { entity, id } => TxnError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => TxnError::Conflict {
                reason: format!("{field} '{value}' already exists"),
                entity: field,
                id: value,
            },
            other => TxnError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for TxnError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

impl From<CoreError> for TxnError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => TxnError::Validation(v),
            CoreError::InvalidTransition { from, message, .. } => TxnError::Conflict {
                entity: "Stock transfer".to_string(),
                id: from.to_string(),
                reason: message.to_string(),
            },
            CoreError::DiscountExceedsTotal { .. } => {
                TxnError::Validation(ValidationError::invalid("discount", err.to_string()))
            }
            CoreError::InvalidPaidAmount { .. } => {
                TxnError::Validation(ValidationError::invalid("paid_amount", err.to_string()))
            }
            CoreError::AmountOverflow { .. } => {
                TxnError::Validation(ValidationError::invalid("items", err.to_string()))
            }
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Failures while loading [`crate::config::KeystoneConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message_names_product() {
        let err = TxnError::InsufficientStock {
            product_id: 42,
            location_id: 1,
            available: Quantity::from_units(3),
            requested: Quantity::from_units(5),
        };
        assert_eq!(err.to_string(), "insufficient stock for product ID 42");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_db_errors_map_to_kinds() {
        let busy: TxnError = DbError::Busy("database is locked".into()).into();
        assert_eq!(busy.kind(), ErrorKind::Transient);
        assert!(busy.is_retryable());

        let missing: TxnError = DbError::not_found("Sale", 9).into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let dup: TxnError = DbError::duplicate("sale_number", "INV-000001").into();
        assert_eq!(dup.kind(), ErrorKind::Conflict);

        let other: TxnError = DbError::QueryFailed("syntax".into()).into();
        assert_eq!(other.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_core_errors_map_to_kinds() {
        use keystone_core::transfer::{transition, TransferAction, TransferStatus};

        let err: TxnError = transition(TransferStatus::Cancelled, TransferAction::Complete)
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "transfer is not pending");

        let err: TxnError = CoreError::DiscountExceedsTotal {
            discount_cents: 500,
            available_cents: 100,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
