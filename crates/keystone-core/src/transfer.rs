//! # Stock Transfer Types
//!
//! The transfer state machine and the transfer document types.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Stock Transfer Lifecycle                           │
//! │                                                                         │
//! │                  approve                                                │
//! │   ┌─────────┐ ───────────► ┌──────────┐                                │
//! │   │ PENDING │              │ APPROVED │                                │
//! │   └────┬────┘              └────┬─────┘                                │
//! │        │  \                     │                                       │
//! │ cancel │   \ complete           │ complete                              │
//! │        ▼    \                   ▼                                       │
//! │  ┌───────────┐ \──────────► ┌───────────┐                              │
//! │  │ CANCELLED │              │ COMPLETED │  ← only edge that moves stock │
//! │  └───────────┘              └───────────┘                              │
//! │                                                                         │
//! │  CANCELLED and COMPLETED are terminal. Every mutating entry point      │
//! │  goes through `transition()`; the SQL layer guards its UPDATE with     │
//! │  `status IN (action.allowed_from())`.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::CoreError;
use crate::quantity::Quantity;

// =============================================================================
// Status
// =============================================================================

/// Status of a stock transfer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    /// Created; no stock has moved.
    Pending,
    /// Reviewed; still no stock has moved.
    Approved,
    /// Stock moved from source to destination. Terminal.
    Completed,
    /// Abandoned before any stock moved. Terminal.
    Cancelled,
}

impl TransferStatus {
    /// Column value as stored in `stock_transfers.status`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Approved => "APPROVED",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Cancelled)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Actions & Transitions
// =============================================================================

/// A mutating operation on a transfer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferAction {
    Approve,
    Complete,
    Cancel,
}

impl TransferAction {
    /// States this action may start from.
    pub const fn allowed_from(&self) -> &'static [TransferStatus] {
        match self {
            TransferAction::Approve => &[TransferStatus::Pending],
            TransferAction::Complete => &[TransferStatus::Pending, TransferStatus::Approved],
            TransferAction::Cancel => &[TransferStatus::Pending],
        }
    }

    /// State reached when the action succeeds.
    pub const fn target(&self) -> TransferStatus {
        match self {
            TransferAction::Approve => TransferStatus::Approved,
            TransferAction::Complete => TransferStatus::Completed,
            TransferAction::Cancel => TransferStatus::Cancelled,
        }
    }

    /// Message reported when the action is refused.
    pub const fn refusal(&self) -> &'static str {
        match self {
            TransferAction::Approve => "only pending transfers can be approved",
            TransferAction::Complete => "transfer is not pending",
            TransferAction::Cancel => "only pending transfers can be cancelled",
        }
    }
}

impl fmt::Display for TransferAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferAction::Approve => f.write_str("approve"),
            TransferAction::Complete => f.write_str("complete"),
            TransferAction::Cancel => f.write_str("cancel"),
        }
    }
}

/// Validates `action` against the current status and returns the next status.
///
/// ## Example
/// ```rust
/// use keystone_core::transfer::{transition, TransferAction, TransferStatus};
///
/// assert_eq!(
///     transition(TransferStatus::Pending, TransferAction::Complete).unwrap(),
///     TransferStatus::Completed
/// );
/// assert!(transition(TransferStatus::Cancelled, TransferAction::Complete).is_err());
/// ```
pub fn transition(from: TransferStatus, action: TransferAction) -> Result<TransferStatus, CoreError> {
    if action.allowed_from().contains(&from) {
        Ok(action.target())
    } else {
        Err(CoreError::InvalidTransition {
            from,
            action,
            message: action.refusal(),
        })
    }
}

// =============================================================================
// Persisted Rows
// =============================================================================

/// Transfer header (`stock_transfers`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockTransfer {
    pub id: i64,
    pub company_id: i64,
    pub transfer_number: String,
    pub from_location_id: i64,
    pub to_location_id: i64,
    pub status: TransferStatus,
    pub notes: Option<String>,
    pub created_by: i64,
    pub approved_by: Option<i64>,
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Transfer detail line (`stock_transfer_details`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockTransferLine {
    pub id: i64,
    pub transfer_id: i64,
    pub product_id: i64,
    /// Requested quantity in thousandths.
    pub quantity_milli: i64,
    /// Quantity booked into the destination, set on completion.
    pub received_quantity_milli: i64,
}

impl StockTransferLine {
    #[inline]
    pub fn quantity(&self) -> Quantity {
        Quantity::from_milli(self.quantity_milli)
    }

    #[inline]
    pub fn received_quantity(&self) -> Quantity {
        Quantity::from_milli(self.received_quantity_milli)
    }
}

/// Header plus lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockTransferDocument {
    pub transfer: StockTransfer,
    pub lines: Vec<StockTransferLine>,
}

impl StockTransferDocument {
    /// Total requested quantity across all lines.
    pub fn total_quantity(&self) -> Quantity {
        self.lines.iter().map(|l| l.quantity()).sum()
    }
}

// =============================================================================
// Requests
// =============================================================================

/// One requested product movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferItemRequest {
    pub product_id: i64,
    pub quantity: Quantity,
}

/// Input to `CreateStockTransfer`. The source location comes from the caller's
/// tenant context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateStockTransferRequest {
    pub to_location_id: i64,
    pub items: Vec<TransferItemRequest>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================
