//! # Side Effects
//!
//! Post-commit work queued in the `side_effects` table.
//!
//! A sale writes its ledger posting and loyalty award into the queue inside
//! its own transaction; a background worker delivers them afterwards. The
//! types here are shared by the repository and the worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Kind & Payload
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectKind {
    LedgerPost,
    LoyaltyAward,
}

impl SideEffectKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SideEffectKind::LedgerPost => "ledger_post",
            SideEffectKind::LoyaltyAward => "loyalty_award",
        }
    }
}

impl fmt::Display for SideEffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the worker has to do, stored as JSON in `side_effects.payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffectPayload {
    /// Positive amounts credit, negative amounts debit.
    LedgerPost {
        company_id: i64,
        reference: String,
        amount: Money,
        user_id: i64,
    },
    LoyaltyAward {
        company_id: i64,
        customer_id: i64,
        sale_id: i64,
        /// Same reference as the sale's ledger post.
        sale_number: String,
        amount: Money,
    },
}

impl SideEffectPayload {
    pub fn kind(&self) -> SideEffectKind {
        match self {
            SideEffectPayload::LedgerPost { .. } => SideEffectKind::LedgerPost,
            SideEffectPayload::LoyaltyAward { .. } => SideEffectKind::LoyaltyAward,
        }
    }

    pub fn company_id(&self) -> i64 {
        match self {
            SideEffectPayload::LedgerPost { company_id, .. }
            | SideEffectPayload::LoyaltyAward { company_id, .. } => *company_id,
        }
    }

    /// Human-readable reference kept beside the JSON for operators.
    pub fn reference(&self) -> String {
        match self {
            SideEffectPayload::LedgerPost { reference, .. } => reference.clone(),
            SideEffectPayload::LoyaltyAward { sale_number, .. } => sale_number.clone(),
        }
    }
}

// =============================================================================
// Queue Row
// =============================================================================

/// A queued side effect (`side_effects`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SideEffect {
    pub id: String,
    pub company_id: i64,
    pub kind: SideEffectKind,
    pub reference: String,
    /// `SideEffectPayload` as JSON.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub next_attempt_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub dead_lettered_at: Option<DateTime<Utc>>,
}

impl SideEffect {
    pub fn decode(&self) -> serde_json::Result<SideEffectPayload> {
        serde_json::from_str(&self.payload)
    }

    pub fn is_pending(&self) -> bool {
        self.completed_at.is_none() && self.dead_lettered_at.is_none()
    }
}

// =============================================================================
// Retry Schedule
// =============================================================================

/// Delay before retry number `attempt` (1-based): `initial × 2^(attempt-1)`,
/// capped at `max`.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use keystone_core::effects::retry_delay;
///
/// let initial = Duration::from_millis(500);
/// let max = Duration::from_secs(60);
/// assert_eq!(retry_delay(1, initial, max), Duration::from_millis(500));
/// assert_eq!(retry_delay(3, initial, max), Duration::from_secs(2));
/// assert_eq!(retry_delay(30, initial, max), max);
/// ```
pub fn retry_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    initial
        .checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_tagged_json() {
        let payload = SideEffectPayload::LedgerPost {
            company_id: 1,
            reference: "sale:INV-000001".to_string(),
            amount: Money::from_cents(2300),
            user_id: 3,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"kind\":\"ledger_post\""));
        assert_eq!(payload.kind(), SideEffectKind::LedgerPost);

        let back: SideEffectPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_loyalty_reference_is_sale_number() {
        let payload = SideEffectPayload::LoyaltyAward {
            company_id: 1,
            customer_id: 9,
            sale_id: 42,
            sale_number: "INV-000042".to_string(),
            amount: Money::from_cents(100),
        };
        assert_eq!(payload.reference(), "INV-000042");
        assert_eq!(payload.company_id(), 1);
    }

    #[test]
    fn test_retry_delay_doubles() {
        let initial = Duration::from_secs(1);
        let max = Duration::from_secs(300);
        let delays: Vec<u64> = (1..=5).map(|a| retry_delay(a, initial, max).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
        assert_eq!(retry_delay(0, initial, max), initial);
    }
}
