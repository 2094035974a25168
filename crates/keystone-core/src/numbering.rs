//! # Document Numbering
//!
//! Document types, their numbering schemes and number formatting.
//!
//! ## Schemes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SEQUENTIAL (one counter per company/location/type)                    │
//! │    prefix + zero-padded counter          INV-000042                    │
//! │                                                                         │
//! │  DAILY (one counter per company/location/type/day)                     │
//! │    CODE-{location}-{YYYYMMDD}-{seq:04}   PUR-3-20260131-0007           │
//! │                                                                         │
//! │  Both counters live in `numbering_sequences`; a daily counter is a     │
//! │  row named `{type}@{YYYYMMDD}`.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::validation::ValidationResult;

/// Zero-pad width used for auto-provisioned sequences.
pub const DEFAULT_SEQUENCE_LENGTH: i64 = 6;

/// Longest allowed prefix.
pub const MAX_PREFIX_LEN: usize = 20;

/// Widest allowed zero padding (i64 has 19 digits).
pub const MAX_SEQUENCE_LENGTH: i64 = 18;

// =============================================================================
// Document Type
// =============================================================================

/// A kind of document that consumes numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Sale,
    Quote,
    Purchase,
    SaleReturn,
    PurchaseReturn,
    StockAdjustment,
    StockTransfer,
    Collection,
    /// Company-defined type. Never auto-provisioned.
    Custom(String),
}

/// How numbers for a document type are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingScheme {
    Sequential,
    Daily { code: &'static str },
}

impl DocumentType {
    /// Parses a sequence name; unknown names become `Custom`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "sale" => DocumentType::Sale,
            "quote" => DocumentType::Quote,
            "purchase" => DocumentType::Purchase,
            "sale_return" => DocumentType::SaleReturn,
            "purchase_return" => DocumentType::PurchaseReturn,
            "stock_adjustment" => DocumentType::StockAdjustment,
            "stock_transfer" => DocumentType::StockTransfer,
            "collection" => DocumentType::Collection,
            other => DocumentType::Custom(other.to_string()),
        }
    }

    /// The `numbering_sequences.name` for this type.
    pub fn name(&self) -> &str {
        match self {
            DocumentType::Sale => "sale",
            DocumentType::Quote => "quote",
            DocumentType::Purchase => "purchase",
            DocumentType::SaleReturn => "sale_return",
            DocumentType::PurchaseReturn => "purchase_return",
            DocumentType::StockAdjustment => "stock_adjustment",
            DocumentType::StockTransfer => "stock_transfer",
            DocumentType::Collection => "collection",
            DocumentType::Custom(name) => name,
        }
    }

    pub fn scheme(&self) -> NumberingScheme {
        match self {
            DocumentType::Purchase => NumberingScheme::Daily { code: "PUR" },
            DocumentType::Collection => NumberingScheme::Daily { code: "COL" },
            _ => NumberingScheme::Sequential,
        }
    }

    /// Prefix used when a sequence row is created on first use.
    /// `None` for types that must be configured explicitly.
    pub fn default_prefix(&self) -> Option<&'static str> {
        match self {
            DocumentType::Sale => Some("INV-"),
            DocumentType::Quote => Some("QOT-"),
            DocumentType::Purchase => Some("PUR-"),
            DocumentType::SaleReturn => Some("SR-"),
            DocumentType::PurchaseReturn => Some("PR-"),
            DocumentType::StockAdjustment => Some("ADJ-"),
            DocumentType::StockTransfer => Some("ST-"),
            DocumentType::Collection => Some("COL-"),
            DocumentType::Custom(_) => None,
        }
    }

    /// Sequence row name for the counter that serves `date`.
    pub fn counter_name(&self, date: NaiveDate) -> String {
        match self.scheme() {
            NumberingScheme::Sequential => self.name().to_string(),
            NumberingScheme::Daily { .. } => format!("{}@{}", self.name(), date.format("%Y%m%d")),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// Formats `prefix` + `number` zero-padded to `width`.
///
/// ## Example
/// ```rust
/// use keystone_core::numbering::format_sequential;
///
/// assert_eq!(format_sequential("INV-", 6, 42), "INV-000042");
/// assert_eq!(format_sequential("", 2, 123), "123");
/// ```
pub fn format_sequential(prefix: &str, width: i64, number: i64) -> String {
    let width = width.clamp(0, MAX_SEQUENCE_LENGTH) as usize;
    format!("{}{:0width$}", prefix, number, width = width)
}

/// Formats a daily-bucket number: `CODE-{location}-{YYYYMMDD}-{seq:04}`.
///
/// Company-wide counters use location `0`.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use keystone_core::numbering::format_daily;
///
/// let day = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
/// assert_eq!(format_daily("PUR", Some(3), day, 7), "PUR-3-20260131-0007");
/// ```
pub fn format_daily(code: &str, location_id: Option<i64>, date: NaiveDate, number: i64) -> String {
    format!(
        "{}-{}-{}-{:04}",
        code,
        location_id.unwrap_or(0),
        date.format("%Y%m%d"),
        number
    )
}

/// Formats the number for `document` given the counter value just issued.
pub fn format_number(
    document: &DocumentType,
    sequence: &NumberingSequence,
    location_id: Option<i64>,
    date: NaiveDate,
) -> String {
    match document.scheme() {
        NumberingScheme::Sequential => format_sequential(
            sequence.prefix.as_deref().unwrap_or_default(),
            sequence.sequence_length,
            sequence.current_number,
        ),
        NumberingScheme::Daily { code } => {
            format_daily(code, location_id, date, sequence.current_number)
        }
    }
}

// =============================================================================
// Persisted Row & Requests
// =============================================================================

/// A counter row (`numbering_sequences`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct NumberingSequence {
    pub id: i64,
    pub company_id: i64,
    /// `None` = company-wide; location-specific rows take precedence.
    pub location_id: Option<i64>,
    pub name: String,
    pub prefix: Option<String>,
    pub sequence_length: i64,
    /// Last value handed out.
    pub current_number: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateNumberingSequenceRequest {
    pub company_id: i64,
    #[serde(default)]
    pub location_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub prefix: Option<String>,
    pub sequence_length: i64,
    /// Counter value before the first issue; the first number is `start_from + 1`.
    #[serde(default)]
    pub start_from: Option<i64>,
}

impl CreateNumberingSequenceRequest {
    pub fn validate(&self) -> ValidationResult<()> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::required("name"));
        }
        validate_prefix(self.prefix.as_deref())?;
        validate_sequence_length(self.sequence_length)?;
        if let Some(start) = self.start_from {
            if start < 0 {
                return Err(ValidationError::MustNotBeNegative {
                    field: "start_from".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateNumberingSequenceRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub sequence_length: Option<i64>,
}

impl UpdateNumberingSequenceRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.prefix.is_none() && self.sequence_length.is_none()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if self.is_empty() {
            return Err(ValidationError::invalid("request", "no fields to update"));
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ValidationError::required("name"));
            }
        }
        validate_prefix(self.prefix.as_deref())?;
        if let Some(length) = self.sequence_length {
            validate_sequence_length(length)?;
        }
        Ok(())
    }
}

fn validate_prefix(prefix: Option<&str>) -> ValidationResult<()> {
    match prefix {
        Some(p) if p.len() > MAX_PREFIX_LEN => Err(ValidationError::TooLong {
            field: "prefix".to_string(),
            max: MAX_PREFIX_LEN,
        }),
        _ => Ok(()),
    }
}

fn validate_sequence_length(length: i64) -> ValidationResult<()> {
    if !(1..=MAX_SEQUENCE_LENGTH).contains(&length) {
        return Err(ValidationError::OutOfRange {
            field: "sequence_length".to_string(),
            min: 1,
            max: MAX_SEQUENCE_LENGTH,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn sequence(prefix: Option<&str>, length: i64, current: i64) -> NumberingSequence {
        NumberingSequence {
            id: 1,
            company_id: 1,
            location_id: None,
            name: "sale".to_string(),
            prefix: prefix.map(str::to_string),
            sequence_length: length,
            current_number: current,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_names_round_trip_through_from_name() {
        for doc in [
            DocumentType::Sale,
            DocumentType::StockTransfer,
            DocumentType::Purchase,
            DocumentType::PurchaseReturn,
        ] {
            assert_eq!(DocumentType::from_name(doc.name()), doc);
        }
        assert_eq!(
            DocumentType::from_name("Delivery_Note"),
            DocumentType::Custom("delivery_note".to_string())
        );
    }

    #[test]
    fn test_custom_types_have_no_default_prefix() {
        assert_eq!(DocumentType::Sale.default_prefix(), Some("INV-"));
        assert_eq!(DocumentType::StockTransfer.default_prefix(), Some("ST-"));
        assert_eq!(DocumentType::Custom("x".into()).default_prefix(), None);
    }

    #[test]
    fn test_counter_name_buckets_daily_types() {
        assert_eq!(DocumentType::Sale.counter_name(day()), "sale");
        assert_eq!(DocumentType::Purchase.counter_name(day()), "purchase@20261019");
    }

    #[test]
    fn test_format_number_per_scheme() {
        let seq = sequence(Some("INV-"), 6, 12);
        assert_eq!(format_number(&DocumentType::Sale, &seq, Some(1), day()), "INV-000012");

        let seq = sequence(None, 6, 3);
        assert_eq!(
            format_number(&DocumentType::Purchase, &seq, Some(4), day()),
            "PUR-4-20261019-0003"
        );
        assert_eq!(
            format_number(&DocumentType::Collection, &seq, None, day()),
            "COL-0-20261019-0003"
        );
    }

    #[test]
    fn test_counter_overflowing_width_is_not_truncated() {
        assert_eq!(format_sequential("ST-", 2, 1234), "ST-1234");
    }

    #[test]
    fn test_create_request_validation() {
        let mut req = CreateNumberingSequenceRequest {
            company_id: 1,
            location_id: None,
            name: "sale".to_string(),
            prefix: Some("INV-".to_string()),
            sequence_length: 6,
            start_from: Some(100),
        };
        assert!(req.validate().is_ok());

        req.sequence_length = 0;
        assert!(req.validate().is_err());

        req.sequence_length = 6;
        req.prefix = Some("X".repeat(21));
        assert!(req.validate().is_err());

        req.prefix = None;
        req.start_from = Some(-1);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_empty_update_is_rejected() {
        assert!(UpdateNumberingSequenceRequest::default().validate().is_err());
        let update = UpdateNumberingSequenceRequest {
            prefix: Some("S-".into()),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
    }
}
