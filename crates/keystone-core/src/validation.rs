//! # Validation Module
//!
//! Request shape checks run before any transaction is opened.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request shape (THIS MODULE)                                  │
//! │  ├── Non-empty items, positive quantities                              │
//! │  ├── Serial numbers vs quantity                                        │
//! │  ├── Header edits carry no amounts                                     │
//! │  └── Lengths of keys, notes, reasons                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Coordinator (keystone-txn)                                   │
//! │  ├── Tenant ownership of customers, products, locations                │
//! │  └── Stock sufficiency, status transitions                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (company_id, sale_number), (company_id, key)               │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::money::BPS_SCALE;
use crate::quantity::Quantity;
use crate::sale::{CreateSaleRequest, SaleItemRequest, UpdateSaleRequest};
use crate::transfer::CreateStockTransferRequest;
use crate::types::StockAdjustmentRequest;
use crate::{MAX_DOCUMENT_ITEMS, MAX_IDEMPOTENCY_KEY_LEN, MAX_LINE_QUANTITY_UNITS, MAX_NOTES_LEN, MAX_UNIT_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates that a quantity is strictly positive.
///
/// ## Example
/// ```rust
/// use keystone_core::quantity::Quantity;
/// use keystone_core::validation::validate_quantity;
///
/// assert!(validate_quantity("quantity", Quantity::from_milli(1)).is_ok());
/// assert!(validate_quantity("quantity", Quantity::zero()).is_err());
/// ```
pub fn validate_quantity(field: &str, quantity: Quantity) -> ValidationResult<()> {
    if !quantity.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates an optional client idempotency key.
pub fn validate_idempotency_key(key: Option<&str>) -> ValidationResult<()> {
    let Some(key) = key else {
        return Ok(());
    };
    if key.trim().is_empty() {
        return Err(ValidationError::required("idempotency_key"));
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ValidationError::TooLong {
            field: "idempotency_key".to_string(),
            max: MAX_IDEMPOTENCY_KEY_LEN,
        });
    }
    Ok(())
}

fn validate_notes(notes: Option<&str>) -> ValidationResult<()> {
    match notes {
        Some(n) if n.len() > MAX_NOTES_LEN => Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LEN,
        }),
        _ => Ok(()),
    }
}

fn validate_item_count(len: usize) -> ValidationResult<()> {
    if len == 0 {
        return Err(ValidationError::required("items"));
    }
    if len > MAX_DOCUMENT_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_DOCUMENT_ITEMS as i64,
        });
    }
    Ok(())
}

/// Serialized lines: whole quantity, one non-empty unique serial per unit.
///
/// ## Example
/// ```rust
/// use keystone_core::quantity::Quantity;
/// use keystone_core::validation::validate_serial_numbers;
///
/// let serials = vec!["SN-1".to_string(), "SN-2".to_string()];
/// assert!(validate_serial_numbers("items[0]", Quantity::from_units(2), &serials).is_ok());
/// assert!(validate_serial_numbers("items[0]", Quantity::from_units(3), &serials).is_err());
/// ```
pub fn validate_serial_numbers(
    field: &str,
    quantity: Quantity,
    serials: &[String],
) -> ValidationResult<()> {
    if serials.is_empty() {
        return Ok(());
    }
    let serial_field = format!("{field}.serial_numbers");

    if !quantity.is_whole() || quantity.whole_units() != serials.len() as i64 {
        return Err(ValidationError::invalid(
            serial_field,
            format!(
                "{} serial numbers given for quantity {}",
                serials.len(),
                quantity
            ),
        ));
    }

    let mut seen = HashSet::with_capacity(serials.len());
    for serial in serials {
        let serial = serial.trim();
        if serial.is_empty() {
            return Err(ValidationError::required(serial_field));
        }
        if serial.contains(',') {
            return Err(ValidationError::invalid(serial_field, "must not contain ','"));
        }
        if !seen.insert(serial) {
            return Err(ValidationError::Duplicate {
                field: serial_field,
                value: serial.to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Request Validators
// =============================================================================

/// Validates one cart line.
pub fn validate_sale_item(index: usize, item: &SaleItemRequest) -> ValidationResult<()> {
    let field = format!("items[{index}]");

    match item.product_id {
        Some(id) if id <= 0 => {
            return Err(ValidationError::MustBePositive {
                field: format!("{field}.product_id"),
            })
        }
        None if item.description.as_deref().map_or(true, |d| d.trim().is_empty()) => {
            return Err(ValidationError::required(format!("{field}.description")));
        }
        _ => {}
    }

    validate_quantity(&format!("{field}.quantity"), item.quantity)?;
    if item.quantity > Quantity::from_units(MAX_LINE_QUANTITY_UNITS) {
        return Err(ValidationError::OutOfRange {
            field: format!("{field}.quantity"),
            min: 0,
            max: MAX_LINE_QUANTITY_UNITS,
        });
    }

    if item.unit_price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: format!("{field}.unit_price"),
        });
    }
    if item.unit_price.cents() > MAX_UNIT_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: format!("{field}.unit_price"),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    if item.discount.bps() as i128 > BPS_SCALE {
        return Err(ValidationError::OutOfRange {
            field: format!("{field}.discount"),
            min: 0,
            max: BPS_SCALE as i64,
        });
    }

    validate_serial_numbers(&field, item.quantity, &item.serial_numbers)
}

/// Validates a sale request.
pub fn validate_create_sale(req: &CreateSaleRequest) -> ValidationResult<()> {
    validate_item_count(req.items.len())?;
    for (index, item) in req.items.iter().enumerate() {
        validate_sale_item(index, item)?;
    }

    if req.discount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "discount".to_string(),
        });
    }
    if let Some(paid) = req.paid_amount {
        if paid.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "paid_amount".to_string(),
            });
        }
    }
    if matches!(req.customer_id, Some(id) if id <= 0) {
        return Err(ValidationError::MustBePositive {
            field: "customer_id".to_string(),
        });
    }
    validate_payment_method_id(req.payment_method_id)?;

    validate_notes(req.notes.as_deref())?;
    validate_idempotency_key(req.idempotency_key.as_deref())
}

fn validate_payment_method_id(id: Option<i64>) -> ValidationResult<()> {
    if matches!(id, Some(id) if id <= 0) {
        return Err(ValidationError::MustBePositive {
            field: "payment_method_id".to_string(),
        });
    }
    Ok(())
}

/// Validates a header edit; at least one field must be present.
pub fn validate_update_sale(req: &UpdateSaleRequest) -> ValidationResult<()> {
    if req.is_empty() {
        return Err(ValidationError::invalid("request", "no fields to update"));
    }
    validate_payment_method_id(req.payment_method_id)?;
    validate_notes(req.notes.as_deref())
}

/// Validates a transfer request leaving `from_location_id`.
pub fn validate_create_transfer(
    from_location_id: i64,
    req: &CreateStockTransferRequest,
) -> ValidationResult<()> {
    if req.to_location_id == from_location_id {
        return Err(ValidationError::invalid(
            "to_location_id",
            "source and destination locations must differ",
        ));
    }

    validate_item_count(req.items.len())?;
    for (index, item) in req.items.iter().enumerate() {
        if item.product_id <= 0 {
            return Err(ValidationError::MustBePositive {
                field: format!("items[{index}].product_id"),
            });
        }
        validate_quantity(&format!("items[{index}].quantity"), item.quantity)?;
    }

    validate_notes(req.notes.as_deref())?;
    validate_idempotency_key(req.idempotency_key.as_deref())
}

/// Validates a manual stock adjustment.
pub fn validate_adjustment(req: &StockAdjustmentRequest) -> ValidationResult<()> {
    if req.product_id <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "product_id".to_string(),
        });
    }
    if req.delta.is_zero() {
        return Err(ValidationError::invalid("delta", "must not be zero"));
    }
    let reason = req.reason.trim();
    if reason.is_empty() {
        return Err(ValidationError::required("reason"));
    }
    if reason.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: 200,
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
    use crate::money::{Money, Rate};
    use crate::transfer::TransferItemRequest;

    fn item() -> SaleItemRequest {
        SaleItemRequest::product(1, Quantity::from_units(2), Money::from_cents(1000))
    }

    fn sale(items: Vec<SaleItemRequest>) -> CreateSaleRequest {
        CreateSaleRequest {
            items,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_sale_is_rejected() {
        let err = validate_create_sale(&sale(vec![])).unwrap_err();
        assert_eq!(err.to_string(), "items is required");
    }

    #[test]
    fn test_negative_quantity_is_rejected() {
        let mut bad = item();
        bad.quantity = Quantity::from_units(-1);
        let err = validate_create_sale(&sale(vec![item(), bad])).unwrap_err();
        assert_eq!(err.to_string(), "items[1].quantity must be positive");
    }

    #[test]
    fn test_freeform_line_needs_description() {
        let mut line = item();
        line.product_id = None;
        assert!(validate_sale_item(0, &line).is_err());

        line.description = Some("Gift wrap".to_string());
        assert!(validate_sale_item(0, &line).is_ok());
    }

    #[test]
    fn test_discount_over_hundred_percent() {
        let mut line = item();
        line.discount = Rate::from_bps(10_001);
        assert!(validate_sale_item(0, &line).is_err());
        line.discount = Rate::from_percent(100);
        assert!(validate_sale_item(0, &line).is_ok());
    }

    #[test]
    fn test_line_quantity_and_price_caps() {
        let mut line = item();
        line.quantity = Quantity::from_units(MAX_LINE_QUANTITY_UNITS);
        line.unit_price = Money::from_cents(MAX_UNIT_PRICE_CENTS);
        assert!(validate_sale_item(0, &line).is_ok());

        line.quantity = Quantity::from_units(10_000_000_000);
        let err = validate_sale_item(0, &line).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { ref field, .. } if field == "items[0].quantity"));

        line.quantity = Quantity::from_units(1);
        line.unit_price = Money::from_cents(10_000_000_000);
        let err = validate_sale_item(0, &line).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { ref field, .. } if field == "items[0].unit_price"));
    }

    #[test]
    fn test_serial_rules() {
        let q = Quantity::from_units(2);
        let dup = vec!["A".to_string(), "A".to_string()];
        assert!(matches!(
            validate_serial_numbers("items[0]", q, &dup),
            Err(ValidationError::Duplicate { .. })
        ));

        let blank = vec!["A".to_string(), " ".to_string()];
        assert!(validate_serial_numbers("items[0]", q, &blank).is_err());

        let one = vec!["A".to_string()];
        assert!(validate_serial_numbers("items[0]", Quantity::from_milli(1500), &one).is_err());
    }

    #[test]
    fn test_header_amounts_not_negative() {
        let mut req = sale(vec![item()]);
        req.discount = Money::from_cents(-1);
        assert!(validate_create_sale(&req).is_err());

        let mut req = sale(vec![item()]);
        req.paid_amount = Some(Money::from_cents(-5));
        assert!(validate_create_sale(&req).is_err());
    }

    #[test]
    fn test_update_sale_request() {
        assert!(validate_update_sale(&UpdateSaleRequest::default()).is_err());
        assert!(validate_update_sale(&UpdateSaleRequest {
            notes: Some("paid by card".to_string()),
            payment_method_id: None,
        })
        .is_ok());
        assert!(validate_update_sale(&UpdateSaleRequest {
            notes: None,
            payment_method_id: Some(0),
        })
        .is_err());
        assert!(validate_update_sale(&UpdateSaleRequest {
            notes: Some("n".repeat(MAX_NOTES_LEN + 1)),
            payment_method_id: None,
        })
        .is_err());

        let mut req = sale(vec![item()]);
        req.payment_method_id = Some(-1);
        assert!(validate_create_sale(&req).is_err());
    }

    #[test]
    fn test_idempotency_key_limits() {
        assert!(validate_idempotency_key(None).is_ok());
        assert!(validate_idempotency_key(Some("abc-123")).is_ok());
        assert!(validate_idempotency_key(Some("")).is_err());
        let long = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        assert!(validate_idempotency_key(Some(&long)).is_err());
    }

    #[test]
    fn test_transfer_request() {
        let req = CreateStockTransferRequest {
            to_location_id: 2,
            items: vec![TransferItemRequest {
                product_id: 1,
                quantity: Quantity::from_units(10),
            }],
            notes: None,
            idempotency_key: None,
        };
        assert!(validate_create_transfer(1, &req).is_ok());
        assert!(validate_create_transfer(2, &req).is_err());

        let mut zero = req.clone();
        zero.items[0].quantity = Quantity::zero();
        assert!(validate_create_transfer(1, &zero).is_err());
    }

    #[test]
    fn test_adjustment_request() {
        let req = StockAdjustmentRequest {
            product_id: 1,
            delta: Quantity::from_units(-2),
            reason: "damaged".to_string(),
        };
        assert!(validate_adjustment(&req).is_ok());
        assert!(validate_adjustment(&StockAdjustmentRequest {
            delta: Quantity::zero(),
            ..req.clone()
        })
        .is_err());
        assert!(validate_adjustment(&StockAdjustmentRequest {
            reason: "  ".to_string(),
            ..req
        })
        .is_err());
    }
}
