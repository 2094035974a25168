//! Caller identity resolved by the request layer.

use keystone_core::ValidationError;

use crate::error::{TxnError, TxnResult};

/// Who is calling and where. Built by the (external) auth layer and passed
/// to every coordinator method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub company_id: i64,
    /// The terminal's location; some operations need one.
    pub location_id: Option<i64>,
    pub user_id: i64,
}

impl TenantContext {
    pub fn new(company_id: i64, location_id: Option<i64>, user_id: i64) -> Self {
        TenantContext {
            company_id,
            location_id,
            user_id,
        }
    }

    /// The location, or a validation failure for location-bound operations.
    pub fn location(&self) -> TxnResult<i64> {
        self.location_id
            .ok_or_else(|| TxnError::Validation(ValidationError::required("location_id")))
    }
}
