//! Product and custody-transfer records.
//!
//! A [`Product`] is created once by registration and only ever changes by
//! appending a [`TransferEvent`]. Both are owned by the ledger; clients
//! hold copies for the lifetime of one screen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, CustodyError, ProductId, Result, constants};

/// A registered product and its current custody state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: ProductId,
    pub name: String,
    pub manufacturer: String,
    /// Registration time, whole seconds.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub manufacture_date: DateTime<Utc>,
    /// Registering account, then the `to` of the latest transfer.
    pub current_custodian: AccountId,
    /// Registration location, then the `to_location` of the latest transfer.
    pub current_location: String,
    /// Number of completed transfers. Never decreases.
    pub transfer_count: u64,
}

/// One custody handoff. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub from: AccountId,
    pub to: AccountId,
    pub from_location: String,
    pub to_location: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// May be empty.
    pub notes: String,
}

fn require_text(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CustodyError::InvalidInput {
            field,
            reason: "required".to_string(),
        });
    }
    bounded_text(field, value)
}

fn bounded_text(field: &'static str, value: &str) -> Result<()> {
    if value.len() > constants::MAX_TEXT_FIELD_BYTES {
        return Err(CustodyError::InvalidInput {
            field,
            reason: format!(
                "{} bytes exceeds limit of {}",
                value.len(),
                constants::MAX_TEXT_FIELD_BYTES
            ),
        });
    }
    Ok(())
}

/// Payload of a registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub product_id: ProductId,
    pub name: String,
    pub manufacturer: String,
    pub location: String,
}

impl RegisterProduct {
    /// Every field is required.
    pub fn validate(&self) -> Result<()> {
        require_text("name", &self.name)?;
        require_text("manufacturer", &self.manufacturer)?;
        require_text("location", &self.location)
    }
}

/// Payload of a custody-transfer call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProduct {
    pub product_id: ProductId,
    pub to: AccountId,
    pub from_location: String,
    pub to_location: String,
    #[serde(default)]
    pub notes: String,
}

impl TransferProduct {
    /// Locations are required; notes are optional but bounded.
    pub fn validate(&self) -> Result<()> {
        require_text("from_location", &self.from_location)?;
        require_text("to_location", &self.to_location)?;
        bounded_text("notes", &self.notes)
    }
}
