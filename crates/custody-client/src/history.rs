//! Verification history assembly.
//!
//! After a product is fetched, its transfer history is read one event at a
//! time (`transfer_count` reads). A failed event read is logged and skipped;
//! the product summary is still returned. When the ledger supports a single
//! batched history read, [`assemble_history_batched`] uses it and falls back
//! to the per-event reads if it fails.

use chrono::{DateTime, Local, Utc};
use custody_ledger::CustodyLedger;
use custody_types::{Product, TransferEvent};

/// Local date-time rendering used for every displayed timestamp.
#[must_use]
pub fn display_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One transfer as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Zero-based position in the product's history.
    pub index: u64,
    pub event: TransferEvent,
    pub timestamp_display: String,
}

impl HistoryEntry {
    fn new(index: u64, event: TransferEvent) -> Self {
        Self {
            index,
            timestamp_display: display_time(event.timestamp),
            event,
        }
    }
}

/// A verified product with as much of its history as could be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDetails {
    pub product: Product,
    pub manufacture_date_display: String,
    /// Retrieved transfers in index order.
    pub history: Vec<HistoryEntry>,
    /// Indices whose read failed.
    pub skipped: Vec<u64>,
}

impl ProductDetails {
    fn new(product: Product) -> Self {
        Self {
            manufacture_date_display: display_time(product.manufacture_date),
            product,
            history: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Whether every transfer was retrieved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Read every transfer of `product` one index at a time.
pub async fn assemble_history<L>(ledger: &L, product: Product) -> ProductDetails
where
    L: CustodyLedger + ?Sized,
{
    let mut details = ProductDetails::new(product);
    let product_id = details.product.product_id.clone();

    for index in 0..details.product.transfer_count {
        match ledger.get_transfer_event(&product_id, index).await {
            Ok(event) => details.history.push(HistoryEntry::new(index, event)),
            Err(e) => {
                tracing::warn!(
                    product = %product_id,
                    index,
                    error = %e,
                    "Skipping unreadable transfer event"
                );
                details.skipped.push(index);
            }
        }
    }

    tracing::debug!(
        product = %product_id,
        retrieved = details.history.len(),
        skipped = details.skipped.len(),
        "History assembled"
    );
    details
}

/// Read the whole history in one call, falling back to per-event reads.
pub async fn assemble_history_batched<L>(ledger: &L, product: Product) -> ProductDetails
where
    L: CustodyLedger + ?Sized,
{
    match ledger.transfer_history(&product.product_id).await {
        Ok(events) if events.len() as u64 == product.transfer_count => {
            let mut details = ProductDetails::new(product);
            details.history = (0u64..)
                .zip(events)
                .map(|(index, event)| HistoryEntry::new(index, event))
                .collect();
            details
        }
        Ok(events) => {
            tracing::warn!(
                product = %product.product_id,
                returned = events.len(),
                expected = product.transfer_count,
                "Batched history length mismatch, reading per event"
            );
            assemble_history(ledger, product).await
        }
        Err(e) => {
            tracing::warn!(
                product = %product.product_id,
                error = %e,
                "Batched history read failed, reading per event"
            );
            assemble_history(ledger, product).await
        }
    }
}
