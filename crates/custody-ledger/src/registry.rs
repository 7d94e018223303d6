//! Product registry: the custody state machine.
//!
//! Each product owns its transfer events. A write is checked in full before
//! anything is touched, then applied in one step: the event append, the
//! `transfer_count` increment, and the custodian/location update never
//! happen separately.
//!
//! ```text
//! register ──▶ Product { count: 0, custodian: caller }
//! transfer ──▶ events.push(e); count += 1; custodian = e.to; location = e.to_location
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use custody_types::{
    AccountId, CustodyError, Product, ProductId, RegisterProduct, Result, TransferEvent,
    TransferProduct,
};

struct ProductEntry {
    product: Product,
    events: Vec<TransferEvent>,
}

/// In-memory product store.
#[derive(Default)]
pub struct ProductRegistry {
    products: HashMap<ProductId, ProductEntry>,
}

impl ProductRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a registration without applying it.
    ///
    /// # Errors
    /// - `InvalidInput` if a required field is empty
    /// - `DuplicateProduct` if the ID is taken
    pub fn check_register(&self, req: &RegisterProduct) -> Result<()> {
        req.validate()?;
        if self.products.contains_key(&req.product_id) {
            return Err(CustodyError::DuplicateProduct(req.product_id.clone()));
        }
        Ok(())
    }

    /// Register a product in the custody of `caller`.
    pub fn register(
        &mut self,
        caller: AccountId,
        req: RegisterProduct,
        at: DateTime<Utc>,
    ) -> Result<&Product> {
        self.check_register(&req)?;

        let product = Product {
            product_id: req.product_id.clone(),
            name: req.name,
            manufacturer: req.manufacturer,
            manufacture_date: at,
            current_custodian: caller,
            current_location: req.location,
            transfer_count: 0,
        };
        let entry = self
            .products
            .entry(req.product_id)
            .or_insert(ProductEntry {
                product,
                events: Vec::new(),
            });
        Ok(&entry.product)
    }

    /// Check a transfer without applying it.
    ///
    /// # Errors
    /// - `InvalidInput` if a location is empty
    /// - `ProductNotFound` if the product doesn't exist
    /// - `NotCustodian` if `caller` doesn't hold custody
    pub fn check_transfer(&self, caller: AccountId, req: &TransferProduct) -> Result<()> {
        req.validate()?;
        let entry = self
            .products
            .get(&req.product_id)
            .ok_or_else(|| CustodyError::ProductNotFound(req.product_id.clone()))?;
        if entry.product.current_custodian != caller {
            return Err(CustodyError::NotCustodian {
                product_id: req.product_id.clone(),
                caller,
            });
        }
        Ok(())
    }

    /// Hand custody of a product from `caller` to `req.to`.
    pub fn transfer(
        &mut self,
        caller: AccountId,
        req: TransferProduct,
        at: DateTime<Utc>,
    ) -> Result<&TransferEvent> {
        self.check_transfer(caller, &req)?;
        let entry = self
            .products
            .get_mut(&req.product_id)
            .ok_or_else(|| CustodyError::ProductNotFound(req.product_id.clone()))?;

        entry.product.current_custodian = req.to;
        entry.product.current_location.clone_from(&req.to_location);
        entry.product.transfer_count += 1;
        entry.events.push(TransferEvent {
            from: caller,
            to: req.to,
            from_location: req.from_location,
            to_location: req.to_location,
            timestamp: at,
            notes: req.notes,
        });

        entry
            .events
            .last()
            .ok_or_else(|| CustodyError::Internal("transfer event missing after append".into()))
    }

    #[must_use]
    pub fn product(&self, product_id: &ProductId) -> Option<&Product> {
        self.products.get(product_id).map(|e| &e.product)
    }

    /// The `index`-th transfer of a product (zero-based).
    ///
    /// # Errors
    /// - `ProductNotFound` if the product doesn't exist
    /// - `EventIndexOutOfRange` if `index >= transfer_count`
    pub fn event(&self, product_id: &ProductId, index: u64) -> Result<&TransferEvent> {
        let entry = self
            .products
            .get(product_id)
            .ok_or_else(|| CustodyError::ProductNotFound(product_id.clone()))?;
        usize::try_from(index)
            .ok()
            .and_then(|i| entry.events.get(i))
            .ok_or_else(|| CustodyError::EventIndexOutOfRange {
                product_id: product_id.clone(),
                index,
                transfer_count: entry.product.transfer_count,
            })
    }

    /// All transfers of a product, oldest first.
    pub fn history(&self, product_id: &ProductId) -> Result<&[TransferEvent]> {
        self.products
            .get(product_id)
            .map(|e| e.events.as_slice())
            .ok_or_else(|| CustodyError::ProductNotFound(product_id.clone()))
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values().map(|e| &e.product)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Verify the custody invariants for every product:
    /// ```text
    /// transfer_count == events.len()
    /// custodian, location == last event's (to, to_location), if any
    /// events[i].from == events[i-1].to
    /// ```
    ///
    /// # Errors
    /// Returns [`CustodyError::Internal`] naming the first violating product.
    pub fn check_invariants(&self) -> Result<()> {
        for (id, entry) in &self.products {
            let product = &entry.product;
            if usize::try_from(product.transfer_count).ok() != Some(entry.events.len()) {
                return Err(CustodyError::Internal(format!(
                    "{id}: transfer_count {} != {} recorded events",
                    product.transfer_count,
                    entry.events.len()
                )));
            }
            if let Some(last) = entry.events.last() {
                if last.to != product.current_custodian || last.to_location != product.current_location {
                    return Err(CustodyError::Internal(format!(
                        "{id}: custody state does not match latest transfer"
                    )));
                }
            }
            for pair in entry.events.windows(2) {
                if pair[1].from != pair[0].to {
                    return Err(CustodyError::Internal(format!(
                        "{id}: transfer chain broken"
                    )));
                }
            }
        }
        Ok(())
    }
}
