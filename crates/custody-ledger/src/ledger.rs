//! The custody ledger contract and its local implementation.
//!
//! [`CustodyLedger`] is the interface clients are written against.
//! [`LocalLedger`] implements it in-process: all state sits behind one
//! `RwLock`, and a write holds the write lock from authentication through
//! journaling to apply, so a reader never sees a `transfer_count` without
//! the event it counts.
//!
//! ## Write path
//!
//! ```text
//! submit(SignedCall)
//!   → ledger address matches?         (WrongLedger)
//!   → signature valid?                (SignatureInvalid)
//!   → nonce == expected?              (NonceReplay / NonceOutOfOrder)
//!   → registry check                  (DuplicateProduct / ProductNotFound / NotCustodian)
//!   → journal append + fsync          (Io)
//!   → registry apply, nonce += 1, block += 1
//!   → TxReceipt
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use custody_types::{
    AccountId, Capability, CustodyError, LedgerAddress, LedgerCall, LedgerConfig, Product,
    ProductId, Result, SignedCall, TransferEvent, TxReceipt,
};
use tokio::sync::RwLock;

use crate::access::AccessControl;
use crate::journal::Journal;
use crate::nonce::NonceTracker;
use crate::registry::ProductRegistry;

/// Operations the custody ledger exposes to clients.
#[async_trait]
pub trait CustodyLedger: Send + Sync {
    /// The address calls must be signed for.
    fn address(&self) -> LedgerAddress;

    /// The nonce `account` must sign its next call with.
    async fn next_nonce(&self, account: &AccountId) -> Result<u64>;

    /// Commit a register or transfer call. Returns only once the write is final.
    async fn submit(&self, call: SignedCall) -> Result<TxReceipt>;

    /// Whether `product_id` is a registered product.
    async fn verify_product(&self, product_id: &ProductId) -> Result<bool>;

    /// # Errors
    /// Returns `ProductNotFound` if the product doesn't exist.
    async fn product_info(&self, product_id: &ProductId) -> Result<Product>;

    /// Latest committed state of a product, or `None` if unknown.
    async fn verify(&self, product_id: &ProductId) -> Result<Option<Product>> {
        match self.product_info(product_id).await {
            Ok(product) => Ok(Some(product)),
            Err(CustodyError::ProductNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// # Errors
    /// Returns `EventIndexOutOfRange` if `index >= transfer_count`.
    async fn get_transfer_event(&self, product_id: &ProductId, index: u64) -> Result<TransferEvent>;

    /// Every transfer of a product, oldest first, in one read.
    async fn transfer_history(&self, product_id: &ProductId) -> Result<Vec<TransferEvent>> {
        let product = self.product_info(product_id).await?;
        let mut events = Vec::new();
        for index in 0..product.transfer_count {
            events.push(self.get_transfer_event(product_id, index).await?);
        }
        Ok(events)
    }

    /// Every registered product, in no particular order.
    ///
    /// `call` must be a signed [`LedgerCall::ListAll`] at the caller's
    /// current nonce; the caller needs [`Capability::ListAllProducts`].
    async fn list_all(&self, call: SignedCall) -> Result<Vec<Product>>;
}

#[async_trait]
impl<L: CustodyLedger + ?Sized> CustodyLedger for Arc<L> {
    fn address(&self) -> LedgerAddress {
        (**self).address()
    }

    async fn next_nonce(&self, account: &AccountId) -> Result<u64> {
        (**self).next_nonce(account).await
    }

    async fn submit(&self, call: SignedCall) -> Result<TxReceipt> {
        (**self).submit(call).await
    }

    async fn verify_product(&self, product_id: &ProductId) -> Result<bool> {
        (**self).verify_product(product_id).await
    }

    async fn product_info(&self, product_id: &ProductId) -> Result<Product> {
        (**self).product_info(product_id).await
    }

    async fn verify(&self, product_id: &ProductId) -> Result<Option<Product>> {
        (**self).verify(product_id).await
    }

    async fn get_transfer_event(&self, product_id: &ProductId, index: u64) -> Result<TransferEvent> {
        (**self).get_transfer_event(product_id, index).await
    }

    async fn transfer_history(&self, product_id: &ProductId) -> Result<Vec<TransferEvent>> {
        (**self).transfer_history(product_id).await
    }

    async fn list_all(&self, call: SignedCall) -> Result<Vec<Product>> {
        (**self).list_all(call).await
    }
}

struct LedgerState {
    registry: ProductRegistry,
    nonces: NonceTracker,
    block_height: u64,
    journal: Option<Journal>,
}

impl LedgerState {
    /// Signature, then nonce. Returns the verified signer.
    fn authenticate(&self, address: LedgerAddress, call: &SignedCall) -> Result<AccountId> {
        if call.ledger != address {
            return Err(CustodyError::WrongLedger {
                expected: address,
                actual: call.ledger,
            });
        }
        let signer = call.verify()?;
        self.nonces.check(signer, call.nonce)?;
        Ok(signer)
    }

    fn check(&self, signer: AccountId, call: &LedgerCall) -> Result<()> {
        match call {
            LedgerCall::Register(req) => self.registry.check_register(req),
            LedgerCall::Transfer(req) => self.registry.check_transfer(signer, req),
            LedgerCall::ListAll => Err(CustodyError::UnsupportedCall {
                reason: "list_all is a read; use list_all()".to_string(),
            }),
        }
    }

    fn apply(&mut self, signer: AccountId, call: LedgerCall, at: DateTime<Utc>) -> Result<()> {
        match call {
            LedgerCall::Register(req) => {
                self.registry.register(signer, req, at)?;
            }
            LedgerCall::Transfer(req) => {
                self.registry.transfer(signer, req, at)?;
            }
            LedgerCall::ListAll => {
                return Err(CustodyError::UnsupportedCall {
                    reason: "list_all is a read; use list_all()".to_string(),
                });
            }
        }
        self.nonces.advance(signer);
        Ok(())
    }
}

/// In-process custody ledger, optionally backed by a journal file.
pub struct LocalLedger {
    address: LedgerAddress,
    access: AccessControl,
    state: RwLock<LedgerState>,
}

impl LocalLedger {
    /// Build a ledger from `config`, replaying its journal if one is set.
    ///
    /// # Errors
    /// - `Io` if the journal cannot be opened
    /// - `JournalCorrupt` if the journal is damaged or an entry no longer applies
    pub fn open(config: &LedgerConfig) -> Result<Self> {
        let mut state = LedgerState {
            registry: ProductRegistry::new(),
            nonces: NonceTracker::new(),
            block_height: 0,
            journal: None,
        };

        if let Some(path) = &config.journal_path {
            let (journal, entries) = Journal::open(path)?;
            let replayed = entries.len();
            for (idx, entry) in entries.into_iter().enumerate() {
                let corrupt = |e: CustodyError| CustodyError::JournalCorrupt {
                    line: idx + 1,
                    reason: e.to_string(),
                };
                let signer = state.authenticate(config.address, &entry.call).map_err(corrupt)?;
                state
                    .apply(signer, entry.call.call, entry.committed_at)
                    .map_err(corrupt)?;
                state.block_height = entry.block_number;
            }
            state.journal = Some(journal);
            tracing::info!(
                ledger = %config.address,
                replayed,
                block_height = state.block_height,
                products = state.registry.len(),
                "Journal replayed"
            );
        }

        Ok(Self {
            address: config.address,
            access: AccessControl::from_grants(&config.roles),
            state: RwLock::new(state),
        })
    }

    /// A fresh ledger with no journal and no roles.
    #[must_use]
    pub fn in_memory(address: LedgerAddress) -> Self {
        Self {
            address,
            access: AccessControl::new(),
            state: RwLock::new(LedgerState {
                registry: ProductRegistry::new(),
                nonces: NonceTracker::new(),
                block_height: 0,
                journal: None,
            }),
        }
    }

    /// Number of committed writes.
    pub async fn block_height(&self) -> u64 {
        self.state.read().await.block_height
    }

    pub async fn product_count(&self) -> usize {
        self.state.read().await.registry.len()
    }

    /// Verify the custody invariants across all products.
    pub async fn check_invariants(&self) -> Result<()> {
        self.state.read().await.registry.check_invariants()
    }

    async fn commit(&self, call: SignedCall) -> Result<TxReceipt> {
        if !call.call.is_write() {
            return Err(CustodyError::UnsupportedCall {
                reason: format!("{} is not a write", call.call.kind()),
            });
        }

        let mut state = self.state.write().await;
        let signer = state.authenticate(self.address, &call)?;
        state.check(signer, &call.call)?;

        let committed_at = Utc::now().trunc_subsecs(0);
        let block_number = state.block_height + 1;
        let tx_hash = call.tx_hash()?;
        if let Some(journal) = state.journal.as_mut() {
            journal.append(block_number, &call, committed_at)?;
        }

        let product_id = call.call.product_id().cloned();
        let op = call.call.kind();
        state.apply(signer, call.call, committed_at)?;
        state.block_height = block_number;

        tracing::info!(
            block = block_number,
            tx = %tx_hash,
            op,
            product = ?product_id.as_ref().map(ProductId::as_str),
            signer = %signer.short(),
            "Call committed"
        );

        Ok(TxReceipt {
            tx_hash,
            block_number,
            signer,
            product_id,
            committed_at,
        })
    }
}

#[async_trait]
impl CustodyLedger for LocalLedger {
    fn address(&self) -> LedgerAddress {
        self.address
    }

    async fn next_nonce(&self, account: &AccountId) -> Result<u64> {
        Ok(self.state.read().await.nonces.expected(account))
    }

    async fn submit(&self, call: SignedCall) -> Result<TxReceipt> {
        let op = call.call.kind();
        let result = self.commit(call).await;
        if let Err(e) = &result {
            tracing::warn!(op, error = %e, "Call rejected");
        }
        result
    }

    async fn verify_product(&self, product_id: &ProductId) -> Result<bool> {
        Ok(self.state.read().await.registry.product(product_id).is_some())
    }

    async fn product_info(&self, product_id: &ProductId) -> Result<Product> {
        let state = self.state.read().await;
        state
            .registry
            .product(product_id)
            .cloned()
            .ok_or_else(|| CustodyError::ProductNotFound(product_id.clone()))
    }

    async fn get_transfer_event(&self, product_id: &ProductId, index: u64) -> Result<TransferEvent> {
        let state = self.state.read().await;
        state.registry.event(product_id, index).cloned()
    }

    async fn transfer_history(&self, product_id: &ProductId) -> Result<Vec<TransferEvent>> {
        let state = self.state.read().await;
        state.registry.history(product_id).map(<[TransferEvent]>::to_vec)
    }

    async fn list_all(&self, call: SignedCall) -> Result<Vec<Product>> {
        if call.call != LedgerCall::ListAll {
            return Err(CustodyError::UnsupportedCall {
                reason: format!("expected list_all, got {}", call.call.kind()),
            });
        }
        let state = self.state.read().await;
        let caller = state.authenticate(self.address, &call)?;
        self.access.require(caller, Capability::ListAllProducts)?;

        let products: Vec<Product> = state.registry.products().cloned().collect();
        tracing::debug!(caller = %caller.short(), count = products.len(), "Listed all products");
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_types::{RegisterProduct, Role, RoleGrant, TransferProduct, test_signing_key};
    use ed25519_dalek::SigningKey;

    const LEDGER: LedgerAddress = LedgerAddress::from_bytes([0x42; 20]);

    fn account(key: &SigningKey) -> AccountId {
        AccountId::from_verifying_key(&key.verifying_key())
    }

    fn pid(s: &str) -> ProductId {
        ProductId::new(s).unwrap()
    }

    fn register(id: &str) -> LedgerCall {
        LedgerCall::Register(RegisterProduct {
            product_id: pid(id),
            name: "Insulin pen".into(),
            manufacturer: "MedCo".into(),
            location: "Plant 7".into(),
        })
    }

    fn transfer(id: &str, to: AccountId) -> LedgerCall {
        LedgerCall::Transfer(TransferProduct {
            product_id: pid(id),
            to,
            from_location: "Plant 7".into(),
            to_location: "Pharmacy".into(),
            notes: "cold chain".into(),
        })
    }

    async fn send(ledger: &LocalLedger, key: &SigningKey, call: LedgerCall) -> Result<TxReceipt> {
        let nonce = ledger.next_nonce(&account(key)).await?;
        ledger.submit(SignedCall::sign(call, LEDGER, nonce, key)?).await
    }

    #[tokio::test]
    async fn register_then_verify() {
        let ledger = LocalLedger::in_memory(LEDGER);
        let maker = test_signing_key(1);

        let receipt = send(&ledger, &maker, register("PEN-1")).await.unwrap();
        assert_eq!(receipt.block_number, 1);
        assert_eq!(receipt.signer, account(&maker));
        assert_eq!(receipt.product_id, Some(pid("PEN-1")));

        let product = ledger.verify(&pid("PEN-1")).await.unwrap().unwrap();
        assert_eq!(product.transfer_count, 0);
        assert_eq!(product.current_custodian, account(&maker));
        assert!(ledger.verify_product(&pid("PEN-1")).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_product_is_none_not_error() {
        let ledger = LocalLedger::in_memory(LEDGER);
        assert!(ledger.verify(&pid("GHOST")).await.unwrap().is_none());
        assert!(!ledger.verify_product(&pid("GHOST")).await.unwrap());
        assert!(matches!(
            ledger.product_info(&pid("GHOST")).await.unwrap_err(),
            CustodyError::ProductNotFound(_)
        ));
    }

    #[tokio::test]
    async fn replayed_call_rejected() {
        let ledger = LocalLedger::in_memory(LEDGER);
        let maker = test_signing_key(1);
        let call = SignedCall::sign(register("PEN-1"), LEDGER, 0, &maker).unwrap();

        ledger.submit(call.clone()).await.unwrap();
        let err = ledger.submit(call).await.unwrap_err();
        assert!(matches!(err, CustodyError::NonceReplay { .. }), "got {err:?}");
        assert_eq!(ledger.block_height().await, 1);
    }

    #[tokio::test]
    async fn failed_write_does_not_consume_nonce() {
        let ledger = LocalLedger::in_memory(LEDGER);
        let maker = test_signing_key(1);
        send(&ledger, &maker, register("PEN-1")).await.unwrap();

        let err = send(&ledger, &maker, register("PEN-1")).await.unwrap_err();
        assert!(matches!(err, CustodyError::DuplicateProduct(_)));
        assert_eq!(ledger.next_nonce(&account(&maker)).await.unwrap(), 1);
        assert_eq!(ledger.block_height().await, 1);
    }

    #[tokio::test]
    async fn call_for_other_ledger_rejected() {
        let ledger = LocalLedger::in_memory(LEDGER);
        let maker = test_signing_key(1);
        let other = LedgerAddress::from_bytes([0x43; 20]);
        let call = SignedCall::sign(register("PEN-1"), other, 0, &maker).unwrap();

        let err = ledger.submit(call).await.unwrap_err();
        assert!(matches!(err, CustodyError::WrongLedger { .. }));
        assert_eq!(ledger.product_count().await, 0);
    }

    #[tokio::test]
    async fn forged_signer_key_rejected() {
        let ledger = LocalLedger::in_memory(LEDGER);
        let maker = test_signing_key(1);
        let thief = test_signing_key(2);
        send(&ledger, &maker, register("PEN-1")).await.unwrap();

        // Thief signs, then swaps in the custodian's public key.
        let mut call =
            SignedCall::sign(transfer("PEN-1", account(&thief)), LEDGER, 1, &thief).unwrap();
        call.signer_key = maker.verifying_key().to_bytes();
        let err = ledger.submit(call).await.unwrap_err();
        assert!(matches!(err, CustodyError::SignatureInvalid));
    }

    #[tokio::test]
    async fn transfer_history_matches_events() {
        let ledger = LocalLedger::in_memory(LEDGER);
        let maker = test_signing_key(1);
        let pharmacy = test_signing_key(2);
        send(&ledger, &maker, register("PEN-1")).await.unwrap();
        send(&ledger, &maker, transfer("PEN-1", account(&pharmacy))).await.unwrap();

        let history = ledger.transfer_history(&pid("PEN-1")).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], ledger.get_transfer_event(&pid("PEN-1"), 0).await.unwrap());
        assert_eq!(history[0].notes, "cold chain");
        ledger.check_invariants().await.unwrap();
    }

    #[tokio::test]
    async fn list_all_requires_capability() {
        let admin = test_signing_key(9);
        let mut config = LedgerConfig::in_memory(LEDGER);
        config.roles.push(RoleGrant {
            account: account(&admin),
            role: Role::Admin,
        });
        let ledger = LocalLedger::open(&config).unwrap();
        let maker = test_signing_key(1);
        send(&ledger, &maker, register("PEN-1")).await.unwrap();
        send(&ledger, &maker, register("PEN-2")).await.unwrap();

        let denied = SignedCall::sign(LedgerCall::ListAll, LEDGER, 2, &maker).unwrap();
        let err = ledger.list_all(denied).await.unwrap_err();
        assert!(matches!(err, CustodyError::MissingCapability { .. }));

        let allowed = SignedCall::sign(LedgerCall::ListAll, LEDGER, 0, &admin).unwrap();
        let mut ids: Vec<String> = ledger
            .list_all(allowed)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.product_id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["PEN-1", "PEN-2"]);
    }

    #[tokio::test]
    async fn list_all_is_not_a_write() {
        let ledger = LocalLedger::in_memory(LEDGER);
        let key = test_signing_key(1);
        let call = SignedCall::sign(LedgerCall::ListAll, LEDGER, 0, &key).unwrap();
        let err = ledger.submit(call).await.unwrap_err();
        assert!(matches!(err, CustodyError::UnsupportedCall { .. }));
    }

    #[tokio::test]
    async fn timestamps_are_whole_seconds() {
        let ledger = LocalLedger::in_memory(LEDGER);
        let maker = test_signing_key(1);
        let receipt = send(&ledger, &maker, register("PEN-1")).await.unwrap();
        let product = ledger.product_info(&pid("PEN-1")).await.unwrap();
        assert_eq!(product.manufacture_date.timestamp_subsec_nanos(), 0);
        assert_eq!(product.manufacture_date, receipt.committed_at);
    }
}
