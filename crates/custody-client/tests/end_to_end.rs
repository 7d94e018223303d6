//! Client scenarios against a shared in-process ledger.

use std::sync::Arc;

use async_trait::async_trait;
use custody_client::{CustodyClient, LocalWallet, ProductDetails};
use custody_ledger::{CustodyLedger, LocalLedger};
use custody_types::{
    AccountId, ClientConfig, CustodyError, ErrorClass, LedgerAddress, LedgerCall, LedgerConfig,
    Product, ProductId, RegisterProduct, Result, Role, RoleGrant, SignedCall, TransferEvent,
    TransferProduct, TxReceipt, test_signing_key,
};

const LEDGER: LedgerAddress = LedgerAddress::from_bytes([0x77; 20]);

type Client = CustodyClient<Arc<LocalLedger>, LocalWallet>;

async fn client(ledger: &Arc<LocalLedger>, seed: u8) -> Client {
    let wallet = LocalWallet::new(vec![test_signing_key(seed)]).authorized();
    let client = CustodyClient::new(ClientConfig::new(LEDGER), Arc::clone(ledger), Some(wallet)).unwrap();
    assert!(client.init().await);
    client
}

fn me(client: &Client) -> AccountId {
    client.session().account().unwrap()
}

fn pid(s: &str) -> ProductId {
    ProductId::new(s).unwrap()
}

fn register_req(id: &str, name: &str) -> RegisterProduct {
    RegisterProduct {
        product_id: pid(id),
        name: name.into(),
        manufacturer: "Acme Farms".into(),
        location: "Packhouse 1".into(),
    }
}

fn transfer_req(id: &str, to: AccountId, from: &str, dest: &str) -> TransferProduct {
    TransferProduct {
        product_id: pid(id),
        to,
        from_location: from.into(),
        to_location: dest.into(),
        notes: format!("{from} -> {dest}"),
    }
}

async fn verified(client: &Client, id: &str) -> ProductDetails {
    let outcome = client.verify_product(&pid(id)).await;
    assert!(outcome.is_success(), "verify failed: {}", outcome.message());
    outcome.into_value().unwrap()
}

#[tokio::test]
async fn register_then_verify() {
    let ledger = Arc::new(LocalLedger::in_memory(LEDGER));
    let maker = client(&ledger, 1).await;

    let outcome = maker.register_product(register_req("LOT-1", "Honey")).await;
    assert_eq!(outcome.message(), "Product LOT-1 registered successfully!");
    let receipt = outcome.into_value().unwrap();
    assert_eq!(receipt.signer, me(&maker));
    assert_eq!(receipt.product_id, Some(pid("LOT-1")));

    let details = verified(&maker, "LOT-1").await;
    assert_eq!(details.product.name, "Honey");
    assert_eq!(details.product.manufacturer, "Acme Farms");
    assert_eq!(details.product.transfer_count, 0);
    assert_eq!(details.product.current_custodian, me(&maker));
    assert_eq!(details.product.current_location, "Packhouse 1");
    assert!(details.history.is_empty());

    let view = maker.view();
    assert_eq!(view.success.as_deref(), Some("Product verification successful!"));
    assert_eq!(view.product.as_ref(), Some(&details));
    assert!(!view.loading);
}

/// A client whose wallet holds a key but has not granted access.
fn reader<L: CustodyLedger>(ledger: L, config: ClientConfig) -> CustodyClient<L, LocalWallet> {
    let wallet = LocalWallet::new(vec![test_signing_key(50)]);
    CustodyClient::new(config, ledger, Some(wallet)).unwrap()
}

#[tokio::test]
async fn verification_needs_no_connected_account() {
    let ledger = Arc::new(LocalLedger::in_memory(LEDGER));
    let maker = client(&ledger, 1).await;
    maker.register_product(register_req("LOT-1", "Honey")).await;

    let reader = reader(Arc::clone(&ledger), ClientConfig::new(LEDGER));
    assert!(!reader.init().await);
    assert_eq!(verified(&reader, "LOT-1").await.product.name, "Honey");
}

#[tokio::test]
async fn missing_wallet_provider_blocks_verification() {
    let ledger = Arc::new(LocalLedger::in_memory(LEDGER));
    let maker = client(&ledger, 1).await;
    maker.register_product(register_req("LOT-1", "Honey")).await;

    let walletless: CustodyClient<_, LocalWallet> =
        CustodyClient::new(ClientConfig::new(LEDGER), Arc::clone(&ledger), None).unwrap();
    assert!(!walletless.init().await);
    let blocking = walletless.view().error;
    assert_eq!(blocking.as_deref(), Some("No wallet provider is installed"));

    let outcome = walletless.verify_product(&pid("LOT-1")).await;
    assert_eq!(outcome.class(), Some(ErrorClass::Connection));
    assert_eq!(walletless.view().error, blocking);
    assert!(walletless.view().product.is_none());
}

#[tokio::test]
async fn duplicate_registration_rejected_and_original_kept() {
    let ledger = Arc::new(LocalLedger::in_memory(LEDGER));
    let maker = client(&ledger, 1).await;
    let rival = client(&ledger, 2).await;

    assert!(maker.register_product(register_req("LOT-1", "Honey")).await.is_success());
    let outcome = rival.register_product(register_req("LOT-1", "Fake honey")).await;
    assert!(!outcome.is_success());
    assert!(
        outcome.message().starts_with("Registration failed: CU_ERR_101"),
        "{}",
        outcome.message()
    );

    let again = maker.register_product(register_req("LOT-1", "Honey")).await;
    assert!(!again.is_success());

    let details = verified(&rival, "LOT-1").await;
    assert_eq!(details.product.name, "Honey");
    assert_eq!(details.product.current_custodian, me(&maker));
    assert_eq!(ledger.block_height().await, 1);
}

#[tokio::test]
async fn transfer_moves_custody() {
    let ledger = Arc::new(LocalLedger::in_memory(LEDGER));
    let maker = client(&ledger, 1).await;
    let shipper = client(&ledger, 2).await;
    maker.register_product(register_req("LOT-1", "Honey")).await;

    let outcome = maker
        .transfer_product(transfer_req("LOT-1", me(&shipper), "Packhouse 1", "Port of Rotterdam"))
        .await;
    assert_eq!(outcome.message(), "Product LOT-1 transferred successfully!");

    let details = verified(&maker, "LOT-1").await;
    assert_eq!(details.product.transfer_count, 1);
    assert_eq!(details.product.current_custodian, me(&shipper));
    assert_eq!(details.product.current_location, "Port of Rotterdam");

    let event = &details.history[0].event;
    assert_eq!(event.from, me(&maker));
    assert_eq!(event.to, me(&shipper));
    assert_eq!(event.from_location, "Packhouse 1");
    assert_eq!(event.to_location, "Port of Rotterdam");
    assert_eq!(event.notes, "Packhouse 1 -> Port of Rotterdam");
    ledger.check_invariants().await.unwrap();
}

#[tokio::test]
async fn non_custodian_cannot_transfer() {
    let ledger = Arc::new(LocalLedger::in_memory(LEDGER));
    let maker = client(&ledger, 1).await;
    let thief = client(&ledger, 2).await;
    maker.register_product(register_req("LOT-1", "Honey")).await;

    let outcome = thief
        .transfer_product(transfer_req("LOT-1", me(&thief), "Packhouse 1", "Elsewhere"))
        .await;
    assert_eq!(outcome.class(), Some(ErrorClass::Authorization));
    assert!(outcome.message().starts_with("Transfer failed: CU_ERR_200"));
    assert_eq!(thief.view().error.as_deref(), Some(outcome.message()));

    let details = verified(&maker, "LOT-1").await;
    assert_eq!(details.product.transfer_count, 0);
    assert_eq!(details.product.current_custodian, me(&maker));
    assert_eq!(details.product.current_location, "Packhouse 1");
}

#[tokio::test]
async fn unknown_product_is_not_authentic() {
    let ledger = Arc::new(LocalLedger::in_memory(LEDGER));
    let reader = client(&ledger, 1).await;

    let outcome = reader.verify_product(&pid("NOPE")).await;
    assert_eq!(outcome.class(), Some(ErrorClass::NotFound));
    assert_eq!(outcome.message(), "Product not found or not authentic");

    let view = reader.view();
    assert!(view.product.is_none());
    assert_eq!(view.error.as_deref(), Some("Product not found or not authentic"));
}

#[tokio::test]
async fn failed_verification_clears_previous_product() {
    let ledger = Arc::new(LocalLedger::in_memory(LEDGER));
    let maker = client(&ledger, 1).await;
    maker.register_product(register_req("LOT-1", "Honey")).await;
    verified(&maker, "LOT-1").await;
    assert!(maker.view().product.is_some());

    maker.verify_product(&pid("NOPE")).await;
    assert!(maker.view().product.is_none());
}

/// Alternate custody between `a` and `b` for `hops` transfers.
async fn shuttle(a: &Client, b: &Client, id: &str, hops: usize) {
    for hop in 0..hops {
        let (from, to) = if hop % 2 == 0 { (a, b) } else { (b, a) };
        let outcome = from
            .transfer_product(transfer_req(id, me(to), &format!("hub-{hop}"), &format!("hub-{}", hop + 1)))
            .await;
        assert!(outcome.is_success(), "hop {hop}: {}", outcome.message());
    }
}

#[tokio::test]
async fn history_lists_every_transfer_in_order() {
    let ledger = Arc::new(LocalLedger::in_memory(LEDGER));
    let a = client(&ledger, 1).await;
    let b = client(&ledger, 2).await;
    a.register_product(register_req("LOT-9", "Saffron")).await;
    shuttle(&a, &b, "LOT-9", 5).await;

    let details = verified(&a, "LOT-9").await;
    assert_eq!(details.product.transfer_count, 5);
    assert!(details.is_complete());
    for (i, entry) in details.history.iter().enumerate() {
        assert_eq!(entry.index, i as u64);
        assert_eq!(entry.event.to_location, format!("hub-{}", i + 1));
    }
    assert_eq!(details.product.current_custodian, me(&b));
}

#[tokio::test]
async fn batched_history_matches_fan_out() {
    let ledger = Arc::new(LocalLedger::in_memory(LEDGER));
    let a = client(&ledger, 1).await;
    let b = client(&ledger, 2).await;
    a.register_product(register_req("LOT-9", "Saffron")).await;
    shuttle(&a, &b, "LOT-9", 3).await;

    let mut config = ClientConfig::new(LEDGER);
    config.batched_history = true;
    let batched = reader(Arc::clone(&ledger), config);

    let per_event = verified(&a, "LOT-9").await;
    let outcome = batched.verify_product(&pid("LOT-9")).await;
    assert_eq!(outcome.into_value().unwrap().history, per_event.history);
}

/// Shares a ledger but fails one event index on read.
struct DroppingLedger {
    inner: Arc<LocalLedger>,
    failing_index: u64,
}

#[async_trait]
impl CustodyLedger for DroppingLedger {
    fn address(&self) -> LedgerAddress {
        self.inner.address()
    }
    async fn next_nonce(&self, account: &AccountId) -> Result<u64> {
        self.inner.next_nonce(account).await
    }
    async fn submit(&self, call: SignedCall) -> Result<TxReceipt> {
        self.inner.submit(call).await
    }
    async fn verify_product(&self, product_id: &ProductId) -> Result<bool> {
        self.inner.verify_product(product_id).await
    }
    async fn product_info(&self, product_id: &ProductId) -> Result<Product> {
        self.inner.product_info(product_id).await
    }
    async fn get_transfer_event(&self, product_id: &ProductId, index: u64) -> Result<TransferEvent> {
        if index == self.failing_index {
            return Err(CustodyError::Io("upstream read failed".into()));
        }
        self.inner.get_transfer_event(product_id, index).await
    }
    async fn list_all(&self, call: SignedCall) -> Result<Vec<Product>> {
        self.inner.list_all(call).await
    }
}

#[tokio::test]
async fn unreadable_event_is_skipped_not_fatal() {
    let ledger = Arc::new(LocalLedger::in_memory(LEDGER));
    let a = client(&ledger, 1).await;
    let b = client(&ledger, 2).await;
    a.register_product(register_req("LOT-3", "Vanilla")).await;
    shuttle(&a, &b, "LOT-3", 4).await;

    let dropping = DroppingLedger {
        inner: Arc::clone(&ledger),
        failing_index: 2,
    };
    let reader = reader(dropping, ClientConfig::new(LEDGER));

    let outcome = reader.verify_product(&pid("LOT-3")).await;
    assert!(outcome.is_success());
    let details = outcome.into_value().unwrap();
    assert_eq!(details.product.transfer_count, 4);
    assert_eq!(details.product.name, "Vanilla");
    assert_eq!(details.history.len(), 3);
    assert_eq!(details.skipped, vec![2]);
    let indices: Vec<u64> = details.history.iter().map(|h| h.index).collect();
    assert_eq!(indices, vec![0, 1, 3]);
}

#[tokio::test]
async fn listing_requires_role() {
    let admin_key = test_signing_key(9);
    let admin = AccountId::from_verifying_key(&admin_key.verifying_key());
    let config = LedgerConfig {
        address: LEDGER,
        roles: vec![RoleGrant {
            account: admin,
            role: Role::Auditor,
        }],
        journal_path: None,
    };
    let ledger = Arc::new(LocalLedger::open(&config).unwrap());

    let maker = client(&ledger, 1).await;
    maker.register_product(register_req("LOT-1", "Honey")).await;
    maker.register_product(register_req("LOT-2", "Wax")).await;

    let denied = maker.list_all_products().await;
    assert_eq!(denied.class(), Some(ErrorClass::Authorization));
    assert!(denied.message().starts_with("Listing products failed: CU_ERR_202"));

    let auditor = client(&ledger, 9).await;
    assert_eq!(me(&auditor), admin);
    let listed = auditor.list_all_products().await;
    assert_eq!(listed.message(), "Found 2 products");
    let mut ids: Vec<String> = listed
        .into_value()
        .unwrap()
        .into_iter()
        .map(|p| p.product_id.to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["LOT-1", "LOT-2"]);

    // Listing never consumes the auditor's nonce.
    assert_eq!(ledger.next_nonce(&admin).await.unwrap(), 0);
}

#[tokio::test]
async fn list_all_rejects_other_calls() {
    let ledger = LocalLedger::in_memory(LEDGER);
    let key = test_signing_key(1);
    let call = SignedCall::sign(
        LedgerCall::Register(register_req("LOT-1", "Honey")),
        LEDGER,
        0,
        &key,
    )
    .unwrap();
    let err = ledger.list_all(call).await.unwrap_err();
    assert!(matches!(err, CustodyError::UnsupportedCall { .. }));
}

/// Yields before answering nonce reads and submissions, so joined actions
/// interleave at every await.
struct YieldingLedger(Arc<LocalLedger>);

#[async_trait]
impl CustodyLedger for YieldingLedger {
    fn address(&self) -> LedgerAddress {
        self.0.address()
    }
    async fn next_nonce(&self, account: &AccountId) -> Result<u64> {
        tokio::task::yield_now().await;
        self.0.next_nonce(account).await
    }
    async fn submit(&self, call: SignedCall) -> Result<TxReceipt> {
        tokio::task::yield_now().await;
        self.0.submit(call).await
    }
    async fn verify_product(&self, product_id: &ProductId) -> Result<bool> {
        self.0.verify_product(product_id).await
    }
    async fn product_info(&self, product_id: &ProductId) -> Result<Product> {
        self.0.product_info(product_id).await
    }
    async fn get_transfer_event(&self, product_id: &ProductId, index: u64) -> Result<TransferEvent> {
        self.0.get_transfer_event(product_id, index).await
    }
    async fn list_all(&self, call: SignedCall) -> Result<Vec<Product>> {
        tokio::task::yield_now().await;
        self.0.list_all(call).await
    }
}

#[tokio::test]
async fn concurrent_actions_on_one_client_do_not_share_a_nonce() {
    let admin_key = test_signing_key(1);
    let config = LedgerConfig {
        address: LEDGER,
        roles: vec![RoleGrant {
            account: AccountId::from_verifying_key(&admin_key.verifying_key()),
            role: Role::Admin,
        }],
        journal_path: None,
    };
    let ledger = Arc::new(LocalLedger::open(&config).unwrap());
    let receiver = client(&ledger, 2).await;

    let wallet = LocalWallet::new(vec![admin_key]).authorized();
    let maker =
        CustodyClient::new(ClientConfig::new(LEDGER), YieldingLedger(Arc::clone(&ledger)), Some(wallet))
            .unwrap();
    assert!(maker.init().await);
    assert!(maker.register_product(register_req("LOT-A", "Honey")).await.is_success());

    let (registered, transferred, listed) = tokio::join!(
        maker.register_product(register_req("LOT-B", "Wax")),
        maker.transfer_product(transfer_req("LOT-A", me(&receiver), "Packhouse 1", "Depot")),
        maker.list_all_products(),
    );
    assert!(registered.is_success(), "{}", registered.message());
    assert!(transferred.is_success(), "{}", transferred.message());
    assert!(listed.is_success(), "{}", listed.message());

    let signer = maker.session().account().unwrap();
    assert_eq!(ledger.next_nonce(&signer).await.unwrap(), 3);
    assert_eq!(ledger.block_height().await, 3);
    ledger.check_invariants().await.unwrap();
}
