//! Restart scenarios: a journaled ledger is closed and reopened from disk.

use custody_ledger::{CustodyLedger, LocalLedger};
use custody_types::*;
use ed25519_dalek::SigningKey;
use tempfile::TempDir;

const LEDGER: LedgerAddress = LedgerAddress::from_bytes([0x11; 20]);

fn account(key: &SigningKey) -> AccountId {
    AccountId::from_verifying_key(&key.verifying_key())
}

fn pid(s: &str) -> ProductId {
    ProductId::new(s).unwrap()
}

fn config(dir: &TempDir) -> LedgerConfig {
    LedgerConfig {
        address: LEDGER,
        roles: Vec::new(),
        journal_path: Some(dir.path().join("custody.jsonl")),
    }
}

async fn send(ledger: &LocalLedger, key: &SigningKey, call: LedgerCall) -> Result<TxReceipt> {
    let nonce = ledger.next_nonce(&account(key)).await?;
    ledger.submit(SignedCall::sign(call, LEDGER, nonce, key)?).await
}

fn register(id: &str) -> LedgerCall {
    LedgerCall::Register(RegisterProduct {
        product_id: pid(id),
        name: "Wine case".into(),
        manufacturer: "Bodega Norte".into(),
        location: "Mendoza".into(),
    })
}

fn transfer(id: &str, to: AccountId, from: &str, dest: &str) -> LedgerCall {
    LedgerCall::Transfer(TransferProduct {
        product_id: pid(id),
        to,
        from_location: from.into(),
        to_location: dest.into(),
        notes: String::new(),
    })
}

#[tokio::test]
async fn reopened_ledger_restores_custody_state() {
    let dir = TempDir::new().unwrap();
    let winery = test_signing_key(1);
    let importer = test_signing_key(2);
    let retailer = test_signing_key(3);

    {
        let ledger = LocalLedger::open(&config(&dir)).unwrap();
        send(&ledger, &winery, register("CASE-1")).await.unwrap();
        send(&ledger, &winery, transfer("CASE-1", account(&importer), "Mendoza", "Rotterdam"))
            .await
            .unwrap();
        send(&ledger, &importer, transfer("CASE-1", account(&retailer), "Rotterdam", "Berlin"))
            .await
            .unwrap();
        // Rejected writes must not reach the journal.
        assert!(send(&ledger, &winery, register("CASE-1")).await.is_err());
        assert_eq!(ledger.block_height().await, 3);
    }

    let ledger = LocalLedger::open(&config(&dir)).unwrap();
    assert_eq!(ledger.block_height().await, 3);

    let product = ledger.verify(&pid("CASE-1")).await.unwrap().unwrap();
    assert_eq!(product.transfer_count, 2);
    assert_eq!(product.current_custodian, account(&retailer));
    assert_eq!(product.current_location, "Berlin");

    let history = ledger.transfer_history(&pid("CASE-1")).await.unwrap();
    assert_eq!(history[0].from, account(&winery));
    assert_eq!(history[1].to, account(&retailer));
    ledger.check_invariants().await.unwrap();

    // Nonces survive the restart, so an old call cannot be replayed.
    assert_eq!(ledger.next_nonce(&account(&winery)).await.unwrap(), 2);
    let replay = SignedCall::sign(register("CASE-1"), LEDGER, 0, &winery).unwrap();
    assert!(matches!(
        ledger.submit(replay).await.unwrap_err(),
        CustodyError::NonceReplay { .. }
    ));
}

#[tokio::test]
async fn writes_continue_after_reopen() {
    let dir = TempDir::new().unwrap();
    let maker = test_signing_key(7);

    {
        let ledger = LocalLedger::open(&config(&dir)).unwrap();
        send(&ledger, &maker, register("A")).await.unwrap();
    }
    {
        let ledger = LocalLedger::open(&config(&dir)).unwrap();
        let receipt = send(&ledger, &maker, register("B")).await.unwrap();
        assert_eq!(receipt.block_number, 2);
    }

    let ledger = LocalLedger::open(&config(&dir)).unwrap();
    assert_eq!(ledger.product_count().await, 2);
}

#[tokio::test]
async fn journal_for_another_ledger_is_rejected() {
    let dir = TempDir::new().unwrap();
    let maker = test_signing_key(7);
    {
        let ledger = LocalLedger::open(&config(&dir)).unwrap();
        send(&ledger, &maker, register("A")).await.unwrap();
    }

    let mut foreign = config(&dir);
    foreign.address = LedgerAddress::from_bytes([0x22; 20]);
    let err = LocalLedger::open(&foreign).err().unwrap();
    assert!(matches!(err, CustodyError::JournalCorrupt { line: 1, .. }), "got {err:?}");
}

#[tokio::test]
async fn ledger_reopens_after_torn_append() {
    use std::io::Write;

    let dir = TempDir::new().unwrap();
    let maker = test_signing_key(7);
    {
        let ledger = LocalLedger::open(&config(&dir)).unwrap();
        send(&ledger, &maker, register("A")).await.unwrap();
    }
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(dir.path().join("custody.jsonl"))
        .unwrap();
    file.write_all(br#"{"block_number":2,"call":{"ca"#).unwrap();
    drop(file);

    let ledger = LocalLedger::open(&config(&dir)).unwrap();
    assert_eq!(ledger.block_height().await, 1);
    assert!(ledger.verify_product(&pid("A")).await.unwrap());

    let receipt = send(&ledger, &maker, register("B")).await.unwrap();
    assert_eq!(receipt.block_number, 2);
    drop(ledger);
    assert_eq!(LocalLedger::open(&config(&dir)).unwrap().product_count().await, 2);
}
