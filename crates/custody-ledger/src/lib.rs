//! # custody-ledger
//!
//! The **custody ledger**: the system of record for product registration
//! and chain of custody.
//!
//! ## Architecture
//!
//! - **ProductRegistry**: products and their transfer events; checks then applies writes
//! - **NonceTracker**: per-account sequential nonces, blocks replayed calls
//! - **AccessControl**: role grants gating privileged reads
//! - **Journal**: hash-chained, fsync-ed record of committed writes, replayed on open
//! - **LocalLedger**: the [`CustodyLedger`] implementation tying them together
//!
//! ## Guarantees
//!
//! - A product ID is registered at most once; a duplicate is rejected, never merged
//! - Only the current custodian can transfer a product
//! - `transfer_count`, the event log, and custodian/location change together
//! - A write is acknowledged with a [`custody_types::TxReceipt`] only after it is final

pub mod access;
pub mod journal;
pub mod ledger;
pub mod nonce;
pub mod registry;

pub use access::AccessControl;
pub use journal::{Journal, JournalEntry};
pub use ledger::{CustodyLedger, LocalLedger};
pub use nonce::NonceTracker;
pub use registry::ProductRegistry;
