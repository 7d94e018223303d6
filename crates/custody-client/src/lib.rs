//! # custody-client
//!
//! Client-side orchestration over a [`custody_ledger::CustodyLedger`].
//!
//! ## Architecture
//!
//! - **Session**: the wallet ([`AccountProvider`]) and the account writes are signed with
//! - **Actions**: one busy flag per [`ActionKind`], released by an RAII guard
//! - **History**: verification fan-out that skips unreadable transfer events
//! - **CustodyClient**: runs each action under a timeout and mirrors the result into [`ViewState`]
//!
//! Reads (verification) work without a session. Writes wait for the ledger's
//! [`custody_types::TxReceipt`] before reporting success.

pub mod action;
pub mod client;
pub mod history;
pub mod session;
pub mod telemetry;

pub use action::{ActionKind, ActionOutcome, BusyFlags, BusyGuard, ViewState, failure_message};
pub use client::CustodyClient;
pub use history::{HistoryEntry, ProductDetails, assemble_history, assemble_history_batched, display_time};
pub use session::{AccountProvider, LocalWallet, Session};
pub use telemetry::init_tracing;
