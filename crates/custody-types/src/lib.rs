//! # custody-types
//!
//! Shared types, errors, and configuration for the **custody ledger**.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`ProductId`], [`AccountId`], [`LedgerAddress`], [`TxHash`]
//! - **Product model**: [`Product`], [`TransferEvent`], [`RegisterProduct`], [`TransferProduct`]
//! - **Calls**: [`LedgerCall`], [`SignedCall`], [`TxReceipt`]
//! - **Access control**: [`Role`], [`Capability`], [`RoleGrant`]
//! - **Configuration**: [`LedgerConfig`], [`ClientConfig`]
//! - **Errors**: [`CustodyError`] with `CU_ERR_` prefix codes, [`ErrorClass`]
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod product;
pub mod role;
pub mod tx;

pub use config::*;
pub use error::*;
pub use ids::*;
pub use product::*;
pub use role::*;
pub use tx::*;

// Constants are accessed via `custody_types::constants::FOO`.
