//! Error types for the custody ledger and its clients.
//!
//! All errors use the `CU_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Product / input errors
//! - 2xx: Authorization errors
//! - 3xx: Session / connection errors
//! - 4xx: Call lifecycle errors
//! - 9xx: General / internal errors

use std::fmt;

use thiserror::Error;

use crate::{AccountId, Capability, LedgerAddress, ProductId};

/// Central error enum for all custody operations.
#[derive(Debug, Error)]
pub enum CustodyError {
    // =================================================================
    // Product / Input Errors (1xx)
    // =================================================================
    /// No product with this ID has been registered.
    #[error("CU_ERR_100: Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A product with this ID already exists.
    #[error("CU_ERR_101: Product already registered: {0}")]
    DuplicateProduct(ProductId),

    /// A required field was empty or exceeded its bound.
    #[error("CU_ERR_102: Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// The requested transfer event index is past the product's history.
    #[error("CU_ERR_103: Transfer event {index} out of range for {product_id} (transfer count {transfer_count})")]
    EventIndexOutOfRange {
        product_id: ProductId,
        index: u64,
        transfer_count: u64,
    },

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// Transfer attempted by an account that does not hold custody.
    #[error("CU_ERR_200: Caller {caller} is not the current custodian of {product_id}")]
    NotCustodian {
        product_id: ProductId,
        caller: AccountId,
    },

    /// A write was attempted without an authenticated account.
    #[error("CU_ERR_201: Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// The caller holds no role granting the required capability.
    #[error("CU_ERR_202: Account {account} lacks capability {capability}")]
    MissingCapability {
        account: AccountId,
        capability: Capability,
    },

    /// The ed25519 signature on a call didn't verify.
    #[error("CU_ERR_203: Call signature verification failed")]
    SignatureInvalid,

    /// The call's nonce was already consumed (replay).
    #[error("CU_ERR_204: Nonce replay detected for {account}: nonce {nonce}, expected {expected}")]
    NonceReplay {
        account: AccountId,
        nonce: u64,
        expected: u64,
    },

    /// The call's nonce skips ahead of the account's next nonce.
    #[error("CU_ERR_205: Nonce out of order for {account}: nonce {nonce}, expected {expected}")]
    NonceOutOfOrder {
        account: AccountId,
        nonce: u64,
        expected: u64,
    },

    /// The call was signed for (or the client bound to) a different ledger.
    #[error("CU_ERR_206: Wrong ledger: expected {expected}, got {actual}")]
    WrongLedger {
        expected: LedgerAddress,
        actual: LedgerAddress,
    },

    // =================================================================
    // Session / Connection Errors (3xx)
    // =================================================================
    /// No account provider (wallet) is available.
    #[error("CU_ERR_300: Account provider is not available")]
    ProviderUnavailable,

    /// The provider returned no authorized accounts.
    #[error("CU_ERR_301: Wallet not connected")]
    NotConnected,

    /// The user (or provider) refused the access request.
    #[error("CU_ERR_302: Access request rejected: {reason}")]
    AccessRejected { reason: String },

    /// The provider has no key for the requested account.
    #[error("CU_ERR_303: Unknown account: {0}")]
    UnknownAccount(AccountId),

    // =================================================================
    // Call Lifecycle Errors (4xx)
    // =================================================================
    /// A ledger call did not complete within the configured timeout.
    #[error("CU_ERR_400: {operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The same action is already in flight.
    #[error("CU_ERR_401: {action} already in progress")]
    ActionInProgress { action: &'static str },

    /// The call kind is not accepted by this entry point.
    #[error("CU_ERR_402: Unsupported call: {reason}")]
    UnsupportedCall { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CU_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CU_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("CU_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (journal, config file).
    #[error("CU_ERR_903: I/O error: {0}")]
    Io(String),

    /// The journal's hash chain or sequence is broken.
    #[error("CU_ERR_904: Journal corrupt at line {line}: {reason}")]
    JournalCorrupt { line: usize, reason: String },
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CustodyError>;

/// Coarse failure classes surfaced to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Provider missing or access not granted.
    Connection,
    /// No session, wrong custodian, bad signature, missing capability.
    Authorization,
    /// The product (or event) does not exist.
    NotFound,
    /// A required field was missing or a duplicate key was supplied.
    InvalidInput,
    /// The ledger did not answer in time.
    Timeout,
    /// The action was already running.
    Busy,
    /// Everything else.
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "CONNECTION"),
            Self::Authorization => write!(f, "AUTHORIZATION"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::InvalidInput => write!(f, "INVALID_INPUT"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Busy => write!(f, "BUSY"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl CustodyError {
    /// Map this error onto its user-facing class.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ProductNotFound(_) | Self::EventIndexOutOfRange { .. } => ErrorClass::NotFound,
            Self::DuplicateProduct(_) | Self::InvalidInput { .. } | Self::UnsupportedCall { .. } => {
                ErrorClass::InvalidInput
            }
            Self::NotCustodian { .. }
            | Self::Unauthorized { .. }
            | Self::MissingCapability { .. }
            | Self::SignatureInvalid
            | Self::NonceReplay { .. }
            | Self::NonceOutOfOrder { .. }
            | Self::NotConnected
            | Self::UnknownAccount(_) => ErrorClass::Authorization,
            Self::ProviderUnavailable | Self::AccessRejected { .. } | Self::WrongLedger { .. } => {
                ErrorClass::Connection
            }
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::ActionInProgress { .. } => ErrorClass::Busy,
            Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_)
            | Self::JournalCorrupt { .. } => ErrorClass::Internal,
        }
    }
}

impl From<std::io::Error> for CustodyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CustodyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
