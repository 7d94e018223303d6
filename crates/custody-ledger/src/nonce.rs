//! Per-account sequential nonces. A signed call is accepted only at its signer's next nonce.
//!
//! Each account's first call carries nonce 0 and every committed write
//! advances it by one. A nonce below the expected value has already been
//! used; a nonce above it would let calls commit out of order.

use std::collections::HashMap;

use custody_types::{AccountId, CustodyError, Result};

/// Tracks the next expected nonce for every account that has written.
#[derive(Default)]
pub struct NonceTracker {
    next: HashMap<AccountId, u64>,
}

impl NonceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The nonce `account` must sign its next call with.
    #[must_use]
    pub fn expected(&self, account: &AccountId) -> u64 {
        self.next.get(account).copied().unwrap_or(0)
    }

    /// Check `nonce` against the expected value without consuming it.
    ///
    /// # Errors
    /// - `NonceReplay` if `nonce` was already consumed
    /// - `NonceOutOfOrder` if `nonce` skips ahead
    pub fn check(&self, account: AccountId, nonce: u64) -> Result<()> {
        let expected = self.expected(&account);
        if nonce < expected {
            return Err(CustodyError::NonceReplay {
                account,
                nonce,
                expected,
            });
        }
        if nonce > expected {
            return Err(CustodyError::NonceOutOfOrder {
                account,
                nonce,
                expected,
            });
        }
        Ok(())
    }

    /// Consume the expected nonce of `account`.
    pub fn advance(&mut self, account: AccountId) {
        *self.next.entry(account).or_insert(0) += 1;
    }

    /// Number of accounts tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.next.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }
}
