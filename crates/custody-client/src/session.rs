//! Account session: which account (if any) signs this client's writes.
//!
//! The [`AccountProvider`] stands in for a wallet. It lists the accounts the
//! user has authorized, asks the user for access, and signs calls. Reads
//! never need a session; writes do.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use custody_types::{AccountId, CustodyError, LedgerAddress, LedgerCall, Result, SignedCall};
use ed25519_dalek::SigningKey;

/// A wallet holding account keys.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    /// Accounts the user has already authorized. Empty until access is granted.
    async fn list_accounts(&self) -> Result<Vec<AccountId>>;

    /// Ask the user to authorize access; returns the authorized accounts.
    async fn request_accounts(&self) -> Result<Vec<AccountId>>;

    /// Sign `call` for `ledger` at `nonce` with `account`'s key.
    async fn sign(
        &self,
        account: &AccountId,
        call: LedgerCall,
        ledger: LedgerAddress,
        nonce: u64,
    ) -> Result<SignedCall>;
}

/// In-process wallet backed by ed25519 keys held in memory.
pub struct LocalWallet {
    keys: Vec<SigningKey>,
    authorized: AtomicBool,
    reject_requests: bool,
}

impl LocalWallet {
    /// A wallet whose accounts are hidden until `request_accounts` is granted.
    #[must_use]
    pub fn new(keys: Vec<SigningKey>) -> Self {
        Self {
            keys,
            authorized: AtomicBool::new(false),
            reject_requests: false,
        }
    }

    /// A wallet with `count` freshly generated keys.
    #[must_use]
    pub fn generate(count: usize) -> Self {
        let mut rng = rand::rngs::OsRng;
        Self::new((0..count).map(|_| SigningKey::generate(&mut rng)).collect())
    }

    /// Start with access already granted.
    #[must_use]
    pub fn authorized(self) -> Self {
        self.authorized.store(true, Ordering::Release);
        self
    }

    /// Refuse every access request.
    #[must_use]
    pub fn rejecting(mut self) -> Self {
        self.reject_requests = true;
        self
    }

    /// Every account in the wallet, authorized or not.
    #[must_use]
    pub fn accounts(&self) -> Vec<AccountId> {
        self.keys
            .iter()
            .map(|k| AccountId::from_verifying_key(&k.verifying_key()))
            .collect()
    }

    fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Acquire)
    }
}

#[async_trait]
impl AccountProvider for LocalWallet {
    async fn list_accounts(&self) -> Result<Vec<AccountId>> {
        if self.is_authorized() {
            Ok(self.accounts())
        } else {
            Ok(Vec::new())
        }
    }

    async fn request_accounts(&self) -> Result<Vec<AccountId>> {
        if self.reject_requests {
            return Err(CustodyError::AccessRejected {
                reason: "user rejected the request".to_string(),
            });
        }
        self.authorized.store(true, Ordering::Release);
        Ok(self.accounts())
    }

    async fn sign(
        &self,
        account: &AccountId,
        call: LedgerCall,
        ledger: LedgerAddress,
        nonce: u64,
    ) -> Result<SignedCall> {
        if !self.is_authorized() {
            return Err(CustodyError::Unauthorized {
                reason: "wallet access not granted".to_string(),
            });
        }
        let key = self
            .keys
            .iter()
            .find(|k| AccountId::from_verifying_key(&k.verifying_key()) == *account)
            .ok_or(CustodyError::UnknownAccount(*account))?;
        SignedCall::sign(call, ledger, nonce, key)
    }
}

/// The connected account, if any, and the provider behind it.
pub struct Session<P> {
    provider: Option<P>,
    account: Mutex<Option<AccountId>>,
}

impl<P: AccountProvider> Session<P> {
    /// `provider` is `None` when no wallet is installed.
    #[must_use]
    pub fn new(provider: Option<P>) -> Self {
        Self {
            provider,
            account: Mutex::new(None),
        }
    }

    /// # Errors
    /// Returns [`CustodyError::ProviderUnavailable`] when no wallet is installed.
    pub fn provider(&self) -> Result<&P> {
        self.provider.as_ref().ok_or(CustodyError::ProviderUnavailable)
    }

    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    #[must_use]
    pub fn account(&self) -> Option<AccountId> {
        *self.account.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.account().is_some()
    }

    /// The account writes are signed with.
    ///
    /// # Errors
    /// Returns [`CustodyError::NotConnected`] without an active session.
    pub fn require_account(&self) -> Result<AccountId> {
        self.account().ok_or(CustodyError::NotConnected)
    }

    fn set_account(&self, account: Option<AccountId>) {
        *self.account.lock().unwrap_or_else(PoisonError::into_inner) = account;
    }

    /// Pick up an already-authorized account without prompting.
    /// Failures are logged and leave the session disconnected.
    pub async fn check_connected(&self) -> bool {
        let Some(provider) = self.provider.as_ref() else {
            return false;
        };
        match provider.list_accounts().await {
            Ok(accounts) => {
                if let Some(first) = accounts.first() {
                    self.set_account(Some(*first));
                    tracing::info!(account = %first.short(), "Existing session found");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Checking wallet connection failed"),
        }
        self.is_connected()
    }

    /// Request access and select the first authorized account.
    ///
    /// # Errors
    /// - `ProviderUnavailable` if no wallet is installed
    /// - `AccessRejected` if the user refuses
    /// - `NotConnected` if access was granted but no account exists
    pub async fn connect(&self) -> Result<AccountId> {
        let provider = self.provider()?;
        provider.request_accounts().await?;
        let account = provider
            .list_accounts()
            .await?
            .first()
            .copied()
            .ok_or(CustodyError::NotConnected)?;
        self.set_account(Some(account));
        Ok(account)
    }

    pub fn disconnect(&self) {
        self.set_account(None);
    }

    /// Sign `call` with the session's account.
    pub async fn sign(&self, call: LedgerCall, ledger: LedgerAddress, nonce: u64) -> Result<SignedCall> {
        let account = self.require_account()?;
        self.provider()?.sign(&account, call, ledger, nonce).await
    }
}
