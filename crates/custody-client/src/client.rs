//! The custody client: one ledger, one session, one view.
//!
//! Every user action follows the same shape:
//!
//! ```text
//! acquire busy flag            (refused with ActionInProgress, view untouched)
//!   → loading = true, messages cleared
//!   → ledger call(s) under call_timeout
//!   → success message, or "<Action> failed: <reason>"
//!   → loading = false
//! ```
//!
//! Failures never escape an action; they come back as
//! [`ActionOutcome::Failed`] and are mirrored into the [`ViewState`].
//! Nothing is retried.
//!
//! Without a wallet provider every action fails with `ProviderUnavailable`.
//! With a provider but no connected account, verification still works.
//!
//! Signed calls from one client are serialized from `next_nonce` through
//! submission, so concurrent actions never sign with the same nonce.

use std::{
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use custody_ledger::CustodyLedger;
use custody_types::{
    AccountId, ClientConfig, CustodyError, LedgerCall, Product, ProductId, RegisterProduct, Result,
    SignedCall, TransferProduct, TxReceipt,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::action::{ActionKind, ActionOutcome, BusyFlags, ViewState, failure_message};
use crate::history::{ProductDetails, assemble_history, assemble_history_batched};
use crate::session::{AccountProvider, Session};

/// Client bound to exactly one ledger.
pub struct CustodyClient<L, P> {
    config: ClientConfig,
    ledger: L,
    session: Session<P>,
    busy: BusyFlags,
    /// Held from reading the nonce until the signed call is answered.
    signing: tokio::sync::Mutex<()>,
    view: Mutex<ViewState>,
}

impl<L: CustodyLedger, P: AccountProvider> CustodyClient<L, P> {
    /// Bind to `ledger`. `provider` is `None` when no wallet is installed.
    ///
    /// # Errors
    /// - `Configuration` if `config` is out of bounds
    /// - `WrongLedger` if `ledger` is not the ledger named in `config`
    pub fn new(config: ClientConfig, ledger: L, provider: Option<P>) -> Result<Self> {
        config.validate()?;
        let actual = ledger.address();
        if actual != config.ledger_address {
            return Err(CustodyError::WrongLedger {
                expected: config.ledger_address,
                actual,
            });
        }
        Ok(Self {
            config,
            ledger,
            session: Session::new(provider),
            busy: BusyFlags::new(),
            signing: tokio::sync::Mutex::new(()),
            view: Mutex::new(ViewState::default()),
        })
    }

    /// Pick up an existing wallet session without prompting the user.
    pub async fn init(&self) -> bool {
        let connected = self.session.check_connected().await;
        if !self.session.has_provider() {
            self.update_view(|view| {
                view.error = Some(failure_message(
                    ActionKind::Connect,
                    &CustodyError::ProviderUnavailable,
                ));
            });
        }
        connected
    }

    /// Snapshot of the current view state.
    #[must_use]
    pub fn view(&self) -> ViewState {
        self.lock_view().clone()
    }

    #[must_use]
    pub fn session(&self) -> &Session<P> {
        &self.session
    }

    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn is_busy(&self, kind: ActionKind) -> bool {
        self.busy.is_busy(kind)
    }

    // -----------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------

    /// Ask the wallet for access and select its first account.
    pub async fn connect_wallet(&self) -> ActionOutcome<AccountId> {
        self.run(ActionKind::Connect, self.session.connect(), |_, account| {
            format!("Wallet connected: {account}")
        })
        .await
    }

    /// Register a new product with the connected account as custodian.
    pub async fn register_product(&self, req: RegisterProduct) -> ActionOutcome<TxReceipt> {
        let product_id = req.product_id.clone();
        let op = async move {
            req.validate()?;
            self.submit_write(LedgerCall::Register(req)).await
        };
        self.run(ActionKind::Register, op, move |_, _| {
            format!("Product {product_id} registered successfully!")
        })
        .await
    }

    /// Hand custody of a product to another account.
    pub async fn transfer_product(&self, req: TransferProduct) -> ActionOutcome<TxReceipt> {
        let product_id = req.product_id.clone();
        let op = async move {
            req.validate()?;
            self.submit_write(LedgerCall::Transfer(req)).await
        };
        self.run(ActionKind::Transfer, op, move |_, _| {
            format!("Product {product_id} transferred successfully!")
        })
        .await
    }

    /// Check a product is registered and assemble its custody history.
    /// Needs a wallet provider but no connected account.
    pub async fn verify_product(&self, product_id: &ProductId) -> ActionOutcome<ProductDetails> {
        let op = async {
            if !self.ledger.verify_product(product_id).await? {
                return Err(CustodyError::ProductNotFound(product_id.clone()));
            }
            let product = self.ledger.product_info(product_id).await?;
            let details = if self.config.batched_history {
                assemble_history_batched(&self.ledger, product).await
            } else {
                assemble_history(&self.ledger, product).await
            };
            Ok(details)
        };
        self.run(ActionKind::Verify, op, |view, details| {
            view.product = Some(details.clone());
            "Product verification successful!".to_string()
        })
        .await
    }

    /// Every registered product. Requires an account holding
    /// `ListAllProducts`.
    pub async fn list_all_products(&self) -> ActionOutcome<Vec<Product>> {
        let op = async {
            let _signing = self.signing.lock().await;
            let signed = self.sign_at_current_nonce(LedgerCall::ListAll).await?;
            self.ledger.list_all(signed).await
        };
        self.run(ActionKind::ListAll, op, |_, products| {
            format!("Found {} products", products.len())
        })
        .await
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    async fn sign_at_current_nonce(&self, call: LedgerCall) -> Result<SignedCall> {
        let account = self.session.require_account()?;
        let nonce = self.ledger.next_nonce(&account).await?;
        self.session.sign(call, self.ledger.address(), nonce).await
    }

    /// Sign and submit a write, returning once the ledger reports it final.
    async fn submit_write(&self, call: LedgerCall) -> Result<TxReceipt> {
        let _signing = self.signing.lock().await;
        let signed = self.sign_at_current_nonce(call).await?;
        let receipt = self.ledger.submit(signed).await?;
        tracing::debug!(
            tx_hash = %receipt.tx_hash,
            block = receipt.block_number,
            "Write acknowledged"
        );
        Ok(receipt)
    }

    /// Connecting waits on the user, so only ledger-bound actions are timed.
    fn time_limit(&self, kind: ActionKind) -> Option<Duration> {
        (kind != ActionKind::Connect).then(|| self.config.call_timeout())
    }

    async fn run<T, F, S>(&self, kind: ActionKind, op: F, on_success: S) -> ActionOutcome<T>
    where
        F: Future<Output = Result<T>>,
        S: FnOnce(&mut ViewState, &T) -> String,
    {
        let _guard = match self.busy.try_acquire(kind) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::debug!(action = kind.name(), "Action already in progress");
                return ActionOutcome::Failed {
                    message: failure_message(kind, &e),
                    class: e.class(),
                };
            }
        };

        let span = tracing::info_span!(
            "action",
            action = kind.name(),
            action_id = %Uuid::now_v7()
        );

        async move {
            self.update_view(|view| {
                view.loading = true;
                view.error = None;
                view.success = None;
                if kind == ActionKind::Verify {
                    view.product = None;
                }
            });

            let result = if !self.session.has_provider() {
                Err(CustodyError::ProviderUnavailable)
            } else if let Some(limit) = self.time_limit(kind) {
                tokio::time::timeout(limit, op).await.unwrap_or_else(|_| {
                    Err(CustodyError::Timeout {
                        operation: kind.name(),
                        timeout_ms: self.config.call_timeout_ms,
                    })
                })
            } else {
                op.await
            };

            let mut view = self.lock_view();
            view.loading = false;
            match result {
                Ok(value) => {
                    let message = on_success(&mut view, &value);
                    view.success = Some(message.clone());
                    tracing::info!(%message, "Action succeeded");
                    ActionOutcome::Succeeded { message, value }
                }
                Err(e) => {
                    let message = failure_message(kind, &e);
                    view.error = Some(message.clone());
                    let class = e.class();
                    tracing::warn!(error = %e, %class, "Action failed");
                    ActionOutcome::Failed { message, class }
                }
            }
        }
        .instrument(span)
        .await
    }

    fn lock_view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_view(&self, f: impl FnOnce(&mut ViewState)) {
        f(&mut self.lock_view());
    }
}
