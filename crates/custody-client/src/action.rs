//! User actions, their busy flags, and the transient view state.
//!
//! Each [`ActionKind`] has one busy flag. While an action is in flight its
//! flag is held by a [`BusyGuard`]; a second trigger of the same action is
//! refused rather than queued. The guard clears the flag on drop, so the
//! flag is released whatever the outcome.

use std::sync::atomic::{AtomicBool, Ordering};

use custody_types::{CustodyError, ErrorClass, Result};

use crate::history::ProductDetails;

/// Something the user can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Connect,
    Register,
    Transfer,
    Verify,
    ListAll,
}

impl ActionKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Register => "register",
            Self::Transfer => "transfer",
            Self::Verify => "verify",
            Self::ListAll => "list_all",
        }
    }

    /// Prefix of the message shown when this action fails.
    #[must_use]
    pub fn failure_prefix(self) -> &'static str {
        match self {
            Self::Connect => "Failed to connect wallet",
            Self::Register => "Registration failed",
            Self::Transfer => "Transfer failed",
            Self::Verify => "Verification failed",
            Self::ListAll => "Listing products failed",
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Connect => 0,
            Self::Register => 1,
            Self::Transfer => 2,
            Self::Verify => 3,
            Self::ListAll => 4,
        }
    }
}

/// One busy flag per action kind.
#[derive(Debug, Default)]
pub struct BusyFlags {
    flags: [AtomicBool; 5],
}

impl BusyFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `kind` busy for the lifetime of the returned guard.
    ///
    /// # Errors
    /// Returns [`CustodyError::ActionInProgress`] if `kind` is already busy.
    pub fn try_acquire(&self, kind: ActionKind) -> Result<BusyGuard<'_>> {
        let flag = &self.flags[kind.slot()];
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CustodyError::ActionInProgress { action: kind.name() })?;
        Ok(BusyGuard { flag })
    }

    #[must_use]
    pub fn is_busy(&self, kind: ActionKind) -> bool {
        self.flags[kind.slot()].load(Ordering::Acquire)
    }
}

/// Holds one action's busy flag; clears it on drop.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// What the user currently sees. Lives only as long as the client.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub loading: bool,
    pub error: Option<String>,
    pub success: Option<String>,
    /// Result of the last successful verification.
    pub product: Option<ProductDetails>,
}

/// Result of one user action, already converted to a displayable message.
#[derive(Debug, Clone)]
pub enum ActionOutcome<T> {
    Succeeded { message: String, value: T },
    Failed { message: String, class: ErrorClass },
}

impl<T> ActionOutcome<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Succeeded { message, .. } | Self::Failed { message, .. } => message,
        }
    }

    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Succeeded { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Succeeded { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::Succeeded { .. } => None,
            Self::Failed { class, .. } => Some(*class),
        }
    }
}

/// The message shown for `err` when `kind` fails.
#[must_use]
pub fn failure_message(kind: ActionKind, err: &CustodyError) -> String {
    match (kind, err) {
        (ActionKind::Verify, CustodyError::ProductNotFound(_)) => {
            "Product not found or not authentic".to_string()
        }
        (_, CustodyError::ProviderUnavailable) => "No wallet provider is installed".to_string(),
        _ => format!("{}: {err}", kind.failure_prefix()),
    }
}
