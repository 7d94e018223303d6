//! Configuration for ledgers and clients.
//!
//! Both configs are plain JSON documents; see the tests for examples.

use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{CustodyError, LedgerAddress, Result, RoleGrant, constants};

/// Configuration for a ledger instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Address clients must bind to and calls must be signed for.
    pub address: LedgerAddress,
    /// Role assignments (e.g. who may list all products).
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
    /// Append-only journal file. `None` keeps state in memory only.
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
}

impl LedgerConfig {
    /// An in-memory ledger with no roles.
    #[must_use]
    pub fn in_memory(address: LedgerAddress) -> Self {
        Self {
            address,
            roles: Vec::new(),
            journal_path: None,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CustodyError::Configuration(format!("ledger config: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CustodyError::Configuration(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }
}

/// Configuration for a client binding to one ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The only ledger this client talks to.
    pub ledger_address: LedgerAddress,
    /// Upper bound on every ledger call, in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Read verification history in one batched call, falling back to
    /// per-event reads on failure.
    #[serde(default)]
    pub batched_history: bool,
}

fn default_call_timeout_ms() -> u64 {
    constants::DEFAULT_CALL_TIMEOUT_MS
}

impl ClientConfig {
    #[must_use]
    pub fn new(ledger_address: LedgerAddress) -> Self {
        Self {
            ledger_address,
            call_timeout_ms: constants::DEFAULT_CALL_TIMEOUT_MS,
            batched_history: false,
        }
    }

    /// # Errors
    /// Returns [`CustodyError::Configuration`] if `timeout` rounds to zero
    /// milliseconds.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.validate()?;
        Ok(self)
    }

    /// Bounds shared by every way of building a client config.
    pub fn validate(&self) -> Result<()> {
        if self.call_timeout_ms == 0 {
            return Err(CustodyError::Configuration(
                "call_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CustodyError::Configuration(format!("client config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CustodyError::Configuration(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }
}
