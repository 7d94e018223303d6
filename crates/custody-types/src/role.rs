//! Role-based capabilities.
//!
//! Privileged operations are gated on a [`Capability`]. Accounts receive
//! capabilities only through granted [`Role`]s, which are configured per
//! ledger rather than compiled in.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AccountId;

/// A privileged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Bulk read of every registered product.
    ListAllProducts,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListAllProducts => write!(f, "LIST_ALL_PRODUCTS"),
        }
    }
}

/// A named bundle of capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    /// Read-only oversight.
    Auditor,
}

impl Role {
    #[must_use]
    pub fn grants(self, capability: Capability) -> bool {
        match (self, capability) {
            (Self::Admin | Self::Auditor, Capability::ListAllProducts) => true,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "ADMIN"),
            Self::Auditor => write!(f, "AUDITOR"),
        }
    }
}

/// One role assigned to one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub account: AccountId,
    pub role: Role,
}
