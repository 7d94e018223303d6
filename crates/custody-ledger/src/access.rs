//! Role-based access control for privileged ledger operations.

use std::collections::{BTreeSet, HashMap};

use custody_types::{AccountId, Capability, CustodyError, Result, Role, RoleGrant};

/// Maps accounts to the roles granted to them.
#[derive(Debug, Default, Clone)]
pub struct AccessControl {
    grants: HashMap<AccountId, BTreeSet<Role>>,
}

impl AccessControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_grants(grants: &[RoleGrant]) -> Self {
        let mut acl = Self::new();
        for grant in grants {
            acl.grant(grant.account, grant.role);
        }
        acl
    }

    pub fn grant(&mut self, account: AccountId, role: Role) {
        self.grants.entry(account).or_default().insert(role);
    }

    #[must_use]
    pub fn has_capability(&self, account: &AccountId, capability: Capability) -> bool {
        self.grants
            .get(account)
            .is_some_and(|roles| roles.iter().any(|r| r.grants(capability)))
    }

    /// # Errors
    /// Returns [`CustodyError::MissingCapability`] if no role of `account`
    /// grants `capability`.
    pub fn require(&self, account: AccountId, capability: Capability) -> Result<()> {
        if self.has_capability(&account, capability) {
            Ok(())
        } else {
            Err(CustodyError::MissingCapability {
                account,
                capability,
            })
        }
    }
}
