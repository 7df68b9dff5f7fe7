use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ledger::{is_null_account, AccountId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Grants and revokes every role.
    Admin,
    Pauser,
    Minter,
    /// Allowed to call token operations at all.
    Whitelisted,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Pauser => "pauser",
            Role::Minter => "minter",
            Role::Whitelisted => "whitelisted",
        };
        f.write_str(name)
    }
}

/// Answers whether an already-authenticated principal may act.
pub trait Authorizer: Send + Sync {
    fn has_role(&self, principal: &str, role: Role) -> bool;

    fn is_authorized(&self, principal: &str) -> bool {
        self.has_role(principal, Role::Whitelisted)
    }
}

impl<T: Authorizer + ?Sized> Authorizer for Arc<T> {
    fn has_role(&self, principal: &str, role: Role) -> bool {
        (**self).has_role(principal, role)
    }

    fn is_authorized(&self, principal: &str) -> bool {
        (**self).is_authorized(principal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("{principal} lacks the {role} role")]
    MissingRole { principal: AccountId, role: Role },
    #[error("the null account cannot hold a role")]
    NullAccount,
}

/// In-memory role membership. Admins manage every role, including their own.
#[derive(Debug, Default)]
pub struct RoleRegistry {
    members: RwLock<BTreeMap<Role, BTreeSet<AccountId>>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members<I>(members: I) -> Self
    where
        I: IntoIterator<Item = (Role, AccountId)>,
    {
        let mut map: BTreeMap<Role, BTreeSet<AccountId>> = BTreeMap::new();
        for (role, account) in members {
            if !is_null_account(&account) {
                map.entry(role).or_default().insert(account);
            }
        }
        Self {
            members: RwLock::new(map),
        }
    }

    pub fn members(&self, role: Role) -> Vec<AccountId> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members
            .get(&role)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn require(&self, principal: &str, role: Role) -> Result<(), AccessError> {
        if self.has_role(principal, role) {
            Ok(())
        } else {
            Err(AccessError::MissingRole {
                principal: principal.to_string(),
                role,
            })
        }
    }

    /// Adds `account` to `role`. Returns `false` if it already held it.
    pub fn grant(&self, granter: &str, role: Role, account: &str) -> Result<bool, AccessError> {
        self.require(granter, Role::Admin)?;
        if is_null_account(account) {
            return Err(AccessError::NullAccount);
        }
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        let added = members.entry(role).or_default().insert(account.to_string());
        if added {
            info!(granter, %role, account, "role granted");
        }
        Ok(added)
    }

    /// Removes `account` from `role`. Returns `false` if it did not hold it.
    pub fn revoke(&self, revoker: &str, role: Role, account: &str) -> Result<bool, AccessError> {
        self.require(revoker, Role::Admin)?;
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        let removed = members
            .get_mut(&role)
            .map(|set| set.remove(account))
            .unwrap_or(false);
        if removed {
            info!(revoker, %role, account, "role revoked");
        }
        Ok(removed)
    }

    /// Drops `role` from `account` itself. Needs no admin.
    pub fn renounce(&self, account: &str, role: Role) -> bool {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        let removed = members
            .get_mut(&role)
            .map(|set| set.remove(account))
            .unwrap_or(false);
        if removed {
            info!(account, %role, "role renounced");
        }
        removed
    }
}

impl Authorizer for RoleRegistry {
    fn has_role(&self, principal: &str, role: Role) -> bool {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members
            .get(&role)
            .map(|set| set.contains(principal))
            .unwrap_or(false)
    }
}
