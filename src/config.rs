use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    access::Role,
    ledger::{is_null_account, AccountId, Amount},
};

pub const DEFAULT_ESCROW_ACCOUNT: &str = "lockable-ledger:escrow";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Account that holds escrowed (locked) tokens. Never usable as a caller.
    pub escrow_account: AccountId,
    /// Whether read operations go through the pause and whitelist gates.
    pub gate_reads: bool,
    pub roles: RoleConfig,
    /// Minted at construction, in order.
    pub allocations: Vec<Allocation>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "Lockable Token".to_string(),
            symbol: "LOCK".to_string(),
            decimals: 8,
            escrow_account: DEFAULT_ESCROW_ACCOUNT.to_string(),
            gate_reads: true,
            roles: RoleConfig::default(),
            allocations: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoleConfig {
    pub admins: Vec<AccountId>,
    pub pausers: Vec<AccountId>,
    pub minters: Vec<AccountId>,
    pub whitelist: Vec<AccountId>,
}

impl RoleConfig {
    pub fn members(&self) -> impl Iterator<Item = (Role, AccountId)> + '_ {
        let tagged = |role: Role, accounts: &[AccountId]| {
            accounts
                .iter()
                .cloned()
                .map(move |account| (role, account))
                .collect::<Vec<_>>()
        };
        tagged(Role::Admin, &self.admins)
            .into_iter()
            .chain(tagged(Role::Pauser, &self.pausers))
            .chain(tagged(Role::Minter, &self.minters))
            .chain(tagged(Role::Whitelisted, &self.whitelist))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Allocation {
    pub account: AccountId,
    pub amount: Amount,
}

impl TokenConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: TokenConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_null_account(&self.escrow_account) {
            return Err(ConfigError::Invalid("escrow_account must not be empty".into()));
        }
        for (role, account) in self.roles.members() {
            if account == self.escrow_account {
                return Err(ConfigError::Invalid(format!(
                    "escrow account cannot hold the {role} role"
                )));
            }
            if is_null_account(&account) {
                return Err(ConfigError::Invalid(format!(
                    "null account listed under the {role} role"
                )));
            }
        }
        let mut supply: Amount = 0;
        for allocation in &self.allocations {
            if is_null_account(&allocation.account) || allocation.account == self.escrow_account {
                return Err(ConfigError::Invalid(format!(
                    "allocation to reserved account {:?}",
                    allocation.account
                )));
            }
            supply = supply.checked_add(allocation.amount).ok_or_else(|| {
                ConfigError::Invalid("allocations overflow the total supply".into())
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = TokenConfig::from_json(r#"{"symbol": "VEST"}"#).unwrap();
        assert_eq!(config.symbol, "VEST");
        assert_eq!(config.escrow_account, DEFAULT_ESCROW_ACCOUNT);
        assert!(config.gate_reads);
        assert!(config.allocations.is_empty());
    }

    #[test]
    fn role_members_are_tagged() {
        let config = TokenConfig::from_json(
            r#"{"roles": {"admins": ["root"], "whitelist": ["alice", "bob"]}}"#,
        )
        .unwrap();
        let members: Vec<_> = config.roles.members().collect();
        assert_eq!(
            members,
            vec![
                (Role::Admin, "root".to_string()),
                (Role::Whitelisted, "alice".to_string()),
                (Role::Whitelisted, "bob".to_string()),
            ]
        );
    }

    #[test]
    fn escrow_cannot_be_whitelisted_or_funded() {
        let err = TokenConfig::from_json(
            r#"{"escrow_account": "vault", "roles": {"whitelist": ["vault"]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = TokenConfig::from_json(
            r#"{"escrow_account": "vault", "allocations": [{"account": "vault", "amount": 1}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn overflowing_allocations_are_rejected() {
        let raw = format!(
            r#"{{"allocations": [{{"account": "a", "amount": {max}}}, {{"account": "b", "amount": 1}}]}}"#,
            max = u64::MAX
        );
        assert!(matches!(
            TokenConfig::from_json(&raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            TokenConfig::from_json("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
