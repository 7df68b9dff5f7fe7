use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type AccountId = String;
pub type Amount = u64;

/// The null account. It can never hold, send or receive tokens.
pub const NULL_ACCOUNT: &str = "";

pub fn is_null_account(account: &str) -> bool {
    account.is_empty()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient balance in account {account}: needed {needed}, available {available}")]
    InsufficientBalance {
        account: AccountId,
        needed: Amount,
        available: Amount,
    },
    #[error("insufficient allowance for {spender} on {owner}: needed {needed}, allowed {allowed}")]
    InsufficientAllowance {
        owner: AccountId,
        spender: AccountId,
        needed: Amount,
        allowed: Amount,
    },
    #[error("the null account cannot take part in a transfer or approval")]
    ZeroAddress,
    #[error("arithmetic overflow")]
    Overflow,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Approval {
        owner: AccountId,
        spender: AccountId,
        amount: Amount,
    },
    Mint {
        to: AccountId,
        amount: Amount,
    },
    Burn {
        from: AccountId,
        amount: Amount,
    },
    Locked {
        account: AccountId,
        reason: String,
        amount: Amount,
        validity: u64,
    },
    Unlocked {
        account: AccountId,
        reason: String,
        amount: Amount,
    },
    Paused {
        by: AccountId,
    },
    Unpaused {
        by: AccountId,
    },
}

/// Spendable balances, allowances and total supply.
///
/// Every mutating method validates all of its preconditions before touching
/// state, so a returned error always leaves the ledger unchanged.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    balances: BTreeMap<AccountId, Amount>,
    allowances: BTreeMap<AccountId, BTreeMap<AccountId, Amount>>,
    total_supply: Amount,
    events: Vec<LedgerEvent>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &str) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn allowance(&self, owner: &str, spender: &str) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn balances(&self) -> &BTreeMap<AccountId, Amount> {
        &self.balances
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn record(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub(crate) fn truncate_events(&mut self, len: usize) {
        self.events.truncate(len);
    }

    pub fn transfer(&mut self, from: &str, to: &str, amount: Amount) -> Result<(), LedgerError> {
        if is_null_account(from) || is_null_account(to) {
            return Err(LedgerError::ZeroAddress);
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from.to_string(),
                needed: amount,
                available,
            });
        }
        if from != to {
            self.balance_of(to)
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
        }

        self.balances.insert(from.to_string(), available - amount);
        *self.balances.entry(to.to_string()).or_insert(0) += amount;
        self.events.push(LedgerEvent::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        });
        Ok(())
    }

    pub fn approve(
        &mut self,
        owner: &str,
        spender: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if is_null_account(owner) || is_null_account(spender) {
            return Err(LedgerError::ZeroAddress);
        }
        self.allowances
            .entry(owner.to_string())
            .or_default()
            .insert(spender.to_string(), amount);
        self.events.push(LedgerEvent::Approval {
            owner: owner.to_string(),
            spender: spender.to_string(),
            amount,
        });
        Ok(())
    }

    pub fn increase_allowance(
        &mut self,
        owner: &str,
        spender: &str,
        added: Amount,
    ) -> Result<(), LedgerError> {
        let current = self.allowance(owner, spender);
        let updated = current.checked_add(added).ok_or(LedgerError::Overflow)?;
        self.approve(owner, spender, updated)
    }

    pub fn decrease_allowance(
        &mut self,
        owner: &str,
        spender: &str,
        subtracted: Amount,
    ) -> Result<(), LedgerError> {
        let current = self.allowance(owner, spender);
        let updated = current.checked_sub(subtracted).ok_or_else(|| {
            LedgerError::InsufficientAllowance {
                owner: owner.to_string(),
                spender: spender.to_string(),
                needed: subtracted,
                allowed: current,
            }
        })?;
        self.approve(owner, spender, updated)
    }

    fn check_allowance(
        &self,
        owner: &str,
        spender: &str,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        let allowed = self.allowance(owner, spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: owner.to_string(),
                spender: spender.to_string(),
                needed: amount,
                allowed,
            });
        }
        Ok(allowed - amount)
    }

    /// Moves `amount` from `from` to `to` on behalf of `spender`, consuming
    /// the allowance `from` granted to `spender`.
    pub fn transfer_from(
        &mut self,
        spender: &str,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if is_null_account(spender) {
            return Err(LedgerError::ZeroAddress);
        }
        let remaining = self.check_allowance(from, spender, amount)?;
        self.transfer(from, to, amount)?;
        self.approve(from, spender, remaining)
    }

    pub fn mint(&mut self, to: &str, amount: Amount) -> Result<(), LedgerError> {
        if is_null_account(to) {
            return Err(LedgerError::ZeroAddress);
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        self.total_supply = supply;
        self.balances.insert(to.to_string(), balance);
        self.events.push(LedgerEvent::Mint {
            to: to.to_string(),
            amount,
        });
        Ok(())
    }

    pub fn burn(&mut self, from: &str, amount: Amount) -> Result<(), LedgerError> {
        if is_null_account(from) {
            return Err(LedgerError::ZeroAddress);
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from.to_string(),
                needed: amount,
                available,
            });
        }

        self.balances.insert(from.to_string(), available - amount);
        // supply >= any single balance, so this cannot underflow
        self.total_supply -= amount;
        self.events.push(LedgerEvent::Burn {
            from: from.to_string(),
            amount,
        });
        Ok(())
    }

    pub fn burn_from(
        &mut self,
        spender: &str,
        from: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let remaining = self.check_allowance(from, spender, amount)?;
        self.burn(from, amount)?;
        self.approve(from, spender, remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(account: &str, amount: Amount) -> Ledger {
        let mut ledger = Ledger::new();
        ledger.mint(account, amount).unwrap();
        ledger
    }

    #[test]
    fn transfer_moves_balance_and_keeps_supply() {
        let mut ledger = funded("alice", 1_000);
        ledger.transfer("alice", "bob", 400).unwrap();
        assert_eq!(ledger.balance_of("alice"), 600);
        assert_eq!(ledger.balance_of("bob"), 400);
        assert_eq!(ledger.total_supply(), 1_000);
        assert_eq!(
            ledger.events().last(),
            Some(&LedgerEvent::Transfer {
                from: "alice".into(),
                to: "bob".into(),
                amount: 400,
            })
        );
    }

    #[test]
    fn transfer_rejects_overdraft_without_side_effects() {
        let mut ledger = funded("alice", 100);
        let events_before = ledger.events().len();
        let err = ledger.transfer("alice", "bob", 101).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                account: "alice".into(),
                needed: 101,
                available: 100,
            }
        );
        assert_eq!(ledger.balance_of("alice"), 100);
        assert_eq!(ledger.balance_of("bob"), 0);
        assert_eq!(ledger.events().len(), events_before);
    }

    #[test]
    fn null_account_is_rejected() {
        let mut ledger = funded("alice", 100);
        assert_eq!(
            ledger.transfer("alice", NULL_ACCOUNT, 1),
            Err(LedgerError::ZeroAddress)
        );
        assert_eq!(ledger.mint(NULL_ACCOUNT, 1), Err(LedgerError::ZeroAddress));
        assert_eq!(
            ledger.approve("alice", NULL_ACCOUNT, 1),
            Err(LedgerError::ZeroAddress)
        );
    }

    #[test]
    fn self_transfer_is_a_balance_noop() {
        let mut ledger = funded("alice", 50);
        ledger.transfer("alice", "alice", 50).unwrap();
        assert_eq!(ledger.balance_of("alice"), 50);
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let mut ledger = funded("alice", 1_000);
        ledger.approve("alice", "carol", 300).unwrap();
        ledger.transfer_from("carol", "alice", "bob", 200).unwrap();
        assert_eq!(ledger.allowance("alice", "carol"), 100);
        assert_eq!(ledger.balance_of("bob"), 200);

        let err = ledger.transfer_from("carol", "alice", "bob", 101).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAllowance { allowed: 100, .. }));
        assert_eq!(ledger.balance_of("bob"), 200);
    }

    #[test]
    fn transfer_from_keeps_allowance_when_balance_is_short() {
        let mut ledger = funded("alice", 10);
        ledger.approve("alice", "carol", 300).unwrap();
        assert!(ledger.transfer_from("carol", "alice", "bob", 20).is_err());
        assert_eq!(ledger.allowance("alice", "carol"), 300);
    }

    #[test]
    fn transfer_from_by_null_spender_leaves_ledger_untouched() {
        let mut ledger = funded("alice", 10);
        let events_before = ledger.events().len();
        assert_eq!(
            ledger.transfer_from(NULL_ACCOUNT, "alice", "bob", 0),
            Err(LedgerError::ZeroAddress)
        );
        assert_eq!(ledger.events().len(), events_before);
        assert_eq!(ledger.balance_of("alice"), 10);
    }

    #[test]
    fn allowance_adjustments() {
        let mut ledger = Ledger::new();
        ledger.increase_allowance("alice", "bob", 10).unwrap();
        ledger.increase_allowance("alice", "bob", 5).unwrap();
        assert_eq!(ledger.allowance("alice", "bob"), 15);
        ledger.decrease_allowance("alice", "bob", 15).unwrap();
        assert_eq!(ledger.allowance("alice", "bob"), 0);
        assert!(ledger.decrease_allowance("alice", "bob", 1).is_err());
    }

    #[test]
    fn mint_and_burn_track_supply() {
        let mut ledger = funded("alice", 500);
        ledger.mint("bob", 250).unwrap();
        assert_eq!(ledger.total_supply(), 750);
        ledger.burn("alice", 100).unwrap();
        assert_eq!(ledger.total_supply(), 650);
        assert!(ledger.burn("bob", 251).is_err());
        assert_eq!(ledger.mint("bob", Amount::MAX), Err(LedgerError::Overflow));
        assert_eq!(ledger.total_supply(), 650);
    }

    #[test]
    fn burn_from_requires_allowance() {
        let mut ledger = funded("alice", 500);
        assert!(ledger.burn_from("bob", "alice", 1).is_err());
        ledger.approve("alice", "bob", 100).unwrap();
        ledger.burn_from("bob", "alice", 60).unwrap();
        assert_eq!(ledger.balance_of("alice"), 440);
        assert_eq!(ledger.allowance("alice", "bob"), 40);
        assert_eq!(ledger.total_supply(), 440);
    }
}
