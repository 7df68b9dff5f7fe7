//! Reason-tagged, time-based balance locks.
//!
//! Locking moves tokens out of an account's spendable balance into an escrow
//! account owned by the token itself. The [`LockBook`] remembers, per account
//! and reason, how much was escrowed and from when it may be reclaimed.
//! Unlocking moves every expired, unclaimed amount back in one transfer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ledger::{is_null_account, AccountId, Amount, Ledger, LedgerError, LedgerEvent};

pub type Reason = String;
pub type Timestamp = u64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("tokens already locked for {account} under reason {reason:?}")]
    AlreadyLocked { account: AccountId, reason: Reason },
    #[error("no tokens locked for {account} under reason {reason:?}")]
    NotLocked { account: AccountId, reason: Reason },
    #[error("lock amount must be nonzero")]
    ZeroAmount,
    #[error("arithmetic overflow")]
    Overflow,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// One lock held by an account under one reason.
///
/// A record with `amount == 0` or `claimed == true` is inert: it does not
/// count towards the account's locked balance and a fresh lock under the
/// same reason overwrites it in place.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockRecord {
    pub amount: Amount,
    pub validity: Timestamp,
    pub claimed: bool,
}

impl LockRecord {
    pub fn is_active(&self) -> bool {
        self.amount != 0 && !self.claimed
    }

    /// Amount still held in escrow for this record.
    pub fn locked(&self) -> Amount {
        if self.claimed {
            0
        } else {
            self.amount
        }
    }

    /// Amount whose validity extends past `time`. Does not look at `claimed`.
    pub fn locked_at(&self, time: Timestamp) -> Amount {
        if self.validity > time {
            self.amount
        } else {
            0
        }
    }

    pub fn unlockable(&self, now: Timestamp) -> Amount {
        if self.validity <= now && !self.claimed {
            self.amount
        } else {
            0
        }
    }
}

/// Lock records of a single account.
///
/// `reasons` lists every reason the account ever locked under, in first-use
/// order and without duplicates; `records` holds the current record for each.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountLocks {
    reasons: Vec<Reason>,
    records: BTreeMap<Reason, LockRecord>,
}

impl AccountLocks {
    pub fn get(&self, reason: &str) -> Option<&LockRecord> {
        self.records.get(reason)
    }

    pub fn reasons(&self) -> &[Reason] {
        &self.reasons
    }

    /// Records in first-use order.
    pub fn iter(&self) -> impl Iterator<Item = (&Reason, &LockRecord)> {
        self.reasons
            .iter()
            .filter_map(move |reason| self.records.get(reason).map(|record| (reason, record)))
    }

    pub fn total_locked(&self) -> Amount {
        self.records
            .values()
            .fold(0, |acc: Amount, record| acc.saturating_add(record.locked()))
    }

    pub fn total_unlockable(&self, now: Timestamp) -> Amount {
        self.records
            .values()
            .fold(0, |acc: Amount, record| acc.saturating_add(record.unlockable(now)))
    }

    fn put(&mut self, reason: &str, record: LockRecord) {
        if !self.records.contains_key(reason) {
            self.reasons.push(reason.to_string());
        }
        self.records.insert(reason.to_string(), record);
    }
}

/// Lock state for every account, plus the id of the escrow account that
/// holds locked tokens on the ledger.
///
/// Mutating methods check every precondition before the escrow transfer and
/// write the record only after it succeeded, so an error leaves both the
/// book and the ledger untouched.
#[derive(Clone, Debug)]
pub struct LockBook {
    escrow: AccountId,
    accounts: BTreeMap<AccountId, AccountLocks>,
}

impl LockBook {
    pub fn new(escrow: impl Into<AccountId>) -> Self {
        Self {
            escrow: escrow.into(),
            accounts: BTreeMap::new(),
        }
    }

    pub fn escrow(&self) -> &str {
        &self.escrow
    }

    pub fn account(&self, account: &str) -> Option<&AccountLocks> {
        self.accounts.get(account)
    }

    pub fn accounts(&self) -> &BTreeMap<AccountId, AccountLocks> {
        &self.accounts
    }

    fn record(&self, account: &str, reason: &str) -> Option<&LockRecord> {
        self.accounts.get(account).and_then(|locks| locks.get(reason))
    }

    fn active_record(&self, account: &str, reason: &str) -> Result<LockRecord, LockError> {
        self.record(account, reason)
            .filter(|record| record.is_active())
            .copied()
            .ok_or_else(|| LockError::NotLocked {
                account: account.to_string(),
                reason: reason.to_string(),
            })
    }

    pub fn tokens_locked(&self, account: &str, reason: &str) -> Amount {
        self.record(account, reason).map_or(0, LockRecord::locked)
    }

    pub fn tokens_locked_at_time(&self, account: &str, reason: &str, time: Timestamp) -> Amount {
        self.record(account, reason)
            .map_or(0, |record| record.locked_at(time))
    }

    pub fn tokens_unlockable(&self, account: &str, reason: &str, now: Timestamp) -> Amount {
        self.record(account, reason)
            .map_or(0, |record| record.unlockable(now))
    }

    pub fn unlockable_tokens(&self, account: &str, now: Timestamp) -> Amount {
        self.accounts
            .get(account)
            .map_or(0, |locks| locks.total_unlockable(now))
    }

    pub fn locked_balance(&self, account: &str) -> Amount {
        self.accounts.get(account).map_or(0, AccountLocks::total_locked)
    }

    /// Spendable balance plus every unclaimed lock.
    pub fn total_balance_of(&self, ledger: &Ledger, account: &str) -> Amount {
        ledger
            .balance_of(account)
            .saturating_add(self.locked_balance(account))
    }

    /// Sum of all unclaimed locks across accounts. Equals the escrow balance.
    pub fn total_escrowed(&self) -> Amount {
        self.accounts
            .values()
            .fold(0, |acc: Amount, locks| acc.saturating_add(locks.total_locked()))
    }

    /// Escrows `amount` from `source` and records it as locked for
    /// `beneficiary` under `reason` until `now + duration`.
    ///
    /// `source == beneficiary` is a plain lock; otherwise this is a transfer
    /// with lock.
    #[allow(clippy::too_many_arguments)]
    pub fn lock(
        &mut self,
        ledger: &mut Ledger,
        source: &str,
        beneficiary: &str,
        reason: &str,
        amount: Amount,
        duration: u64,
        now: Timestamp,
    ) -> Result<LockRecord, LockError> {
        if amount == 0 {
            return Err(LockError::ZeroAmount);
        }
        if is_null_account(beneficiary) {
            return Err(LedgerError::ZeroAddress.into());
        }
        if self.tokens_locked(beneficiary, reason) != 0 {
            return Err(LockError::AlreadyLocked {
                account: beneficiary.to_string(),
                reason: reason.to_string(),
            });
        }
        let validity = now.checked_add(duration).ok_or(LockError::Overflow)?;

        ledger.transfer(source, &self.escrow, amount)?;

        let record = LockRecord {
            amount,
            validity,
            claimed: false,
        };
        self.accounts
            .entry(beneficiary.to_string())
            .or_default()
            .put(reason, record);
        ledger.record(LedgerEvent::Locked {
            account: beneficiary.to_string(),
            reason: reason.to_string(),
            amount,
            validity,
        });
        debug!(account = beneficiary, source, reason, amount, validity, "tokens locked");
        Ok(record)
    }

    pub fn extend_lock(
        &mut self,
        ledger: &mut Ledger,
        account: &str,
        reason: &str,
        duration: u64,
    ) -> Result<LockRecord, LockError> {
        let mut record = self.active_record(account, reason)?;
        record.validity = record
            .validity
            .checked_add(duration)
            .ok_or(LockError::Overflow)?;

        self.accounts
            .entry(account.to_string())
            .or_default()
            .put(reason, record);
        ledger.record(LedgerEvent::Locked {
            account: account.to_string(),
            reason: reason.to_string(),
            amount: record.amount,
            validity: record.validity,
        });
        debug!(account, reason, validity = record.validity, "lock extended");
        Ok(record)
    }

    pub fn increase_lock_amount(
        &mut self,
        ledger: &mut Ledger,
        account: &str,
        reason: &str,
        amount: Amount,
    ) -> Result<LockRecord, LockError> {
        let mut record = self.active_record(account, reason)?;
        record.amount = record
            .amount
            .checked_add(amount)
            .ok_or(LockError::Overflow)?;

        ledger.transfer(account, &self.escrow, amount)?;

        self.accounts
            .entry(account.to_string())
            .or_default()
            .put(reason, record);
        ledger.record(LedgerEvent::Locked {
            account: account.to_string(),
            reason: reason.to_string(),
            amount: record.amount,
            validity: record.validity,
        });
        debug!(account, reason, amount = record.amount, "lock increased");
        Ok(record)
    }

    /// Claims every expired lock of `account` and returns the escrowed total
    /// to its spendable balance. Returns the amount released.
    ///
    /// Records are marked claimed before the escrow transfer; if the
    /// transfer fails the marks and events are rolled back.
    pub fn unlock(
        &mut self,
        ledger: &mut Ledger,
        account: &str,
        now: Timestamp,
    ) -> Result<Amount, LockError> {
        let Some(locks) = self.accounts.get_mut(account) else {
            return Ok(0);
        };

        let mut released: Vec<(Reason, Amount)> = Vec::new();
        let mut total: Amount = 0;
        for (reason, record) in locks.iter() {
            let amount = record.unlockable(now);
            if amount > 0 {
                total = total.checked_add(amount).ok_or(LockError::Overflow)?;
                released.push((reason.clone(), amount));
            }
        }
        if total == 0 {
            return Ok(0);
        }

        let events_before = ledger.events().len();
        for (reason, amount) in &released {
            if let Some(record) = locks.records.get_mut(reason) {
                record.claimed = true;
            }
            ledger.record(LedgerEvent::Unlocked {
                account: account.to_string(),
                reason: reason.clone(),
                amount: *amount,
            });
        }

        if let Err(err) = ledger.transfer(&self.escrow, account, total) {
            for (reason, _) in &released {
                if let Some(record) = locks.records.get_mut(reason) {
                    record.claimed = false;
                }
            }
            ledger.truncate_events(events_before);
            return Err(err.into());
        }

        debug!(account, total, reasons = released.len(), "locks claimed");
        Ok(total)
    }
}
