//! The lockable token: ledger, lock book, pause gate and authorization,
//! composed behind a single mutex so every operation commits atomically.

mod snapshot;

pub use snapshot::{AccountView, LockView, SnapshotMetadata, TokenSnapshot};

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::{
    access::{AccessError, Authorizer, Role, RoleRegistry},
    clock::{Clock, SystemClock},
    config::{ConfigError, TokenConfig},
    ledger::{AccountId, Amount, Ledger, LedgerError, LedgerEvent},
    locks::{LockBook, LockError, LockRecord, Reason, Timestamp},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is paused")]
    Paused,
    #[error("token is not paused")]
    NotPaused,
    #[error("{principal} is not authorized: missing the {role} role")]
    Unauthorized { principal: AccountId, role: Role },
    #[error("{account} is reserved for escrow")]
    ReservedAccount { account: AccountId },
    #[error(transparent)]
    Lock(LockError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<LockError> for TokenError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Ledger(inner) => TokenError::Ledger(inner),
            other => TokenError::Lock(other),
        }
    }
}

impl From<AccessError> for TokenError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::MissingRole { principal, role } => {
                TokenError::Unauthorized { principal, role }
            }
            AccessError::NullAccount => TokenError::Ledger(LedgerError::ZeroAddress),
        }
    }
}

impl TokenError {
    /// Stable machine-readable name of the failure.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Paused => "paused",
            TokenError::NotPaused => "not_paused",
            TokenError::Unauthorized { .. } => "unauthorized",
            TokenError::ReservedAccount { .. } => "reserved_account",
            TokenError::Lock(LockError::AlreadyLocked { .. }) => "already_locked",
            TokenError::Lock(LockError::NotLocked { .. }) => "not_locked",
            TokenError::Lock(LockError::ZeroAmount) => "zero_amount",
            TokenError::Lock(LockError::Overflow) => "overflow",
            TokenError::Lock(LockError::Ledger(inner)) | TokenError::Ledger(inner) => match inner {
                LedgerError::InsufficientBalance { .. } => "insufficient_balance",
                LedgerError::InsufficientAllowance { .. } => "insufficient_allowance",
                LedgerError::ZeroAddress => "zero_address",
                LedgerError::Overflow => "overflow",
            },
        }
    }
}

struct TokenState {
    ledger: Ledger,
    locks: LockBook,
    paused: bool,
    height: u64,
    last_timestamp: Timestamp,
}

/// A fungible token whose holders can lock part of their balance under a
/// reason until a validity timestamp.
///
/// Every operation takes the already-authenticated `caller`. Mutations are
/// rejected with [`TokenError::Paused`] while paused and with
/// [`TokenError::Unauthorized`] unless the caller is whitelisted. Reads go
/// through the same gates when [`TokenConfig::gate_reads`] is set.
pub struct LockableToken<A = RoleRegistry, C = SystemClock> {
    config: TokenConfig,
    access: A,
    clock: C,
    state: Mutex<TokenState>,
}

impl LockableToken<RoleRegistry, SystemClock> {
    pub fn from_config(config: TokenConfig) -> Result<Self, ConfigError> {
        LockableToken::with_clock(config, SystemClock)
    }
}

impl<C: Clock> LockableToken<RoleRegistry, C> {
    /// Builds a token whose roles come from `config.roles`.
    pub fn with_clock(config: TokenConfig, clock: C) -> Result<Self, ConfigError> {
        let roles = RoleRegistry::with_members(config.roles.members());
        LockableToken::new(config, roles, clock)
    }

    pub fn grant_role(&self, caller: &str, role: Role, account: &str) -> Result<bool, TokenError> {
        if account == self.config.escrow_account {
            return Err(self.reserved(account));
        }
        Ok(self.access.grant(caller, role, account)?)
    }

    pub fn revoke_role(&self, caller: &str, role: Role, account: &str) -> Result<bool, TokenError> {
        Ok(self.access.revoke(caller, role, account)?)
    }

    /// Drops `role` from `caller`. Returns `false` if it did not hold it.
    pub fn renounce_role(&self, caller: &str, role: Role) -> bool {
        self.access.renounce(caller, role)
    }
}

impl<A: Authorizer, C: Clock> LockableToken<A, C> {
    /// Validates `config` and mints its allocations.
    pub fn new(config: TokenConfig, access: A, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut ledger = Ledger::new();
        for allocation in &config.allocations {
            ledger
                .mint(&allocation.account, allocation.amount)
                .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        }
        info!(
            name = %config.name,
            symbol = %config.symbol,
            supply = ledger.total_supply(),
            escrow = %config.escrow_account,
            "token initialised"
        );
        let locks = LockBook::new(config.escrow_account.clone());
        Ok(Self {
            config,
            access,
            clock,
            state: Mutex::new(TokenState {
                ledger,
                locks,
                paused: false,
                height: 0,
                last_timestamp: 0,
            }),
        })
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn escrow_account(&self) -> &str {
        &self.config.escrow_account
    }

    fn state(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserved(&self, account: &str) -> TokenError {
        TokenError::ReservedAccount {
            account: account.to_string(),
        }
    }

    fn ensure_not_reserved(&self, account: &str) -> Result<(), TokenError> {
        if account == self.config.escrow_account {
            return Err(self.reserved(account));
        }
        Ok(())
    }

    fn ensure_role(&self, caller: &str, role: Role) -> Result<(), TokenError> {
        if caller == self.config.escrow_account || !self.access.has_role(caller, role) {
            return Err(TokenError::Unauthorized {
                principal: caller.to_string(),
                role,
            });
        }
        Ok(())
    }

    fn ensure_authorized(&self, caller: &str) -> Result<(), TokenError> {
        if caller == self.config.escrow_account || !self.access.is_authorized(caller) {
            return Err(TokenError::Unauthorized {
                principal: caller.to_string(),
                role: Role::Whitelisted,
            });
        }
        Ok(())
    }

    /// Runs `op` as one atomic unit behind the pause and whitelist gates.
    fn mutate<R>(
        &self,
        name: &'static str,
        caller: &str,
        op: impl FnOnce(&mut TokenState, Timestamp) -> Result<R, TokenError>,
    ) -> Result<R, TokenError> {
        let mut state = self.state();
        let result = self.commit(&mut *state, caller, op);
        match &result {
            Ok(_) => debug!(op = name, caller, height = state.height, "committed"),
            Err(err) => warn!(op = name, caller, code = err.code(), error = %err, "rejected"),
        }
        result
    }

    fn commit<R>(
        &self,
        state: &mut TokenState,
        caller: &str,
        op: impl FnOnce(&mut TokenState, Timestamp) -> Result<R, TokenError>,
    ) -> Result<R, TokenError> {
        if state.paused {
            return Err(TokenError::Paused);
        }
        self.ensure_authorized(caller)?;
        let now = self.clock.now();
        let value = op(state, now)?;
        state.height += 1;
        state.last_timestamp = now;
        Ok(value)
    }

    fn read<R>(
        &self,
        caller: &str,
        op: impl FnOnce(&TokenState, Timestamp) -> R,
    ) -> Result<R, TokenError> {
        let state = self.state();
        if self.config.gate_reads {
            if state.paused {
                return Err(TokenError::Paused);
            }
            self.ensure_authorized(caller)?;
        }
        Ok(op(&*state, self.clock.now()))
    }

    // ---------------------------------------------------------------------
    // Ledger operations
    // ---------------------------------------------------------------------

    pub fn transfer(&self, caller: &str, to: &str, amount: Amount) -> Result<(), TokenError> {
        self.mutate("transfer", caller, |state, _| {
            self.ensure_not_reserved(to)?;
            Ok(state.ledger.transfer(caller, to, amount)?)
        })
    }

    pub fn approve(&self, caller: &str, spender: &str, amount: Amount) -> Result<(), TokenError> {
        self.mutate("approve", caller, |state, _| {
            self.ensure_not_reserved(spender)?;
            Ok(state.ledger.approve(caller, spender, amount)?)
        })
    }

    pub fn increase_allowance(
        &self,
        caller: &str,
        spender: &str,
        added: Amount,
    ) -> Result<(), TokenError> {
        self.mutate("increase_allowance", caller, |state, _| {
            self.ensure_not_reserved(spender)?;
            Ok(state.ledger.increase_allowance(caller, spender, added)?)
        })
    }

    pub fn decrease_allowance(
        &self,
        caller: &str,
        spender: &str,
        subtracted: Amount,
    ) -> Result<(), TokenError> {
        self.mutate("decrease_allowance", caller, |state, _| {
            Ok(state.ledger.decrease_allowance(caller, spender, subtracted)?)
        })
    }

    pub fn transfer_from(
        &self,
        caller: &str,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.mutate("transfer_from", caller, |state, _| {
            self.ensure_not_reserved(from)?;
            self.ensure_not_reserved(to)?;
            Ok(state.ledger.transfer_from(caller, from, to, amount)?)
        })
    }

    pub fn mint(&self, caller: &str, to: &str, amount: Amount) -> Result<(), TokenError> {
        self.mutate("mint", caller, |state, _| {
            self.ensure_role(caller, Role::Minter)?;
            self.ensure_not_reserved(to)?;
            Ok(state.ledger.mint(to, amount)?)
        })
    }

    pub fn burn(&self, caller: &str, amount: Amount) -> Result<(), TokenError> {
        self.mutate("burn", caller, |state, _| Ok(state.ledger.burn(caller, amount)?))
    }

    pub fn burn_from(&self, caller: &str, from: &str, amount: Amount) -> Result<(), TokenError> {
        self.mutate("burn_from", caller, |state, _| {
            self.ensure_not_reserved(from)?;
            Ok(state.ledger.burn_from(caller, from, amount)?)
        })
    }

    // ---------------------------------------------------------------------
    // Lock operations
    // ---------------------------------------------------------------------

    /// Locks `amount` of the caller's spendable balance under `reason` for
    /// `duration` seconds from now.
    pub fn lock(
        &self,
        caller: &str,
        reason: &str,
        amount: Amount,
        duration: u64,
    ) -> Result<LockRecord, TokenError> {
        self.mutate("lock", caller, |state, now| {
            let TokenState { ledger, locks, .. } = state;
            Ok(locks.lock(ledger, caller, caller, reason, amount, duration, now)?)
        })
    }

    /// Escrows `amount` from the caller and locks it in favour of `to`.
    pub fn transfer_with_lock(
        &self,
        caller: &str,
        to: &str,
        reason: &str,
        amount: Amount,
        duration: u64,
    ) -> Result<LockRecord, TokenError> {
        self.mutate("transfer_with_lock", caller, |state, now| {
            self.ensure_not_reserved(to)?;
            let TokenState { ledger, locks, .. } = state;
            Ok(locks.lock(ledger, caller, to, reason, amount, duration, now)?)
        })
    }

    pub fn extend_lock(
        &self,
        caller: &str,
        reason: &str,
        duration: u64,
    ) -> Result<LockRecord, TokenError> {
        self.mutate("extend_lock", caller, |state, _| {
            let TokenState { ledger, locks, .. } = state;
            Ok(locks.extend_lock(ledger, caller, reason, duration)?)
        })
    }

    pub fn increase_lock_amount(
        &self,
        caller: &str,
        reason: &str,
        amount: Amount,
    ) -> Result<LockRecord, TokenError> {
        self.mutate("increase_lock_amount", caller, |state, _| {
            let TokenState { ledger, locks, .. } = state;
            Ok(locks.increase_lock_amount(ledger, caller, reason, amount)?)
        })
    }

    /// Returns every expired lock of `account` to its spendable balance.
    /// Anyone authorized may trigger this for any account.
    pub fn unlock(&self, caller: &str, account: &str) -> Result<Amount, TokenError> {
        self.mutate("unlock", caller, |state, now| {
            let TokenState { ledger, locks, .. } = state;
            let released = locks.unlock(ledger, account, now)?;
            if released > 0 {
                info!(account, released, "unlocked expired locks");
            }
            Ok(released)
        })
    }

    // ---------------------------------------------------------------------
    // Pause gate
    // ---------------------------------------------------------------------

    pub fn pause(&self, caller: &str) -> Result<(), TokenError> {
        self.ensure_role(caller, Role::Pauser)?;
        let mut state = self.state();
        if state.paused {
            return Err(TokenError::Paused);
        }
        state.paused = true;
        state.height += 1;
        state.last_timestamp = self.clock.now();
        state.ledger.record(LedgerEvent::Paused {
            by: caller.to_string(),
        });
        info!(by = caller, "token paused");
        Ok(())
    }

    pub fn unpause(&self, caller: &str) -> Result<(), TokenError> {
        self.ensure_role(caller, Role::Pauser)?;
        let mut state = self.state();
        if !state.paused {
            return Err(TokenError::NotPaused);
        }
        state.paused = false;
        state.height += 1;
        state.last_timestamp = self.clock.now();
        state.ledger.record(LedgerEvent::Unpaused {
            by: caller.to_string(),
        });
        info!(by = caller, "token unpaused");
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn total_supply(&self, caller: &str) -> Result<Amount, TokenError> {
        self.read(caller, |state, _| state.ledger.total_supply())
    }

    /// Spendable balance only; locked tokens are held by the escrow account.
    pub fn balance_of(&self, caller: &str, account: &str) -> Result<Amount, TokenError> {
        self.read(caller, |state, _| state.ledger.balance_of(account))
    }

    pub fn allowance(
        &self,
        caller: &str,
        owner: &str,
        spender: &str,
    ) -> Result<Amount, TokenError> {
        self.read(caller, |state, _| state.ledger.allowance(owner, spender))
    }

    /// Amount locked under `reason`, or 0 once claimed.
    pub fn tokens_locked(
        &self,
        caller: &str,
        account: &str,
        reason: &str,
    ) -> Result<Amount, TokenError> {
        self.read(caller, |state, _| state.locks.tokens_locked(account, reason))
    }

    /// Amount whose validity runs past `time`. Claimed records still count
    /// here, unlike [`LockableToken::tokens_locked`].
    pub fn tokens_locked_at_time(
        &self,
        caller: &str,
        account: &str,
        reason: &str,
        time: Timestamp,
    ) -> Result<Amount, TokenError> {
        self.read(caller, |state, _| {
            state.locks.tokens_locked_at_time(account, reason, time)
        })
    }

    pub fn tokens_unlockable(
        &self,
        caller: &str,
        account: &str,
        reason: &str,
    ) -> Result<Amount, TokenError> {
        self.read(caller, |state, now| {
            state.locks.tokens_unlockable(account, reason, now)
        })
    }

    pub fn total_balance_of(&self, caller: &str, account: &str) -> Result<Amount, TokenError> {
        self.read(caller, |state, _| {
            state.locks.total_balance_of(&state.ledger, account)
        })
    }

    pub fn get_unlockable_tokens(&self, caller: &str, account: &str) -> Result<Amount, TokenError> {
        self.read(caller, |state, now| state.locks.unlockable_tokens(account, now))
    }

    /// Lock records of `account` in the order their reasons were first used.
    pub fn locks_of(
        &self,
        caller: &str,
        account: &str,
    ) -> Result<Vec<(Reason, LockRecord)>, TokenError> {
        self.read(caller, |state, _| {
            state
                .locks
                .account(account)
                .map(|records| {
                    records
                        .iter()
                        .map(|(reason, record)| (reason.clone(), *record))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Reasons `account` has ever locked under, deduplicated, in first-use order.
    pub fn lock_reasons(&self, caller: &str, account: &str) -> Result<Vec<Reason>, TokenError> {
        self.read(caller, |state, _| {
            state
                .locks
                .account(account)
                .map(|records| records.reasons().to_vec())
                .unwrap_or_default()
        })
    }

    // ---------------------------------------------------------------------
    // Operator views
    // ---------------------------------------------------------------------

    pub fn snapshot(&self) -> TokenSnapshot {
        let state = self.state();
        TokenSnapshot {
            meta: SnapshotMetadata {
                height: state.height,
                timestamp: state.last_timestamp,
            },
            name: self.config.name.clone(),
            symbol: self.config.symbol.clone(),
            decimals: self.config.decimals,
            paused: state.paused,
            total_supply: state.ledger.total_supply(),
            escrow_account: self.config.escrow_account.clone(),
            escrow_balance: state.ledger.balance_of(&self.config.escrow_account),
            accounts: snapshot::account_views(&state.ledger, &state.locks),
            locks: snapshot::lock_views(&state.locks),
            events: state.ledger.events().len(),
            state_root: snapshot::compute_state_root(&state.ledger, &state.locks),
        }
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.state().ledger.events().to_vec()
    }

    /// Hands the accumulated events to an indexer and clears the log.
    pub fn drain_events(&self) -> Vec<LedgerEvent> {
        self.state().ledger.drain_events()
    }

    /// Sum of unclaimed locks across all accounts.
    pub fn total_escrowed(&self) -> Amount {
        self.state().locks.total_escrowed()
    }
}
