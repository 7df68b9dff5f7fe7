//! Deterministic replay of token operations against a manual clock.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    access::{Role, RoleRegistry},
    clock::ManualClock,
    ledger::{AccountId, Amount},
    locks::{LockRecord, Reason, Timestamp},
    token::{LockableToken, TokenError},
};

pub type ReplayToken = LockableToken<RoleRegistry, Arc<ManualClock>>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Transfer {
        caller: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Approve {
        caller: AccountId,
        spender: AccountId,
        amount: Amount,
    },
    TransferFrom {
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Mint {
        caller: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Burn {
        caller: AccountId,
        amount: Amount,
    },
    Lock {
        caller: AccountId,
        reason: Reason,
        amount: Amount,
        duration: u64,
    },
    TransferWithLock {
        caller: AccountId,
        to: AccountId,
        reason: Reason,
        amount: Amount,
        duration: u64,
    },
    ExtendLock {
        caller: AccountId,
        reason: Reason,
        duration: u64,
    },
    IncreaseLockAmount {
        caller: AccountId,
        reason: Reason,
        amount: Amount,
    },
    Unlock {
        caller: AccountId,
        account: AccountId,
    },
    Pause {
        caller: AccountId,
    },
    Unpause {
        caller: AccountId,
    },
    GrantRole {
        caller: AccountId,
        role: Role,
        account: AccountId,
    },
    RevokeRole {
        caller: AccountId,
        role: Role,
        account: AccountId,
    },
    RenounceRole {
        caller: AccountId,
        role: Role,
    },
    AdvanceClock {
        seconds: u64,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Transfer { .. } => "transfer",
            Operation::Approve { .. } => "approve",
            Operation::TransferFrom { .. } => "transfer_from",
            Operation::Mint { .. } => "mint",
            Operation::Burn { .. } => "burn",
            Operation::Lock { .. } => "lock",
            Operation::TransferWithLock { .. } => "transfer_with_lock",
            Operation::ExtendLock { .. } => "extend_lock",
            Operation::IncreaseLockAmount { .. } => "increase_lock_amount",
            Operation::Unlock { .. } => "unlock",
            Operation::Pause { .. } => "pause",
            Operation::Unpause { .. } => "unpause",
            Operation::GrantRole { .. } => "grant_role",
            Operation::RevokeRole { .. } => "revoke_role",
            Operation::RenounceRole { .. } => "renounce_role",
            Operation::AdvanceClock { .. } => "advance_clock",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<Amount>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lock: Option<LockRecord>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        now: Option<Timestamp>,
    },
    Failed {
        code: String,
        message: String,
    },
}

impl StepResult {
    fn done() -> Self {
        StepResult::Ok {
            amount: None,
            lock: None,
            now: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StepResult::Ok { .. })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: usize,
    pub op: String,
    #[serde(flatten)]
    pub result: StepResult,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Script {
    pub steps: Vec<Operation>,
}

impl Script {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Applies every step in order. A failed step is reported and skipped;
    /// it never stops the replay.
    pub fn run(&self, token: &ReplayToken) -> Vec<StepOutcome> {
        self.steps
            .iter()
            .enumerate()
            .map(|(step, operation)| {
                let result = match apply(token, operation) {
                    Ok(result) => result,
                    Err(err) => StepResult::Failed {
                        code: err.code().to_string(),
                        message: err.to_string(),
                    },
                };
                StepOutcome {
                    step,
                    op: operation.name().to_string(),
                    result,
                }
            })
            .collect()
    }
}

fn apply(token: &ReplayToken, operation: &Operation) -> Result<StepResult, TokenError> {
    let locked = |lock: LockRecord| StepResult::Ok {
        amount: None,
        lock: Some(lock),
        now: None,
    };
    match operation {
        Operation::Transfer { caller, to, amount } => {
            token.transfer(caller, to, *amount)?;
            Ok(StepResult::done())
        }
        Operation::Approve {
            caller,
            spender,
            amount,
        } => {
            token.approve(caller, spender, *amount)?;
            Ok(StepResult::done())
        }
        Operation::TransferFrom {
            caller,
            from,
            to,
            amount,
        } => {
            token.transfer_from(caller, from, to, *amount)?;
            Ok(StepResult::done())
        }
        Operation::Mint { caller, to, amount } => {
            token.mint(caller, to, *amount)?;
            Ok(StepResult::done())
        }
        Operation::Burn { caller, amount } => {
            token.burn(caller, *amount)?;
            Ok(StepResult::done())
        }
        Operation::Lock {
            caller,
            reason,
            amount,
            duration,
        } => token
            .lock(caller, reason, *amount, *duration)
            .map(locked),
        Operation::TransferWithLock {
            caller,
            to,
            reason,
            amount,
            duration,
        } => token
            .transfer_with_lock(caller, to, reason, *amount, *duration)
            .map(locked),
        Operation::ExtendLock {
            caller,
            reason,
            duration,
        } => token.extend_lock(caller, reason, *duration).map(locked),
        Operation::IncreaseLockAmount {
            caller,
            reason,
            amount,
        } => token
            .increase_lock_amount(caller, reason, *amount)
            .map(locked),
        Operation::Unlock { caller, account } => {
            let released = token.unlock(caller, account)?;
            Ok(StepResult::Ok {
                amount: Some(released),
                lock: None,
                now: None,
            })
        }
        Operation::Pause { caller } => {
            token.pause(caller)?;
            Ok(StepResult::done())
        }
        Operation::Unpause { caller } => {
            token.unpause(caller)?;
            Ok(StepResult::done())
        }
        Operation::GrantRole {
            caller,
            role,
            account,
        } => {
            token.grant_role(caller, *role, account)?;
            Ok(StepResult::done())
        }
        Operation::RevokeRole {
            caller,
            role,
            account,
        } => {
            token.revoke_role(caller, *role, account)?;
            Ok(StepResult::done())
        }
        Operation::RenounceRole { caller, role } => {
            token.renounce_role(caller, *role);
            Ok(StepResult::done())
        }
        Operation::AdvanceClock { seconds } => Ok(StepResult::Ok {
            amount: None,
            lock: None,
            now: Some(token.clock().advance(*seconds)),
        }),
    }
}
