//! Property tests: balance and escrow invariants hold across arbitrary
//! sequences of transfers, locks and unlocks.

use std::sync::Arc;

use lockable_ledger::{
    config::{Allocation, RoleConfig},
    LockableToken, ManualClock, RoleRegistry, TokenConfig,
};
use proptest::prelude::*;

type Token = LockableToken<RoleRegistry, Arc<ManualClock>>;

const ACCOUNTS: [&str; 3] = ["alice", "bob", "carol"];
const REASONS: [&str; 3] = ["vesting", "staking", "grant"];
const INITIAL: u64 = 1_000;

#[derive(Clone, Debug)]
enum Action {
    Transfer { from: usize, to: usize, amount: u64 },
    Lock { who: usize, reason: usize, amount: u64, duration: u64 },
    TransferWithLock { from: usize, to: usize, reason: usize, amount: u64, duration: u64 },
    Extend { who: usize, reason: usize, duration: u64 },
    Increase { who: usize, reason: usize, amount: u64 },
    Unlock { caller: usize, account: usize },
    Advance(u64),
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_action() -> impl Strategy<Value = Action> {
    let who = 0..ACCOUNTS.len();
    let reason = 0..REASONS.len();
    prop_oneof![
        (who.clone(), who.clone(), 0u64..400)
            .prop_map(|(from, to, amount)| Action::Transfer { from, to, amount }),
        (who.clone(), reason.clone(), 0u64..400, 0u64..50).prop_map(
            |(who, reason, amount, duration)| Action::Lock {
                who,
                reason,
                amount,
                duration
            }
        ),
        (who.clone(), who.clone(), reason.clone(), 0u64..400, 0u64..50).prop_map(
            |(from, to, reason, amount, duration)| Action::TransferWithLock {
                from,
                to,
                reason,
                amount,
                duration
            }
        ),
        (who.clone(), reason.clone(), 0u64..50)
            .prop_map(|(who, reason, duration)| Action::Extend { who, reason, duration }),
        (who.clone(), reason.clone(), 0u64..200)
            .prop_map(|(who, reason, amount)| Action::Increase { who, reason, amount }),
        (who.clone(), who).prop_map(|(caller, account)| Action::Unlock { caller, account }),
        (0u64..40).prop_map(Action::Advance),
    ]
}

fn fresh_token() -> (Token, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let accounts: Vec<String> = ACCOUNTS.iter().map(|a| a.to_string()).collect();
    let config = TokenConfig {
        roles: RoleConfig {
            whitelist: accounts.clone(),
            ..RoleConfig::default()
        },
        allocations: accounts
            .into_iter()
            .map(|account| Allocation {
                account,
                amount: INITIAL,
            })
            .collect(),
        ..TokenConfig::default()
    };
    let token = LockableToken::with_clock(config, Arc::clone(&clock)).unwrap();
    (token, clock)
}

fn apply(token: &Token, clock: &ManualClock, action: &Action) {
    // Rejections are expected; only the invariants matter here.
    let _ = match *action {
        Action::Transfer { from, to, amount } => {
            token.transfer(ACCOUNTS[from], ACCOUNTS[to], amount).map(|_| ())
        }
        Action::Lock {
            who,
            reason,
            amount,
            duration,
        } => token
            .lock(ACCOUNTS[who], REASONS[reason], amount, duration)
            .map(|_| ()),
        Action::TransferWithLock {
            from,
            to,
            reason,
            amount,
            duration,
        } => token
            .transfer_with_lock(ACCOUNTS[from], ACCOUNTS[to], REASONS[reason], amount, duration)
            .map(|_| ()),
        Action::Extend {
            who,
            reason,
            duration,
        } => token
            .extend_lock(ACCOUNTS[who], REASONS[reason], duration)
            .map(|_| ()),
        Action::Increase { who, reason, amount } => token
            .increase_lock_amount(ACCOUNTS[who], REASONS[reason], amount)
            .map(|_| ()),
        Action::Unlock { caller, account } => {
            token.unlock(ACCOUNTS[caller], ACCOUNTS[account]).map(|_| ())
        }
        Action::Advance(seconds) => {
            clock.advance(seconds);
            Ok(())
        }
    };
}

fn check_invariants(token: &Token) -> Result<(), TestCaseError> {
    let reader = ACCOUNTS[0];
    let snapshot = token.snapshot();
    prop_assert_eq!(snapshot.total_supply, INITIAL * ACCOUNTS.len() as u64);

    let mut escrowed = 0u64;
    let mut totals = 0u64;
    for account in ACCOUNTS {
        let spendable = token.balance_of(reader, account).unwrap();
        let unclaimed: u64 = token
            .locks_of(reader, account)
            .unwrap()
            .iter()
            .filter(|(_, record)| !record.claimed)
            .map(|(_, record)| record.amount)
            .sum();
        let total = token.total_balance_of(reader, account).unwrap();
        prop_assert_eq!(total, spendable + unclaimed);

        for reason in REASONS {
            let locked = token.tokens_locked(reader, account, reason).unwrap();
            let unlockable = token.tokens_unlockable(reader, account, reason).unwrap();
            prop_assert!(unlockable == 0 || unlockable == locked);
        }
        escrowed += unclaimed;
        totals += total;
    }
    prop_assert_eq!(snapshot.escrow_balance, escrowed);
    prop_assert_eq!(token.total_escrowed(), escrowed);
    prop_assert_eq!(totals, snapshot.total_supply);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn balances_and_escrow_stay_consistent(actions in prop::collection::vec(arb_action(), 1..60)) {
        let (token, clock) = fresh_token();
        for action in &actions {
            apply(&token, &clock, action);
            check_invariants(&token)?;
        }
    }

    #[test]
    fn draining_all_locks_restores_spendable_totals(actions in prop::collection::vec(arb_action(), 1..40)) {
        let (token, clock) = fresh_token();
        let totals_before: Vec<u64> = ACCOUNTS
            .iter()
            .map(|a| token.total_balance_of(ACCOUNTS[0], a).unwrap())
            .collect();
        prop_assert!(totals_before.iter().all(|t| *t == INITIAL));

        for action in &actions {
            apply(&token, &clock, action);
        }
        clock.advance(10_000);
        for account in ACCOUNTS {
            token.unlock(ACCOUNTS[0], account).unwrap();
            prop_assert_eq!(token.get_unlockable_tokens(ACCOUNTS[0], account).unwrap(), 0);
            prop_assert_eq!(
                token.balance_of(ACCOUNTS[0], account).unwrap(),
                token.total_balance_of(ACCOUNTS[0], account).unwrap()
            );
        }
        prop_assert_eq!(token.snapshot().escrow_balance, 0);
    }
}
