use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    ledger::{AccountId, Amount, Ledger},
    locks::{LockBook, Reason, Timestamp},
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    /// Number of committed mutations.
    pub height: u64,
    /// Clock reading of the last committed mutation.
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccountView {
    pub spendable: Amount,
    pub locked: Amount,
    pub total: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockView {
    pub reason: Reason,
    pub amount: Amount,
    pub validity: Timestamp,
    pub claimed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub meta: SnapshotMetadata,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub paused: bool,
    pub total_supply: Amount,
    pub escrow_account: AccountId,
    pub escrow_balance: Amount,
    pub accounts: BTreeMap<AccountId, AccountView>,
    pub locks: BTreeMap<AccountId, Vec<LockView>>,
    pub events: usize,
    #[serde(with = "hex_root")]
    pub state_root: [u8; 32],
}

pub(crate) fn account_views(ledger: &Ledger, locks: &LockBook) -> BTreeMap<AccountId, AccountView> {
    let mut views: BTreeMap<AccountId, AccountView> = BTreeMap::new();
    let holders = ledger
        .balances()
        .keys()
        .chain(locks.accounts().keys())
        .filter(|account| account.as_str() != locks.escrow());
    for account in holders {
        if views.contains_key(account) {
            continue;
        }
        let spendable = ledger.balance_of(account);
        let locked = locks.locked_balance(account);
        views.insert(
            account.clone(),
            AccountView {
                spendable,
                locked,
                total: spendable.saturating_add(locked),
            },
        );
    }
    views
}

pub(crate) fn lock_views(locks: &LockBook) -> BTreeMap<AccountId, Vec<LockView>> {
    locks
        .accounts()
        .iter()
        .map(|(account, records)| {
            let views = records
                .iter()
                .map(|(reason, record)| LockView {
                    reason: reason.clone(),
                    amount: record.amount,
                    validity: record.validity,
                    claimed: record.claimed,
                })
                .collect();
            (account.clone(), views)
        })
        .collect()
}

/// Merkle root over every balance and every lock record, in key order.
pub(crate) fn compute_state_root(ledger: &Ledger, locks: &LockBook) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    let mut supply = Sha256::new();
    supply.update(b"supply");
    supply.update(ledger.total_supply().to_le_bytes());
    leaves.push(supply.finalize().into());

    for (account, balance) in ledger.balances() {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update((account.len() as u64).to_le_bytes());
        hasher.update(account.as_bytes());
        hasher.update(balance.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (account, records) in locks.accounts() {
        for (reason, record) in records.iter() {
            let mut hasher = Sha256::new();
            hasher.update(b"lock");
            hasher.update((account.len() as u64).to_le_bytes());
            hasher.update(account.as_bytes());
            hasher.update((reason.len() as u64).to_le_bytes());
            hasher.update(reason.as_bytes());
            hasher.update(record.amount.to_le_bytes());
            hasher.update(record.validity.to_le_bytes());
            hasher.update([record.claimed as u8]);
            leaves.push(hasher.finalize().into());
        }
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"lockable-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

mod hex_root {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("state root must be 32 bytes"))
    }
}
