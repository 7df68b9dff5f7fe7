//! Fungible-token ledger with reason-tagged, time-based locks.
//!
//! The crate is split into small pieces that the [`token::LockableToken`]
//! facade composes:
//!
//! * [`ledger`]: balances, allowances and total supply.
//! * [`locks`]: per-account lock records and the escrow moves behind
//!   lock, extend, increase and unlock.
//! * [`access`]: roles and the [`access::Authorizer`] capability.
//! * [`clock`]: the injected notion of "now".
//! * [`config`]: token metadata, roles and initial allocations.
//! * [`script`]: replayable operation scripts used by the CLI.

pub mod access;
pub mod clock;
pub mod config;
pub mod ledger;
pub mod locks;
pub mod script;
pub mod token;

pub use access::{Authorizer, Role, RoleRegistry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, TokenConfig};
pub use ledger::{AccountId, Amount, Ledger, LedgerError, LedgerEvent};
pub use locks::{LockBook, LockError, LockRecord, Reason, Timestamp};
pub use token::{LockableToken, TokenError, TokenSnapshot};
