//! LastWill Succession Module
//!
//! Time-locked succession ("dead-man's switch") for multi-owner custodial
//! wallets. When the owners stop transacting for longer than the inactivity
//! threshold, anyone may propose and then settle the wallet, after which each
//! registered heir claims their share.
//!
//! # Concepts
//!
//! - **Heartbeat**: every wallet transaction fires the [`ActivityGuard`],
//!   which resets the inactivity clock and bumps the liveness epoch
//! - **Propose**: first phase, allowed once the threshold has elapsed
//! - **Settle**: second phase, irreversible; opens the claim ledger
//! - **Claim**: fungible and native balances split between heirs,
//!   non-fungible items paid to their assigned heir
//!
//! # Lifecycle
//!
//! ```text
//!                      heartbeat (epoch + 1)
//!                 ┌──────────────────────────┐
//!                 v                          │
//!             ┌────────┐  propose  ┌──────────┐  settle   ┌─────────┐
//!  heartbeat  │ Active │ ────────> │ Proposed │ ────────> │ Settled │ (terminal)
//!  ─────────> └────────┘           └──────────┘           └─────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use lastwill_succession::{ActivityGuard, ModuleConfig, SuccessionModule, SystemClock};
//! use std::sync::Arc;
//!
//! let module = Arc::new(SuccessionModule::new(module_address, ModuleConfig::default(), SystemClock));
//! wallet.set_guard(Arc::new(ActivityGuard::new(module.clone())));
//! wallet.enable_module(module_address);
//!
//! // ... a year later, anyone can poke the switch
//! module.propose(&wallet_address)?;
//! module.settle(&wallet_address)?;
//! module.claim_fungible(&mut wallet, &token, &heir)?;
//! ```

pub mod assets;
pub mod clock;
pub mod config;
pub mod custody;
pub mod error;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod liveness;
pub mod module;
pub mod record;
pub mod state;
pub mod test_utils;
pub mod types;

pub use assets::{AssetConfiguration, ItemAssignment};
pub use clock::{Clock, ManualClock, SystemClock, DAY_SECS};
pub use config::{
    ConfigError, DistributionPolicy, ModuleConfig, DEFAULT_INACTIVITY_THRESHOLD_SECS,
    MAX_INACTIVITY_THRESHOLD_DAYS,
};
pub use custody::{AssetView, Custodian, CustodyError, TransactionGuard, WalletCall};
pub use error::SuccessionError;
pub use events::{EventQueue, SuccessionEvent, DEFAULT_EVENT_CAPACITY};
pub use guard::ActivityGuard;
pub use ledger::{AssetKey, ClaimLedger};
pub use liveness::{
    evaluate_batch, evaluate_liveness, LivenessAction, LivenessConfig, LivenessError,
    LivenessStatus,
};
pub use module::{ClaimReceipt, SuccessionModule};
pub use record::{SuccessionStatus, WalletSuccessionRecord};
pub use state::{StateError, SuccessionState, WalletState};
pub use types::{Address, AddressError, Amount, ItemId, Timestamp};
