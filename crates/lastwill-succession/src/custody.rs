//! Collaborator contracts consumed by the module.
//!
//! The custodial wallet (signatures, nonces, owners) and the asset contracts
//! live outside this crate. The module only needs to read balances, ask the
//! wallet to execute transfers on its behalf, and be told when the wallet
//! transacts.

use crate::types::{Address, Amount, ItemId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a wallet or asset collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("Module {0} is not enabled on the wallet")]
    ModuleNotEnabled(Address),

    #[error("Insufficient balance: have {available}, need {requested}")]
    InsufficientBalance { available: Amount, requested: Amount },

    #[error("Item {item} of {asset} is not owned by {holder}")]
    NotItemOwner {
        asset: Address,
        item: ItemId,
        holder: Address,
    },

    #[error("Unknown asset: {0}")]
    UnknownAsset(Address),

    #[error("Call reverted: {0}")]
    Reverted(String),
}

/// A transfer the module asks the wallet to perform from its own holdings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletCall {
    /// Send native currency held by the wallet.
    NativeTransfer { to: Address, amount: Amount },
    /// `asset.transfer(to, amount)` executed by the wallet.
    FungibleTransfer {
        asset: Address,
        to: Address,
        amount: Amount,
    },
    /// `asset.transferFrom(wallet, to, item)` executed by the wallet.
    NonFungibleTransfer {
        asset: Address,
        to: Address,
        item: ItemId,
    },
}

/// Read-only view over balances and item ownership.
pub trait AssetView {
    /// Native currency balance of `holder`.
    fn native_balance(&self, holder: &Address) -> Amount;

    /// `asset.balanceOf(holder)`.
    fn fungible_balance(&self, asset: &Address, holder: &Address) -> Amount;

    /// `asset.ownerOf(item)`, `None` if the item does not exist.
    fn owner_of(&self, asset: &Address, item: ItemId) -> Option<Address>;
}

/// The custodial wallet, as seen by an enabled module.
pub trait Custodian: AssetView {
    /// The wallet's own address (the key of its succession record).
    fn address(&self) -> Address;

    /// Current transaction nonce.
    fn nonce(&self) -> u64;

    /// Whether `module` may execute transactions without owner signatures.
    fn is_module_enabled(&self, module: &Address) -> bool;

    /// Execute `call` on behalf of `module`.
    ///
    /// Module executions are not owner activity: implementations must not
    /// fire the transaction guard for them.
    fn exec_from_module(&mut self, module: &Address, call: WalletCall) -> Result<(), CustodyError>;
}

/// Hook a wallet invokes around every transaction it executes.
pub trait TransactionGuard: Send + Sync {
    fn on_transaction(&self, wallet: &Address);
}
