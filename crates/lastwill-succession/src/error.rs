use crate::custody::CustodyError;
use crate::types::Address;
use thiserror::Error;

/// Rejections from succession operations.
///
/// Every failing operation leaves the wallet's record, configuration and
/// claim ledger exactly as they were.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SuccessionError {
    /// Not inactive long enough, or not in the state the operation needs.
    #[error("Wallet is not dead")]
    NotDead,

    #[error("A proposal already exists for the current epoch")]
    DuplicateProposal,

    #[error("Share already claimed")]
    Claimed,

    #[error("Not the registered heir")]
    NotHeir,

    #[error("Asset {0} is not registered for succession")]
    AssetNotRegistered(Address),

    #[error("Parallel inputs differ in length: {assets} assets, {items} items, {heirs} heirs")]
    LengthMismatch {
        assets: usize,
        items: usize,
        heirs: usize,
    },

    #[error("Module is not enabled on wallet {0}")]
    ModuleNotEnabled(Address),

    #[error("Wallet execution failed: {0}")]
    Execution(#[from] CustodyError),
}
