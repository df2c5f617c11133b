//! Post-settlement claim ledger.
//!
//! A pair is reserved before its payout executes and released only if the
//! wallet refuses the transfer. Once a payout succeeds the pair stays.

use crate::types::{Address, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Asset a pro-rata share is paid in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetKey {
    /// The chain's native currency.
    Native,
    /// A fungible asset contract.
    Fungible(Address),
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKey::Native => write!(f, "native"),
            AssetKey::Fungible(asset) => write!(f, "{}", asset),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLedger {
    /// `(asset, heir)` shares already paid.
    pub shares: BTreeSet<(AssetKey, Address)>,
    /// `(asset, item)` items already paid.
    pub items: BTreeSet<(Address, ItemId)>,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_share_claimed(&self, asset: &AssetKey, heir: &Address) -> bool {
        self.shares.contains(&(*asset, *heir))
    }

    pub fn is_item_claimed(&self, asset: &Address, item: ItemId) -> bool {
        self.items.contains(&(*asset, item))
    }

    /// Returns `false` if the pair was already recorded.
    pub fn record_share(&mut self, asset: AssetKey, heir: Address) -> bool {
        self.shares.insert((asset, heir))
    }

    /// Returns `false` if the pair was already recorded.
    pub fn record_item(&mut self, asset: Address, item: ItemId) -> bool {
        self.items.insert((asset, item))
    }

    /// Undo a reservation whose transfer failed.
    pub fn release_share(&mut self, asset: &AssetKey, heir: &Address) -> bool {
        self.shares.remove(&(*asset, *heir))
    }

    pub fn release_item(&mut self, asset: &Address, item: ItemId) -> bool {
        self.items.remove(&(*asset, item))
    }

    /// Number of listed heirs that already took their share of `asset`.
    pub fn claimed_count(&self, asset: &AssetKey, heirs: &[Address]) -> usize {
        heirs
            .iter()
            .filter(|heir| self.is_share_claimed(asset, heir))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty() && self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_are_one_time() {
        let mut ledger = ClaimLedger::new();
        let token = AssetKey::Fungible(Address::repeat_byte(1));
        let heir = Address::repeat_byte(10);

        assert!(ledger.is_empty());
        assert!(ledger.record_share(token, heir));
        assert!(!ledger.record_share(token, heir));
        assert!(ledger.is_share_claimed(&token, &heir));
        assert!(!ledger.is_share_claimed(&AssetKey::Native, &heir));

        assert!(ledger.record_item(Address::repeat_byte(5), 0));
        assert!(!ledger.record_item(Address::repeat_byte(5), 0));
        assert!(!ledger.is_item_claimed(&Address::repeat_byte(5), 1));
    }

    #[test]
    fn test_release_reopens_pair() {
        let mut ledger = ClaimLedger::new();
        let heir = Address::repeat_byte(10);
        ledger.record_share(AssetKey::Native, heir);
        ledger.record_item(Address::repeat_byte(5), 7);

        assert!(ledger.release_share(&AssetKey::Native, &heir));
        assert!(!ledger.release_share(&AssetKey::Native, &heir));
        assert!(ledger.release_item(&Address::repeat_byte(5), 7));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_claimed_count() {
        let mut ledger = ClaimLedger::new();
        let heirs = [Address::repeat_byte(10), Address::repeat_byte(11)];
        assert_eq!(ledger.claimed_count(&AssetKey::Native, &heirs), 0);
        ledger.record_share(AssetKey::Native, heirs[1]);
        assert_eq!(ledger.claimed_count(&AssetKey::Native, &heirs), 1);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut ledger = ClaimLedger::new();
        ledger.record_share(AssetKey::Native, Address::repeat_byte(10));
        ledger.record_share(AssetKey::Fungible(Address::repeat_byte(1)), Address::repeat_byte(11));
        ledger.record_item(Address::repeat_byte(5), 42);

        let json = serde_json::to_string(&ledger).unwrap();
        let restored: ClaimLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ledger);
    }
}
