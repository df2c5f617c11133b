//! Per-wallet asset and heir registration.
//!
//! Owners self-declare which fungible assets are covered, who shares them,
//! and which heir receives each non-fungible item. Nothing here checks that
//! the wallet actually holds what it registers.

use crate::error::SuccessionError;
use crate::types::{Address, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single non-fungible item assigned to an heir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAssignment {
    pub asset: Address,
    pub item: ItemId,
    pub heir: Address,
}

/// Asset configuration of one wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfiguration {
    /// Registered fungible assets, in registration order, without duplicates.
    pub fungible_assets: Vec<Address>,
    /// Heirs sharing fungible and native balances equally.
    pub fungible_heirs: Vec<Address>,
    /// `(asset, item) -> heir`
    #[serde(with = "item_heirs_serde")]
    pub item_heirs: BTreeMap<(Address, ItemId), Address>,
}

/// JSON maps need string keys, so persist item heirs as a list.
mod item_heirs_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(
        value: &BTreeMap<(Address, ItemId), Address>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let entries: Vec<ItemAssignment> = value
            .iter()
            .map(|(&(asset, item), &heir)| ItemAssignment { asset, item, heir })
            .collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<(Address, ItemId), Address>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<ItemAssignment>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|a| ((a.asset, a.item), a.heir))
            .collect())
    }
}

/// Drop repeated entries, keeping the first occurrence's position.
fn dedup_ordered(items: impl IntoIterator<Item = Address>) -> Vec<Address> {
    let mut out: Vec<Address> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

impl AssetConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registered fungible assets wholesale.
    pub fn set_fungible_assets(&mut self, assets: impl IntoIterator<Item = Address>) {
        self.fungible_assets = dedup_ordered(assets);
    }

    /// Replace the fungible heir set wholesale. Repeating the same list is a no-op.
    pub fn set_fungible_heirs(&mut self, heirs: impl IntoIterator<Item = Address>) {
        self.fungible_heirs = dedup_ordered(heirs);
    }

    /// Register item heirs from parallel slices, overwriting existing keys.
    ///
    /// Nothing is written unless all three slices have the same length.
    pub fn assign_items(
        &mut self,
        assets: &[Address],
        items: &[ItemId],
        heirs: &[Address],
    ) -> Result<Vec<ItemAssignment>, SuccessionError> {
        if assets.len() != items.len() || assets.len() != heirs.len() {
            return Err(SuccessionError::LengthMismatch {
                assets: assets.len(),
                items: items.len(),
                heirs: heirs.len(),
            });
        }

        let assignments: Vec<ItemAssignment> = assets
            .iter()
            .zip(items)
            .zip(heirs)
            .map(|((&asset, &item), &heir)| ItemAssignment { asset, item, heir })
            .collect();

        for a in &assignments {
            self.item_heirs.insert((a.asset, a.item), a.heir);
        }
        Ok(assignments)
    }

    pub fn is_fungible_asset(&self, asset: &Address) -> bool {
        self.fungible_assets.contains(asset)
    }

    pub fn is_fungible_heir(&self, heir: &Address) -> bool {
        self.fungible_heirs.contains(heir)
    }

    pub fn heir_count(&self) -> usize {
        self.fungible_heirs.len()
    }

    /// Heir assigned to `(asset, item)`, if any.
    pub fn item_heir(&self, asset: &Address, item: ItemId) -> Option<Address> {
        self.item_heirs.get(&(*asset, item)).copied()
    }

    /// All items assigned to `heir`.
    pub fn items_for(&self, heir: &Address) -> Vec<(Address, ItemId)> {
        self.item_heirs
            .iter()
            .filter(|(_, h)| *h == heir)
            .map(|(key, _)| *key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn test_fungible_assets_replaced_and_deduplicated() {
        let mut config = AssetConfiguration::new();
        config.set_fungible_assets([addr(1), addr(2), addr(1)]);
        assert_eq!(config.fungible_assets, vec![addr(1), addr(2)]);

        config.set_fungible_assets([addr(3)]);
        assert_eq!(config.fungible_assets, vec![addr(3)]);
        assert!(!config.is_fungible_asset(&addr(1)));
    }

    #[test]
    fn test_set_heirs_twice_is_idempotent() {
        let mut config = AssetConfiguration::new();
        config.set_fungible_heirs([addr(10), addr(11)]);
        let first = config.clone();
        config.set_fungible_heirs([addr(10), addr(11)]);
        assert_eq!(config, first);
        assert_eq!(config.heir_count(), 2);
        assert!(config.is_fungible_heir(&addr(11)));
    }

    #[test]
    fn test_assign_items_overwrites() {
        let mut config = AssetConfiguration::new();
        config
            .assign_items(&[addr(5), addr(5)], &[0, 1], &[addr(10), addr(11)])
            .unwrap();
        assert_eq!(config.item_heir(&addr(5), 0), Some(addr(10)));
        assert_eq!(config.item_heir(&addr(5), 1), Some(addr(11)));

        config.assign_items(&[addr(5)], &[0], &[addr(12)]).unwrap();
        assert_eq!(config.item_heir(&addr(5), 0), Some(addr(12)));
        assert_eq!(config.item_heir(&addr(5), 2), None);
        assert_eq!(config.items_for(&addr(11)), vec![(addr(5), 1)]);
    }

    #[test]
    fn test_assign_items_length_mismatch_writes_nothing() {
        let mut config = AssetConfiguration::new();
        let err = config
            .assign_items(&[addr(5), addr(5)], &[0], &[addr(10), addr(11)])
            .unwrap_err();
        assert_eq!(
            err,
            SuccessionError::LengthMismatch {
                assets: 2,
                items: 1,
                heirs: 2
            }
        );
        assert!(config.item_heirs.is_empty());
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut config = AssetConfiguration::new();
        config.set_fungible_assets([addr(1)]);
        config.set_fungible_heirs([addr(10), addr(11)]);
        config.assign_items(&[addr(5)], &[7], &[addr(10)]).unwrap();

        let json = serde_json::to_string(&config).unwrap();
        let restored: AssetConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
